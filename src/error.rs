use std::path::PathBuf;
use thiserror::Error;

/// Broad category of a failure, used by callers that only care about what
/// went wrong rather than the exact variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, truncated or otherwise unacceptable input or field values
    Format,
    /// The fake-signing nonce search could not complete
    Signing,
    /// Content records and supplied content data do not line up
    ContentMismatch,
    /// Filesystem failure in one of the directory helpers
    Io,
    /// Invalid key configuration
    Config,
}

#[derive(Error, Debug)]
/// An enum representing all possible errors when reading or writing archives,
/// title metadata and tickets
pub enum Error {
    #[error("File index {0} out of range")]
    OutOfRange(usize),
    #[error("Invalid {0} value: \"{1}\"")]
    InvalidData(String, String),
    #[error("Little endian archives are not supported")]
    UnsupportedByteOrder,
    #[error("Unexpected end of data while reading {0}")]
    Truncated(&'static str),
    #[error("A string in the name table was not terminated")]
    UnterminatedStringError,
    #[error("Invalid UTF file name")]
    InvalidFileName(#[from] std::str::Utf8Error),
    #[error("Entry {0} has no file name")]
    UnnamedEntry(usize),
    #[error("Cannot write an archive with no files")]
    EmptyArchive,
    #[error("Too many files for one archive: {0}")]
    TooManyFiles(usize),
    #[error("File {0} was added more than once")]
    DuplicateName(String),
    #[error("{0} is not a valid alignment")]
    InvalidAlignmentError(usize),
    #[error("Refusing to extract unsafe path \"{0}\"")]
    UnsafePath(String),
    #[error("Boot index {index} exceeds content count {count}")]
    InvalidBootIndex { index: u16, count: usize },
    #[error("No nonce in 0..=0xFFFF produced a fake signature")]
    SigningExhausted,
    #[error("Nonce offset {offset:#x} is outside of a {len:#x} byte buffer")]
    NonceOutOfRange { offset: usize, len: usize },
    #[error("Expected data for {expected} contents, got {found}")]
    ContentMismatch { expected: usize, found: usize },
    #[error("Content file {0:?} not found")]
    MissingContentFile(PathBuf),
    #[error("Invalid common key configuration")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    ParseError(#[from] binread::Error),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SigningExhausted | Error::NonceOutOfRange { .. } => ErrorKind::Signing,
            Error::ContentMismatch { .. } | Error::MissingContentFile(_) => {
                ErrorKind::ContentMismatch
            }
            Error::Config(_) => ErrorKind::Config,
            Error::IOError(_) => ErrorKind::Io,
            _ => ErrorKind::Format,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(Error::SigningExhausted.kind(), ErrorKind::Signing);
        assert_eq!(
            Error::ContentMismatch {
                expected: 2,
                found: 1
            }
            .kind(),
            ErrorKind::ContentMismatch
        );
        assert_eq!(Error::UnterminatedStringError.kind(), ErrorKind::Format);
        assert_eq!(Error::Truncated("SARC header").kind(), ErrorKind::Format);
    }
}
