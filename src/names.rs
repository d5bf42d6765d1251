use crate::{align, Error, Result};

/// Largest word offset an SFAT entry can store in its 24 bit name field
const MAX_NAME_OFFSET: usize = 0xFFFFFF;

/// The SFNT name block: every name is NUL terminated and padded with NUL up
/// to a multiple of 4, in the same order as the SFAT entries.
#[derive(Debug, Default)]
pub(crate) struct NameTable {
    data: Vec<u8>,
    offsets: Vec<u32>,
}

impl NameTable {
    pub(crate) fn build<'a, I>(names: I) -> Result<NameTable>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut table = NameTable::default();
        for name in names {
            if name.as_bytes().contains(&0) {
                return Err(Error::InvalidData("file name".to_owned(), name.to_owned()));
            }
            let word_offset = table.data.len() / 4;
            if word_offset > MAX_NAME_OFFSET {
                return Err(Error::InvalidData(
                    "SFNT name offset".to_owned(),
                    word_offset.to_string(),
                ));
            }
            table.offsets.push(word_offset as u32);
            table.data.extend_from_slice(name.as_bytes());
            table.data.resize(table.data.len() + padded_name_len(name) - name.len(), 0);
        }
        Ok(table)
    }

    /// Offsets of each name, in 4 byte words from the start of the table
    pub(crate) fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

pub(crate) fn padded_name_len(name: &str) -> usize {
    align(name.len() + 1, 4)
}

fn find_null(data: &[u8]) -> Result<usize> {
    data.iter()
        .position(|b| b == &0u8)
        .ok_or(Error::UnterminatedStringError)
}

/// Reads the name stored `word_offset` words into `section`.
pub(crate) fn name_at(section: &[u8], word_offset: u32) -> Result<&str> {
    let start = word_offset as usize * 4;
    let rest = section
        .get(start..)
        .ok_or(Error::Truncated("SFNT name table"))?;
    let term_pos = find_null(rest)?;
    Ok(std::str::from_utf8(&rest[..term_pos])?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn build_pads_each_name() {
        let table = NameTable::build(["abc", "abcd", "a/b.txt"]).unwrap();
        assert_eq!(table.offsets(), &[0, 1, 3]);
        assert_eq!(
            table.as_bytes(),
            b"abc\0abcd\0\0\0\0a/b.txt\0".as_ref()
        );
        assert_eq!(table.as_bytes().len() % 4, 0);
    }

    #[test]
    fn read_back() {
        let table = NameTable::build(["sub/b.txt", "a.txt"]).unwrap();
        let bytes = table.as_bytes();
        for (name, offset) in ["sub/b.txt", "a.txt"].iter().zip(table.offsets()) {
            assert_eq!(name_at(bytes, *offset).unwrap(), *name);
        }
    }

    #[test]
    fn unterminated() {
        let err = name_at(b"abcd", 0).unwrap_err();
        assert!(matches!(err, Error::UnterminatedStringError));
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(name_at(b"abc\0", 4).is_err());
    }

    #[test]
    fn rejects_embedded_nul() {
        assert!(NameTable::build(["a\0b"]).is_err());
    }
}
