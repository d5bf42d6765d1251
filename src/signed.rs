//! The signature header shared by title metadata and tickets, and fake-signing.
//!
//! Fake-signing is not cryptography. Permissive verifiers only check that the
//! SHA-1 digest of the signed data starts with a zero byte when the stored
//! signature is all zeros, so a brute force search over a free 16 bit field
//! (about 256 tries on average) is enough to produce a container they accept.
use crate::{read, read_bytes, write, Error, Result};
use sha1::{Digest, Sha1};
use std::io::{Cursor, Write};

/// RSA-2048 with SHA-1
pub const SIGNATURE_TYPE_RSA2048: u32 = 0x0001_0001;
pub(crate) const SIGNATURE_SIZE: usize = 0x100;
pub(crate) const ISSUER_SIZE: usize = 0x40;
/// Size of the header; kind specific fields start here
pub(crate) const SIGNED_HEADER_SIZE: usize = 0x180;

/// Signature type, signature, padding and issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeader {
    pub signature_type: u32,
    pub signature: [u8; SIGNATURE_SIZE],
    padding: [u8; 0x3C],
    pub issuer: [u8; ISSUER_SIZE],
}

impl Default for SignedHeader {
    fn default() -> Self {
        SignedHeader {
            signature_type: SIGNATURE_TYPE_RSA2048,
            signature: [0; SIGNATURE_SIZE],
            padding: [0; 0x3C],
            issuer: [0; ISSUER_SIZE],
        }
    }
}

impl SignedHeader {
    pub(crate) fn read(reader: &mut Cursor<&[u8]>) -> Result<SignedHeader> {
        Ok(SignedHeader {
            signature_type: read(reader)?,
            signature: read_bytes(reader, "signature")?,
            padding: read_bytes(reader, "signature padding")?,
            issuer: read_bytes(reader, "issuer")?,
        })
    }

    /// Writes the header, with a zeroed signature if `clear_signature` is set
    pub(crate) fn write<W: Write>(&self, writer: &mut W, clear_signature: bool) -> Result<()> {
        write(&self.signature_type, writer)?;
        if clear_signature {
            writer.write_all(&[0; SIGNATURE_SIZE])?;
        } else {
            writer.write_all(&self.signature)?;
        }
        writer.write_all(&self.padding)?;
        writer.write_all(&self.issuer)?;
        Ok(())
    }

    /// The issuer up to its first NUL byte
    pub fn issuer_str(&self) -> Result<&str> {
        let end = self
            .issuer
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(ISSUER_SIZE);
        Ok(std::str::from_utf8(&self.issuer[..end])?)
    }

    pub fn set_issuer(&mut self, issuer: &str) -> Result<()> {
        if issuer.len() > ISSUER_SIZE {
            return Err(Error::InvalidData("issuer".to_owned(), issuer.to_owned()));
        }
        self.issuer = [0; ISSUER_SIZE];
        self.issuer[..issuer.len()].copy_from_slice(issuer.as_bytes());
        Ok(())
    }

    pub fn is_signature_zeroed(&self) -> bool {
        self.signature.iter().all(|b| *b == 0)
    }
}

/// Brute forces a big endian nonce at `nonce_offset` so the SHA-1 digest of
/// `buf` starts with a zero byte.
///
/// Nonces are tried from 0 upwards and the first match is left in `buf` and
/// returned. Fails with [`Error::SigningExhausted`] if no value in
/// `0..=0xFFFF` works.
pub fn fake_sign(buf: &mut [u8], nonce_offset: usize) -> Result<u16> {
    search_nonce(buf, nonce_offset, |digest| digest[0] == 0)
}

fn search_nonce<F>(buf: &mut [u8], nonce_offset: usize, accept: F) -> Result<u16>
where
    F: Fn(&[u8]) -> bool,
{
    let nonce_end = nonce_offset + 2;
    if nonce_end > buf.len() {
        return Err(Error::NonceOutOfRange {
            offset: nonce_offset,
            len: buf.len(),
        });
    }
    let mut hasher = Sha1::new();
    for nonce in 0..=u16::MAX {
        buf[nonce_offset..nonce_end].copy_from_slice(&nonce.to_be_bytes());
        hasher.update(&*buf);
        if accept(&hasher.finalize_reset()) {
            tracing::debug!(nonce, nonce_offset, "fake-signed");
            return Ok(nonce);
        }
    }
    Err(Error::SigningExhausted)
}

/// Returns true if the container in `buf` has a zeroed signature and a
/// digest starting with a zero byte.
///
/// `buf` must hold only the signed container, without any appended
/// certificates.
pub fn is_fake_signed(buf: &[u8]) -> bool {
    buf.len() >= SIGNED_HEADER_SIZE
        && buf[4..4 + SIGNATURE_SIZE].iter().all(|b| *b == 0)
        && Sha1::digest(buf)[0] == 0
}
