use crate::crypto::{decrypt_title_key, encrypt_title_key, CommonKeys};
use crate::signed::{fake_sign, SignedHeader};
use crate::{read, read_bytes, write, Result};
use binread::BinRead;
use binwrite::BinWrite;
use std::io::{Cursor, Write};

/// First two bytes of the reserved block after the common key index
const TICKET_NONCE_OFFSET: usize = 0x1F2;
const TICKET_SIZE: usize = 0x2A4;

/// Selects which common key protects the title key
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead)]
#[br(repr = u8)]
#[repr(u8)]
pub enum CommonKeyType {
    Standard = 0,
    Korean = 1,
}

impl BinWrite for CommonKeyType {
    fn write_options<W: Write>(
        &self,
        writer: &mut W,
        options: &binwrite::WriterOption,
    ) -> std::io::Result<()> {
        (*self as u8).write_options(writer, options)
    }
}

/// The title key as last set: either the wire form read from a ticket or a
/// plaintext key set by the caller. The other form is derived on demand.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum TitleKey {
    Encrypted([u8; 16]),
    Decrypted([u8; 16]),
}

/// Both forms of a title key for one title ID and common key
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct TitleKeys {
    pub encrypted: [u8; 16],
    pub decrypted: [u8; 16],
}

/// A ticket, binding a title to its encrypted title key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub header: SignedHeader,
    reserved0: [u8; 63],
    title_key: TitleKey,
    reserved1: u8,
    pub ticket_id: u64,
    pub console_id: u32,
    pub title_id: u64,
    reserved2: u16,
    pub dlc_count: u16,
    reserved3: u64,
    reserved4: u8,
    pub common_key_index: CommonKeyType,
    reserved5: [u8; 48],
    reserved6: [u8; 32],
    reserved7: u16,
    pub enable_time_limit: u32,
    pub time_limit: u32,
    reserved8: [u8; 88],
    trailer: Vec<u8>,
    /// Zero the signature and brute force a fake signature when serializing
    pub fake_signed: bool,
}

impl Default for Ticket {
    fn default() -> Self {
        Ticket {
            header: SignedHeader::default(),
            reserved0: [0; 63],
            title_key: TitleKey::Decrypted([0; 16]),
            reserved1: 0,
            ticket_id: 0,
            console_id: 0,
            title_id: 0,
            reserved2: 0xFFFF,
            dlc_count: 0,
            reserved3: 0,
            reserved4: 0,
            common_key_index: CommonKeyType::Standard,
            reserved5: [0; 48],
            reserved6: [0; 32],
            reserved7: 0,
            enable_time_limit: 0,
            time_limit: 0,
            reserved8: [0; 88],
            trailer: vec![],
            fake_signed: false,
        }
    }
}

impl Ticket {
    pub fn new() -> Ticket {
        Ticket::default()
    }

    /// Parses a ticket. The title key is kept in its encrypted form; use
    /// [`Ticket::title_key`] to decrypt it.
    pub fn from_bytes(data: &[u8]) -> Result<Ticket> {
        let mut reader = Cursor::new(data);
        let ticket = Ticket {
            header: SignedHeader::read(&mut reader)?,
            reserved0: read_bytes(&mut reader, "ticket header")?,
            title_key: TitleKey::Encrypted(read_bytes(&mut reader, "title key")?),
            reserved1: read(&mut reader)?,
            ticket_id: read(&mut reader)?,
            console_id: read(&mut reader)?,
            title_id: read(&mut reader)?,
            reserved2: read(&mut reader)?,
            dlc_count: read(&mut reader)?,
            reserved3: read(&mut reader)?,
            reserved4: read(&mut reader)?,
            common_key_index: read(&mut reader)?,
            reserved5: read_bytes(&mut reader, "ticket body")?,
            reserved6: read_bytes(&mut reader, "ticket body")?,
            reserved7: read(&mut reader)?,
            enable_time_limit: read(&mut reader)?,
            time_limit: read(&mut reader)?,
            reserved8: read_bytes(&mut reader, "ticket padding")?,
            trailer: data[TICKET_SIZE.min(data.len())..].to_vec(),
            fake_signed: false,
        };
        tracing::debug!(
            title_id = format_args!("{:016X}", ticket.title_id),
            common_key = ?ticket.common_key_index,
            trailer = ticket.trailer.len(),
            "parsed ticket"
        );
        Ok(ticket)
    }

    /// Serializes the ticket, encrypting the title key under the current
    /// title ID and common key and fake-signing if requested.
    pub fn to_bytes(&self, keys: &CommonKeys) -> Result<Vec<u8>> {
        let title_keys = self.derive_keys(keys);
        let mut buf = Vec::with_capacity(TICKET_SIZE + self.trailer.len());
        self.header.write(&mut buf, self.fake_signed)?;
        buf.write_all(&self.reserved0)?;
        buf.write_all(&title_keys.encrypted)?;
        write(&self.reserved1, &mut buf)?;
        write(&self.ticket_id, &mut buf)?;
        write(&self.console_id, &mut buf)?;
        write(&self.title_id, &mut buf)?;
        write(&self.reserved2, &mut buf)?;
        write(&self.dlc_count, &mut buf)?;
        write(&self.reserved3, &mut buf)?;
        write(&self.reserved4, &mut buf)?;
        write(&self.common_key_index, &mut buf)?;
        buf.write_all(&self.reserved5)?;
        buf.write_all(&self.reserved6)?;
        write(&self.reserved7, &mut buf)?;
        write(&self.enable_time_limit, &mut buf)?;
        write(&self.time_limit, &mut buf)?;
        buf.write_all(&self.reserved8)?;

        if self.fake_signed {
            fake_sign(&mut buf, TICKET_NONCE_OFFSET)?;
        }
        buf.extend_from_slice(&self.trailer);
        tracing::debug!(
            size = buf.len(),
            fake_signed = self.fake_signed,
            "wrote ticket"
        );
        Ok(buf)
    }

    pub fn write<W: Write>(&self, writer: &mut W, keys: &CommonKeys) -> Result<()> {
        writer.write_all(&self.to_bytes(keys)?)?;
        Ok(())
    }

    /// Derives the encrypted and decrypted title key from the stored key,
    /// the title ID and the selected common key.
    pub fn derive_keys(&self, keys: &CommonKeys) -> TitleKeys {
        let common_key = keys.get(self.common_key_index);
        match self.title_key {
            TitleKey::Encrypted(encrypted) => TitleKeys {
                encrypted,
                decrypted: decrypt_title_key(&encrypted, self.title_id, common_key),
            },
            TitleKey::Decrypted(decrypted) => TitleKeys {
                encrypted: encrypt_title_key(&decrypted, self.title_id, common_key),
                decrypted,
            },
        }
    }

    /// The decrypted title key
    pub fn title_key(&self, keys: &CommonKeys) -> [u8; 16] {
        self.derive_keys(keys).decrypted
    }

    /// The title key exactly as last loaded or set
    pub fn stored_title_key(&self) -> TitleKey {
        self.title_key
    }

    /// Sets a plaintext title key, to be encrypted when serializing
    pub fn set_title_key(&mut self, key: [u8; 16]) {
        self.title_key = TitleKey::Decrypted(key);
    }

    /// Sets an encrypted title key, to be decrypted with the title ID in
    /// effect when it is used
    pub fn set_encrypted_title_key(&mut self, key: [u8; 16]) {
        self.title_key = TitleKey::Encrypted(key);
    }

    /// The low half of the title ID as four characters
    pub fn upper_title_id(&self) -> String {
        (self.title_id as u32)
            .to_be_bytes()
            .iter()
            .map(|b| *b as char)
            .collect()
    }
}
