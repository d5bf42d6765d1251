use crate::signed::{fake_sign, SignedHeader};
use crate::{read, read_bytes, read_vec, write, Error, Result};
use binread::BinRead;
use binwrite::BinWrite;
use sha1::{Digest, Sha1};
use std::io::{Cursor, Write};
use std::path::Path;

/// The word after the boot index; brute forced when fake-signing
const TMD_NONCE_OFFSET: usize = 0x1E2;
const CONTENT_INFO_OFFSET: usize = 0x1E4;
const CONTENT_INFO_SIZE: usize = 0x920;
const CONTENT_RECORDS_OFFSET: usize = CONTENT_INFO_OFFSET + CONTENT_INFO_SIZE;
const CONTENT_RECORD_SIZE: usize = 0x30;
const NAND_BLOCK_SIZE: u64 = 128 * 1024;

#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead)]
#[br(repr = u16)]
#[repr(u16)]
pub enum Region {
    Japan = 0,
    Usa = 1,
    Europe = 2,
    Free = 3,
}

impl BinWrite for Region {
    fn write_options<W: Write>(
        &self,
        writer: &mut W,
        options: &binwrite::WriterOption,
    ) -> std::io::Result<()> {
        (*self as u16).write_options(writer, options)
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead)]
#[br(repr = u16)]
#[repr(u16)]
pub enum ContentType {
    Normal = 0x0001,
    Dlc = 0x4001,
    Shared = 0x8001,
}

impl BinWrite for ContentType {
    fn write_options<W: Write>(
        &self,
        writer: &mut W,
        options: &binwrite::WriterOption,
    ) -> std::io::Result<()> {
        (*self as u16).write_options(writer, options)
    }
}

/// One content record of a title
#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(big)]
pub struct Content {
    pub content_id: u32,
    /// Unique per title; records are written in ascending index order
    pub index: u16,
    pub content_type: ContentType,
    pub size: u64,
    /// SHA-1 of the decrypted content
    pub hash: [u8; 20],
    reserved: [u8; 12],
}

impl Content {
    pub fn new(content_id: u32, index: u16, content_type: ContentType) -> Content {
        Content {
            content_id,
            index,
            content_type,
            size: 0,
            hash: [0; 20],
            reserved: [0; 12],
        }
    }

    /// Sets size and hash from the decrypted content data
    pub fn update(&mut self, data: &[u8]) {
        self.size = data.len() as u64;
        self.hash = Sha1::digest(data).into();
    }

    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        write(&self.content_id, writer)?;
        write(&self.index, writer)?;
        write(&self.content_type, writer)?;
        write(&self.size, writer)?;
        writer.write_all(&self.hash)?;
        writer.write_all(&self.reserved)?;
        Ok(())
    }
}

/// Title metadata: what a title is and which contents make it up.
///
/// The content count is not stored separately; it is always the number of
/// records in [`TitleMetadata::contents`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleMetadata {
    pub header: SignedHeader,
    pub version: u8,
    pub ca_crl_version: u8,
    pub signer_crl_version: u8,
    reserved0: u8,
    pub startup_loader_id: u64,
    pub title_id: u64,
    pub title_type: u32,
    pub group_id: u16,
    reserved1: u16,
    pub region: Region,
    reserved2: [u8; 58],
    pub access_rights: u32,
    pub title_version: u16,
    boot_index: u16,
    nonce: u16,
    content_info: Vec<u8>,
    contents: Vec<Content>,
    trailer: Vec<u8>,
    /// Zero the signature and brute force a fake signature when serializing
    pub fake_signed: bool,
}

impl Default for TitleMetadata {
    fn default() -> Self {
        TitleMetadata {
            header: SignedHeader::default(),
            version: 0,
            ca_crl_version: 0,
            signer_crl_version: 0,
            reserved0: 0,
            startup_loader_id: 0,
            title_id: 0,
            title_type: 0,
            group_id: 0,
            reserved1: 0,
            region: Region::Free,
            reserved2: [0; 58],
            access_rights: 0,
            title_version: 0,
            boot_index: 0,
            nonce: 0,
            content_info: vec![0; CONTENT_INFO_SIZE],
            contents: vec![],
            trailer: vec![],
            fake_signed: false,
        }
    }
}

impl TitleMetadata {
    pub fn new() -> TitleMetadata {
        TitleMetadata::default()
    }

    /// Parses title metadata. Bytes after the last content record, such as
    /// an appended certificate chain, are kept as they are.
    pub fn from_bytes(data: &[u8]) -> Result<TitleMetadata> {
        let mut reader = Cursor::new(data);
        let header = SignedHeader::read(&mut reader)?;
        let version = read(&mut reader)?;
        let ca_crl_version = read(&mut reader)?;
        let signer_crl_version = read(&mut reader)?;
        let reserved0 = read(&mut reader)?;
        let startup_loader_id = read(&mut reader)?;
        let title_id = read(&mut reader)?;
        let title_type = read(&mut reader)?;
        let group_id = read(&mut reader)?;
        let reserved1 = read(&mut reader)?;
        let region = read(&mut reader)?;
        let reserved2 = read_bytes(&mut reader, "TMD header")?;
        let access_rights = read(&mut reader)?;
        let title_version = read(&mut reader)?;
        let content_count: u16 = read(&mut reader)?;
        let boot_index: u16 = read(&mut reader)?;
        let nonce = read(&mut reader)?;
        let content_info = read_vec(&mut reader, CONTENT_INFO_SIZE, "TMD content info")?;

        let records_len = content_count as usize * CONTENT_RECORD_SIZE;
        if data.len() < CONTENT_RECORDS_OFFSET + records_len {
            return Err(Error::Truncated("TMD content records"));
        }
        let contents = (0..content_count)
            .map(|_| Ok(Content::read(&mut reader)?))
            .collect::<Result<Vec<Content>>>()?;
        if boot_index as usize > contents.len() {
            return Err(Error::InvalidBootIndex {
                index: boot_index,
                count: contents.len(),
            });
        }
        let trailer = data[reader.position() as usize..].to_vec();
        tracing::debug!(
            title_id = format_args!("{:016X}", title_id),
            contents = contents.len(),
            trailer = trailer.len(),
            "parsed TMD"
        );

        Ok(TitleMetadata {
            header,
            version,
            ca_crl_version,
            signer_crl_version,
            reserved0,
            startup_loader_id,
            title_id,
            title_type,
            group_id,
            reserved1,
            region,
            reserved2,
            access_rights,
            title_version,
            boot_index,
            nonce,
            content_info,
            contents,
            trailer,
            fake_signed: false,
        })
    }

    /// Serializes the title metadata, fake-signing it if requested.
    ///
    /// Content records are written sorted by index, whatever their order in
    /// memory. Fake-signing must come last: changing any field afterwards
    /// invalidates the signature.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = self.contents.len();
        if count > u16::MAX as usize {
            return Err(Error::InvalidData("content count".to_owned(), count.to_string()));
        }
        if self.boot_index as usize > count {
            return Err(Error::InvalidBootIndex {
                index: self.boot_index,
                count,
            });
        }
        let mut sorted: Vec<&Content> = self.contents.iter().collect();
        sorted.sort_by_key(|content| content.index);
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0].index == pair[1].index) {
            return Err(Error::InvalidData(
                "content index".to_owned(),
                pair[0].index.to_string(),
            ));
        }

        let mut buf = Vec::with_capacity(
            CONTENT_RECORDS_OFFSET + count * CONTENT_RECORD_SIZE + self.trailer.len(),
        );
        self.header.write(&mut buf, self.fake_signed)?;
        write(&self.version, &mut buf)?;
        write(&self.ca_crl_version, &mut buf)?;
        write(&self.signer_crl_version, &mut buf)?;
        write(&self.reserved0, &mut buf)?;
        write(&self.startup_loader_id, &mut buf)?;
        write(&self.title_id, &mut buf)?;
        write(&self.title_type, &mut buf)?;
        write(&self.group_id, &mut buf)?;
        write(&self.reserved1, &mut buf)?;
        write(&self.region, &mut buf)?;
        buf.write_all(&self.reserved2)?;
        write(&self.access_rights, &mut buf)?;
        write(&self.title_version, &mut buf)?;
        write(&(count as u16), &mut buf)?;
        write(&self.boot_index, &mut buf)?;
        write(&self.nonce, &mut buf)?;
        buf.write_all(&self.content_info)?;
        for content in sorted {
            content.write(&mut buf)?;
        }

        if self.fake_signed {
            fake_sign(&mut buf, TMD_NONCE_OFFSET)?;
        }
        buf.extend_from_slice(&self.trailer);
        tracing::debug!(
            contents = count,
            size = buf.len(),
            fake_signed = self.fake_signed,
            "wrote TMD"
        );
        Ok(buf)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    pub fn contents(&self) -> &[Content] {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut [Content] {
        &mut self.contents
    }

    pub fn content_count(&self) -> usize {
        self.contents.len()
    }

    /// Replaces all content records
    pub fn set_contents(&mut self, contents: Vec<Content>) {
        self.contents = contents;
    }

    /// Adds a content record. Fails if a record with the same index exists.
    pub fn add_content(&mut self, content: Content) -> Result<()> {
        if self.contents.iter().any(|c| c.index == content.index) {
            return Err(Error::InvalidData(
                "content index".to_owned(),
                content.index.to_string(),
            ));
        }
        self.contents.push(content);
        Ok(())
    }

    /// Removes the content record with the given index
    pub fn remove_content(&mut self, index: u16) -> Option<Content> {
        let pos = self.contents.iter().position(|c| c.index == index)?;
        Some(self.contents.remove(pos))
    }

    /// Removes the content record with the given content ID
    pub fn remove_content_by_id(&mut self, content_id: u32) -> Option<Content> {
        let pos = self
            .contents
            .iter()
            .position(|c| c.content_id == content_id)?;
        Some(self.contents.remove(pos))
    }

    pub fn boot_index(&self) -> u16 {
        self.boot_index
    }

    pub fn set_boot_index(&mut self, index: u16) -> Result<()> {
        if index as usize > self.contents.len() {
            return Err(Error::InvalidBootIndex {
                index,
                count: self.contents.len(),
            });
        }
        self.boot_index = index;
        Ok(())
    }

    /// Recomputes size and SHA-1 of every record from the given content
    /// data, matched by position.
    pub fn update_contents<T: AsRef<[u8]>>(&mut self, data: &[T]) -> Result<()> {
        if data.len() != self.contents.len() {
            return Err(Error::ContentMismatch {
                expected: self.contents.len(),
                found: data.len(),
            });
        }
        for (content, data) in self.contents.iter_mut().zip(data) {
            content.update(data.as_ref());
        }
        Ok(())
    }

    /// Like [`TitleMetadata::update_contents`], reading `<content id>.app`
    /// files from `dir`, or `<index>.app` files if those are not all there.
    pub fn update_contents_from_dir<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let by_id: Vec<_> = self
            .contents
            .iter()
            .map(|c| dir.join(format!("{:08x}.app", c.content_id)))
            .collect();
        let paths = if by_id.iter().all(|p| p.is_file()) {
            by_id
        } else {
            self.contents
                .iter()
                .map(|c| dir.join(format!("{:08x}.app", c.index)))
                .collect()
        };
        if let Some(missing) = paths.iter().find(|p| !p.is_file()) {
            return Err(Error::MissingContentFile(missing.clone()));
        }
        let data = paths
            .iter()
            .map(std::fs::read)
            .collect::<std::io::Result<Vec<_>>>()?;
        self.update_contents(&data)
    }

    /// The low half of the title ID as four characters, e.g. `RMCE`
    pub fn upper_title_id(&self) -> String {
        (self.title_id as u32)
            .to_be_bytes()
            .iter()
            .map(|b| *b as char)
            .collect()
    }

    /// Number of 128 KiB NAND blocks the title occupies, as
    /// (normal contents only, all contents)
    pub fn nand_blocks(&self) -> (u64, u64) {
        let blocks = |size: u64| size / NAND_BLOCK_SIZE + (size % NAND_BLOCK_SIZE != 0) as u64;
        let total = |normal_only: bool| {
            self.contents
                .iter()
                .filter(|c| !normal_only || c.content_type == ContentType::Normal)
                .fold(0u64, |sum, c| sum.saturating_add(c.size))
        };
        (blocks(total(true)), blocks(total(false)))
    }
}
