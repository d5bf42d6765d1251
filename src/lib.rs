//! Codecs for Wii U title packaging: SARC archives, title metadata (TMD) and tickets.
use binread::{BinRead, BinReaderExt};
use binwrite::BinWrite;
use std::io::{Cursor, Read, Write};

mod crypto;
mod dir;
mod error;
mod names;
mod parse;
mod signed;
mod ticket;
mod tmd;
mod writer;

pub use crypto::{decrypt_title_key, encrypt_title_key, CommonKeys};
pub use dir::{collect_dir, extract_to_dir, pack_dir};
pub use error::{Error, ErrorKind, Result};
pub use parse::{decode, File, Sarc};
pub use signed::{fake_sign, is_fake_signed, SignedHeader};
pub use ticket::{CommonKeyType, Ticket, TitleKey, TitleKeys};
pub use tmd::{Content, ContentType, Region, TitleMetadata};
pub use writer::{encode, SarcWriter, DEFAULT_ALIGNMENT};

const SARC_MAGIC: [u8; 4] = *b"SARC";
const SFAT_MAGIC: [u8; 4] = *b"SFAT";
const SFNT_MAGIC: [u8; 4] = *b"SFNT";

/// Byte order mark of a big endian archive, the only kind supported
const BOM_BIG: [u8; 2] = [0xFE, 0xFF];
const BOM_LITTLE: [u8; 2] = [0xFF, 0xFE];

const SARC_VERSION: u16 = 0x0100;

const RES_HEADER_SIZE: usize = 0x14;
const FAT_ENTRY_SIZE: usize = 0x10;
const FNT_HEADER_SIZE: usize = 0x08;
const HASH_MULTIPLIER: u32 = 0x65;

/// Hashes an archive path the way the SFAT entry table is keyed.
///
/// Hashing runs over the UTF-8 bytes of `name` with wrapping arithmetic.
/// Different names may collide; that is not an error.
pub fn hash_name(multiplier: u32, name: &str) -> u32 {
    name.bytes()
        .fold(0, |hash, b| hash.wrapping_mul(multiplier).wrapping_add(b as u32))
}

/// Size = 0x14
#[derive(Debug, Eq, PartialEq, Copy, Clone, BinRead, BinWrite)]
struct ResHeader {
    magic: [u8; 4],
    header_size: u16,
    bom: u16,
    file_size: u32,
    data_offset: u32,
    version: u16,
    reserved: u16,
}

/// Size = 0x0C
#[derive(Debug, Copy, Clone, Eq, PartialEq, BinRead, BinWrite)]
struct ResFatHeader {
    magic: [u8; 4],
    header_size: u16,
    num_files: u16,
    hash_multiplier: u32,
}

/// Size = 0x10
#[derive(Debug, PartialEq, Eq, Copy, Clone, BinRead, BinWrite)]
struct ResFatEntry {
    name_hash: u32,
    rel_name_opt_offset: u32,
    data_begin: u32,
    data_end: u32,
}

impl ResFatEntry {
    fn attribute(&self) -> u8 {
        (self.rel_name_opt_offset >> 24) as u8
    }

    /// Offset of the name in the name table, in 4 byte words
    fn name_offset(&self) -> u32 {
        self.rel_name_opt_offset & 0xFFFFFF
    }
}

/// Size = 0x8
#[derive(Debug, PartialEq, Eq, Copy, Clone, BinRead, BinWrite)]
struct ResFntHeader {
    magic: [u8; 4],
    header_size: u16,
    reserved: u16,
}

fn is_valid_alignment(alignment: usize) -> bool {
    alignment != 0 && (alignment & (alignment - 1)) == 0
}

fn align(pos: usize, alignment: usize) -> usize {
    (pos + alignment - 1) & !(alignment - 1)
}

fn read<T: BinRead>(reader: &mut Cursor<&[u8]>) -> Result<T> {
    Ok(reader.read_be()?)
}

fn read_bytes<const N: usize>(reader: &mut Cursor<&[u8]>, what: &'static str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::Truncated(what))?;
    Ok(buf)
}

fn read_vec(reader: &mut Cursor<&[u8]>, len: usize, what: &'static str) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::Truncated(what))?;
    Ok(buf)
}

fn big_endian() -> binwrite::WriterOption {
    let mut opts = binwrite::WriterOption::default();
    opts.endian = binwrite::Endian::Big;
    opts
}

fn write<T: BinWrite, W: Write>(value: &T, writer: &mut W) -> std::io::Result<()> {
    value.write_options(writer, &big_endian())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash() {
        assert_eq!(hash_name(HASH_MULTIPLIER, ""), 0);
        assert_eq!(hash_name(HASH_MULTIPLIER, "a"), 0x61);
        assert_eq!(hash_name(HASH_MULTIPLIER, "ab"), 0x61 * 0x65 + 0x62);
        // Long names wrap instead of overflowing
        let long = "Actor/Pack/DgnMrgPrt_Dungeon119.sbactorpack";
        let expected = long.bytes().fold(0u64, |h, b| (h * 0x65 + b as u64) & 0xFFFF_FFFF);
        assert_eq!(hash_name(HASH_MULTIPLIER, long) as u64, expected);
    }

    #[test]
    fn alignment() {
        assert!(is_valid_alignment(0x100));
        assert!(!is_valid_alignment(0));
        assert!(!is_valid_alignment(0x30));
        assert_eq!(align(0, 0x100), 0);
        assert_eq!(align(1, 0x100), 0x100);
        assert_eq!(align(0x100, 0x100), 0x100);
        assert_eq!(align(5, 4), 8);
    }

    #[test]
    fn wire_sizes() {
        let mut buf = vec![];
        ResHeader {
            magic: SARC_MAGIC,
            header_size: RES_HEADER_SIZE as u16,
            bom: u16::from_be_bytes(BOM_BIG),
            file_size: 0,
            data_offset: 0,
            version: SARC_VERSION,
            reserved: 0,
        }
        .write_options(&mut buf, &big_endian())
        .unwrap();
        assert_eq!(buf.len(), RES_HEADER_SIZE);

        buf.clear();
        write(
            &ResFatEntry {
                name_hash: 0,
                rel_name_opt_offset: 0,
                data_begin: 0,
                data_end: 0,
            },
            &mut buf,
        )
        .unwrap();
        assert_eq!(buf.len(), FAT_ENTRY_SIZE);

        buf.clear();
        write(
            &ResFntHeader {
                magic: SFNT_MAGIC,
                header_size: FNT_HEADER_SIZE as u16,
                reserved: 0,
            },
            &mut buf,
        )
        .unwrap();
        assert_eq!(buf.len(), FNT_HEADER_SIZE);
    }

    #[test]
    fn fat_entry_fields() {
        let entry = ResFatEntry {
            name_hash: 0,
            rel_name_opt_offset: 1 << 24 | 0x1234,
            data_begin: 0,
            data_end: 0,
        };
        assert_eq!(entry.attribute(), 1);
        assert_eq!(entry.name_offset(), 0x1234);
    }
}
