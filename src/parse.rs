use crate::names::name_at;
use crate::*;
use derivative::*;
use std::{borrow::Cow, io::Cursor};

/// A file stored in a SARC archive
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct File<'a> {
    /// The file name, if the entry has one
    pub name: Option<&'a str>,
    pub data: &'a [u8],
}

#[derive(Derivative)]
#[derivative(Debug)]
/// A simple SARC archive reader
pub struct Sarc<'a> {
    num_files: u16,
    entries_offset: u16,
    hash_multiplier: u32,
    data_offset: u32,
    names_offset: u32,
    #[derivative(Debug = "ignore")]
    data: Cow<'a, [u8]>,
}

impl PartialEq for Sarc<'_> {
    /// Returns true if and only if the raw archive data is identical
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

fn invalid(what: &str, value: impl ToString) -> Error {
    Error::InvalidData(what.to_owned(), value.to_string())
}

impl<'a> Sarc<'_> {
    /// Parses a SARC archive from binary data
    pub fn new<T>(data: T) -> Result<Sarc<'a>>
    where
        T: Into<Cow<'a, [u8]>>,
    {
        let data = data.into();
        if data.len() < RES_HEADER_SIZE {
            return Err(Error::Truncated("SARC header"));
        }
        if data[0..4] != SARC_MAGIC {
            return Err(invalid("SARC magic", String::from_utf8_lossy(&data[0..4])));
        }
        match [data[6], data[7]] {
            BOM_BIG => {}
            BOM_LITTLE => return Err(Error::UnsupportedByteOrder),
            bom => {
                return Err(invalid(
                    "SARC byte order mark",
                    format!("{:02X}{:02X}", bom[0], bom[1]),
                ))
            }
        }

        let mut reader = Cursor::new(data.as_ref());
        let header: ResHeader = read(&mut reader)?;
        if header.version != SARC_VERSION {
            return Err(invalid("SARC version", header.version));
        }
        if header.header_size as usize != RES_HEADER_SIZE {
            return Err(invalid("SARC header size", header.header_size));
        }
        if header.file_size as usize > data.len() {
            return Err(Error::Truncated("SARC data"));
        }

        let fat_header: ResFatHeader = read(&mut reader)?;
        if fat_header.magic != SFAT_MAGIC {
            return Err(invalid(
                "SFAT magic",
                String::from_utf8_lossy(&fat_header.magic),
            ));
        }
        if fat_header.header_size as usize != 0x0C {
            return Err(invalid("SFAT header size", fat_header.header_size));
        }
        if (fat_header.num_files >> 0xE) != 0 {
            return Err(invalid("SFAT file count", fat_header.num_files));
        }

        let num_files = fat_header.num_files;
        let entries_offset = reader.position() as u16;
        let hash_multiplier = fat_header.hash_multiplier;
        let data_offset = header.data_offset;

        let fnt_header_offset =
            entries_offset as usize + FAT_ENTRY_SIZE * num_files as usize;
        if fnt_header_offset + FNT_HEADER_SIZE > data.len() {
            return Err(Error::Truncated("SFAT entries"));
        }
        reader.set_position(fnt_header_offset as u64);
        let fnt_header: ResFntHeader = read(&mut reader)?;
        if fnt_header.magic != SFNT_MAGIC {
            return Err(invalid(
                "SFNT magic",
                String::from_utf8_lossy(&fnt_header.magic),
            ));
        }
        if fnt_header.header_size as usize != FNT_HEADER_SIZE {
            return Err(invalid("SFNT header size", fnt_header.header_size));
        }

        let names_offset = reader.position() as u32;
        if data_offset < names_offset {
            return Err(invalid("name table offset", names_offset));
        }
        if data_offset as usize > data.len() {
            return Err(Error::Truncated("SFNT name table"));
        }
        tracing::debug!(
            files = num_files,
            data_offset,
            file_size = header.file_size,
            "parsed SARC header"
        );
        Ok(Sarc {
            data,
            data_offset,
            entries_offset,
            num_files,
            hash_multiplier,
            names_offset,
        })
    }

    /// Get the number of files that are stored in the archive
    pub fn file_count(&self) -> usize {
        self.num_files as usize
    }

    /// Get the offset to the beginning of file data
    pub fn data_offset(&self) -> usize {
        self.data_offset as usize
    }

    fn entry(&self, index: usize) -> Result<ResFatEntry> {
        let entry_offset = self.entries_offset as usize + FAT_ENTRY_SIZE * index;
        read(&mut Cursor::new(&self.data[entry_offset..]))
    }

    fn names(&self) -> &[u8] {
        &self.data[self.names_offset as usize..self.data_offset as usize]
    }

    /// Get the name hash of the entry at `index`
    pub fn hash_at(&self, index: usize) -> Result<u32> {
        if index >= self.num_files as usize {
            return Err(Error::OutOfRange(index));
        }
        Ok(self.entry(index)?.name_hash)
    }

    /// Get a file by name
    pub fn get_file(&self, file: &str) -> Result<Option<File>> {
        let needle_hash = hash_name(self.hash_multiplier, file);
        let count = self.num_files as usize;
        let mut a = 0;
        let mut b = count;
        while a < b {
            let m = (a + b) / 2;
            if self.entry(m)?.name_hash < needle_hash {
                a = m + 1;
            } else {
                b = m;
            }
        }
        // Colliding hashes sit next to each other, so compare names until the hash changes
        for index in a..count {
            if self.entry(index)?.name_hash != needle_hash {
                break;
            }
            let found = self.file_at(index)?;
            if found.name == Some(file) {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Get a file by index. Returns error if index > file count.
    pub fn file_at(&self, index: usize) -> Result<File> {
        if index >= self.num_files as usize {
            return Err(Error::OutOfRange(index));
        }

        let entry = self.entry(index)?;
        let name = if entry.attribute() != 0 {
            Some(name_at(self.names(), entry.name_offset())?)
        } else {
            None
        };
        let begin = self.data_offset as usize + entry.data_begin as usize;
        let end = self.data_offset as usize + entry.data_end as usize;
        if begin > end {
            return Err(invalid(
                "SFAT data range",
                format!("{:#x}..{:#x}", entry.data_begin, entry.data_end),
            ));
        }
        if end > self.data.len() {
            return Err(Error::Truncated("SARC file data"));
        }
        Ok(File {
            name,
            data: &self.data[begin..end],
        })
    }

    /// Returns an iterator over the contained files, in on-disk order
    pub fn files(&'_ self) -> impl Iterator<Item = Result<File<'_>>> {
        (0..self.file_count()).map(move |i| self.file_at(i))
    }

    /// Guess the minimum data alignment for files that are stored in the archive
    pub fn guess_min_alignment(&self) -> usize {
        const MIN_ALIGNMENT: u32 = 4;
        let gcd = (0..self.file_count())
            .filter_map(|i| self.entry(i).ok())
            .fold(0, |gcd, entry| {
                num::integer::gcd(gcd, self.data_offset + entry.data_begin)
            });
        if gcd == 0 {
            return MIN_ALIGNMENT as usize;
        }
        // Largest power of two dividing every file offset
        let alignment = 1usize << gcd.trailing_zeros();
        if !is_valid_alignment(alignment) || alignment < MIN_ALIGNMENT as usize {
            return MIN_ALIGNMENT as usize;
        }
        alignment
    }

    /// Returns true is each archive contains the same files
    pub fn are_files_equal(sarc1: &Sarc, sarc2: &Sarc) -> bool {
        if sarc1.file_count() != sarc2.file_count() {
            return false;
        }

        for (file1, file2) in sarc1.files().zip(sarc2.files()) {
            match (file1, file2) {
                (Ok(file1), Ok(file2)) if file1 == file2 => {}
                _ => return false,
            }
        }
        true
    }
}

/// Decodes every file of a SARC archive into `(path, bytes)` pairs, in on-disk order.
///
/// Nothing is returned unless the whole archive decodes.
pub fn decode(data: &[u8]) -> Result<Vec<(String, Vec<u8>)>> {
    let sarc = Sarc::new(data)?;
    sarc.files()
        .enumerate()
        .map(|(index, file)| {
            let file = file?;
            let name = file.name.ok_or(Error::UnnamedEntry(index))?;
            Ok((name.to_owned(), file.data.to_vec()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::{decode, hash_name, Error, ErrorKind, Sarc, SarcWriter};

    fn sample() -> Vec<u8> {
        let mut writer = SarcWriter::new();
        writer.add_file("a.txt", b"abcd".to_vec());
        writer.add_file("sub/b.txt", vec![0x42; 300]);
        writer.add_file("Model/DgnMrgPrt_Dungeon119.sbfres", vec![7; 0x123]);
        writer.write_to_bytes().unwrap()
    }

    #[test]
    fn parse_sarc() {
        let data = sample();
        let sarc = Sarc::new(&data).unwrap();
        assert_eq!(sarc.file_count(), 3);
        assert_eq!(sarc.data_offset() % 0x100, 0);
        assert_eq!(sarc.guess_min_alignment(), 0x100);
        for file in &["a.txt", "sub/b.txt", "Model/DgnMrgPrt_Dungeon119.sbfres"] {
            sarc.get_file(file)
                .unwrap()
                .unwrap_or_else(|| panic!("Could not find file {}", file));
        }
        assert_eq!(sarc.get_file("missing.txt").unwrap(), None);
        assert_eq!(sarc.get_file("a.txt").unwrap().unwrap().data, b"abcd");
        let hashes: Vec<u32> = (0..3).map(|i| sarc.hash_at(i).unwrap()).collect();
        assert!(hashes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn file_at_out_of_range() {
        let data = sample();
        let sarc = Sarc::new(&data).unwrap();
        assert!(matches!(sarc.file_at(3), Err(Error::OutOfRange(3))));
    }

    #[test]
    fn wrong_magic() {
        let mut data = sample();
        data[0..4].copy_from_slice(b"SARD");
        let err = Sarc::new(&data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(decode(&data).is_err());
    }

    #[test]
    fn little_endian_rejected() {
        let mut data = sample();
        data[6] = 0xFF;
        data[7] = 0xFE;
        assert!(matches!(
            Sarc::new(&data).unwrap_err(),
            Error::UnsupportedByteOrder
        ));
        data[6] = 0x12;
        assert!(matches!(
            Sarc::new(&data).unwrap_err(),
            Error::InvalidData(_, _)
        ));
    }

    #[test]
    fn truncated() {
        let data = sample();
        for len in [0, 0x10, 0x20, 0x40, data.len() - 1] {
            let err = Sarc::new(&data[..len]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Format, "length {}", len);
        }
    }

    #[test]
    fn unterminated_name() {
        let mut writer = SarcWriter::new();
        writer.add_file("abc", b"x".to_vec());
        let mut data = writer.write_to_bytes().unwrap();
        // Name table starts right after the single entry and the SFNT header
        let names = 0x20 + 0x10 + 0x8;
        for b in &mut data[names..0x100] {
            *b = b'z';
        }
        let sarc = Sarc::new(&data).unwrap();
        assert!(matches!(
            sarc.file_at(0),
            Err(Error::UnterminatedStringError)
        ));
        assert!(decode(&data).is_err());
    }

    #[test]
    fn colliding_hashes() {
        // 2 * 0x65 + 1 == 1 * 0x65 + 0x66
        let first = "\u{2}\u{1}";
        let second = "\u{1}f";
        assert_eq!(hash_name(0x65, first), hash_name(0x65, second));
        let mut writer = SarcWriter::new();
        writer.add_file(second, b"second".to_vec());
        writer.add_file(first, b"first".to_vec());
        let data = writer.write_to_bytes().unwrap();
        let sarc = Sarc::new(&data).unwrap();
        // First seen keeps the earlier slot
        assert_eq!(sarc.file_at(0).unwrap().name, Some(second));
        assert_eq!(sarc.get_file(first).unwrap().unwrap().data, b"first");
        assert_eq!(sarc.get_file(second).unwrap().unwrap().data, b"second");
    }

    #[test]
    fn unnamed_entry() {
        let data = sample();
        let mut patched = data.clone();
        // Clear the attribute byte of the first entry
        patched[0x20 + 4] = 0;
        let sarc = Sarc::new(&patched).unwrap();
        assert_eq!(sarc.file_at(0).unwrap().name, None);
        assert!(matches!(decode(&patched), Err(Error::UnnamedEntry(0))));
    }
}
