use crate::names::{padded_name_len, NameTable};
use crate::*;
use indexmap::IndexMap;
use std::io::{Cursor, Seek, SeekFrom, Write};

/// Default data alignment of packed files
pub const DEFAULT_ALIGNMENT: usize = 0x100;

/// Highest file count the SFAT header can describe
const MAX_FILES: usize = 0x3FFF;

fn normalize_name(name: &str) -> String {
    name.replace('\\', "/")
}

fn to_u32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::InvalidData(what.to_owned(), value.to_string()))
}

/// Writes zero bytes up to the next multiple of `alignment`
fn pad_to<W: Write + Seek>(writer: &mut W, alignment: usize) -> Result<()> {
    let pos = writer.stream_position()? as usize;
    writer.write_all(&vec![0u8; align(pos, alignment) - pos])?;
    Ok(())
}

/// Builds big endian SARC archives.
///
/// Files keep their insertion order until the archive is written, at which
/// point they are sorted by name hash. Files whose hashes collide stay in the
/// order they were added.
#[derive(Debug, PartialEq, Clone)]
pub struct SarcWriter {
    hash_multiplier: u32,
    alignment: usize,
    file_map: IndexMap<String, Vec<u8>>,
}

impl Default for SarcWriter {
    fn default() -> Self {
        SarcWriter::new()
    }
}

impl SarcWriter {
    pub fn new() -> SarcWriter {
        SarcWriter {
            hash_multiplier: HASH_MULTIPLIER,
            alignment: DEFAULT_ALIGNMENT,
            file_map: IndexMap::new(),
        }
    }

    /// Creates a writer holding every named file of an existing archive,
    /// aligned the way that archive appears to be
    pub fn from_sarc(sarc: &Sarc) -> Result<SarcWriter> {
        let mut writer = SarcWriter::new();
        writer.set_alignment(sarc.guess_min_alignment())?;
        for (index, file) in sarc.files().enumerate() {
            let file = file?;
            let name = file.name.ok_or(Error::UnnamedEntry(index))?;
            writer.add_file(name, file.data.to_vec());
        }
        Ok(writer)
    }

    /// Adds a file, returning the previous data if a file with the same
    /// name was already present. `\` separators are converted to `/`.
    pub fn add_file(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Option<Vec<u8>> {
        self.file_map.insert(normalize_name(name), data.into())
    }

    pub fn remove_file(&mut self, name: &str) -> Option<Vec<u8>> {
        self.file_map.shift_remove(&normalize_name(name))
    }

    pub fn contains_file(&self, name: &str) -> bool {
        self.file_map.contains_key(&normalize_name(name))
    }

    pub fn file_count(&self) -> usize {
        self.file_map.len()
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: usize) -> Result<()> {
        if !is_valid_alignment(alignment) || alignment > u32::MAX as usize {
            return Err(Error::InvalidAlignmentError(alignment));
        }
        self.alignment = alignment;
        Ok(())
    }

    pub fn write_to_bytes(&mut self) -> Result<Vec<u8>> {
        let est_size: usize = RES_HEADER_SIZE
            + 0x0C
            + FNT_HEADER_SIZE
            + self.alignment
            + self
                .file_map
                .iter()
                .map(|(n, d)| FAT_ENTRY_SIZE + padded_name_len(n) + align(d.len(), self.alignment))
                .sum::<usize>();
        let mut buf: Vec<u8> = Vec::with_capacity(est_size);
        self.write(&mut Cursor::new(&mut buf))?;
        Ok(buf)
    }

    /// Writes the archive to the start of `writer`
    pub fn write<W: Write + Seek>(&mut self, writer: &mut W) -> Result<()> {
        if self.file_map.is_empty() {
            return Err(Error::EmptyArchive);
        }
        if self.file_map.len() > MAX_FILES {
            return Err(Error::TooManyFiles(self.file_map.len()));
        }
        let opts = big_endian();
        let multiplier = self.hash_multiplier;
        let alignment = self.alignment;

        self.file_map.sort_by(move |name, _, name2, _| {
            Ord::cmp(&hash_name(multiplier, name), &hash_name(multiplier, name2))
        });
        let names = NameTable::build(self.file_map.keys().map(String::as_str))?;
        tracing::debug!(
            files = self.file_map.len(),
            alignment,
            "writing SARC"
        );

        writer.seek(SeekFrom::Start(RES_HEADER_SIZE as u64))?;
        ResFatHeader {
            magic: SFAT_MAGIC,
            header_size: 0x0C,
            num_files: self.file_map.len() as u16,
            hash_multiplier: self.hash_multiplier,
        }
        .write_options(writer, &opts)?;

        {
            let mut rel_data_offset = 0;
            for ((name, data), name_offset) in self.file_map.iter().zip(names.offsets()) {
                let offset = align(rel_data_offset, alignment);
                let name_hash = hash_name(multiplier, name);
                let entry = ResFatEntry {
                    name_hash,
                    rel_name_opt_offset: 1 << 24 | name_offset,
                    data_begin: to_u32(offset, "SFAT data offset")?,
                    data_end: to_u32(offset + data.len(), "SFAT data offset")?,
                };
                tracing::trace!(
                    name = name.as_str(),
                    name_hash,
                    data_begin = entry.data_begin,
                    data_end = entry.data_end,
                    "SFAT entry"
                );
                entry.write_options(writer, &opts)?;
                rel_data_offset = offset + data.len();
            }
        }

        ResFntHeader {
            magic: SFNT_MAGIC,
            header_size: FNT_HEADER_SIZE as u16,
            reserved: 0,
        }
        .write_options(writer, &opts)?;
        writer.write_all(names.as_bytes())?;
        pad_to(writer, alignment)?;

        let data_offset_begin = to_u32(writer.stream_position()? as usize, "SARC data offset")?;
        for data in self.file_map.values() {
            // The last file is not padded; the archive ends with its data
            pad_to(writer, alignment)?;
            writer.write_all(data)?;
        }

        let file_size = writer.stream_position()?;
        writer.seek(SeekFrom::Start(0))?;
        ResHeader {
            magic: SARC_MAGIC,
            header_size: RES_HEADER_SIZE as u16,
            bom: u16::from_be_bytes(BOM_BIG),
            file_size: to_u32(file_size as usize, "SARC file size")?,
            data_offset: data_offset_begin,
            version: SARC_VERSION,
            reserved: 0,
        }
        .write_options(writer, &opts)?;
        writer.seek(SeekFrom::Start(file_size))?;
        Ok(())
    }
}

/// Encodes `(path, bytes)` pairs into a SARC archive.
///
/// Fails if `files` is empty or names the same path twice.
pub fn encode<I, N, D>(files: I, alignment: usize) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (N, D)>,
    N: AsRef<str>,
    D: Into<Vec<u8>>,
{
    let mut writer = SarcWriter::new();
    writer.set_alignment(alignment)?;
    for (name, data) in files {
        let name = name.as_ref();
        if writer.contains_file(name) {
            return Err(Error::DuplicateName(normalize_name(name)));
        }
        writer.add_file(name, data);
    }
    writer.write_to_bytes()
}
