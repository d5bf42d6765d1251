use crate::{decode, encode, Error, Result};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Reads every file below `root` as `(path, bytes)` pairs, with paths
/// relative to `root` and joined with `/`. Files are visited in file name
/// order so the result does not depend on the filesystem.
pub fn collect_dir<P: AsRef<Path>>(root: P) -> Result<Vec<(String, Vec<u8>)>> {
    let root = root.as_ref();
    let mut files = vec![];
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).map_err(|_| {
            Error::InvalidData("path".to_owned(), entry.path().display().to_string())
        })?;
        let name = rel
            .components()
            .map(|c| {
                c.as_os_str().to_str().ok_or_else(|| {
                    Error::InvalidData("file name".to_owned(), rel.display().to_string())
                })
            })
            .collect::<Result<Vec<_>>>()?
            .join("/");
        files.push((name, std::fs::read(entry.path())?));
    }
    tracing::debug!(root = %root.display(), files = files.len(), "collected directory");
    Ok(files)
}

/// Packs every file below `root` into a SARC archive
pub fn pack_dir<P: AsRef<Path>>(root: P, alignment: usize) -> Result<Vec<u8>> {
    encode(collect_dir(root)?, alignment)
}

/// Archive path as a relative filesystem path, rejecting anything that
/// could land outside the output directory
fn safe_path(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            _ => return Err(Error::UnsafePath(name.to_owned())),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(Error::UnsafePath(name.to_owned()));
    }
    Ok(out)
}

/// Extracts every file of a SARC archive below `out_dir`, returning the
/// written paths.
///
/// The archive is decoded and every name checked before anything is
/// written, so a malformed archive leaves the filesystem untouched.
pub fn extract_to_dir<P: AsRef<Path>>(data: &[u8], out_dir: P) -> Result<Vec<PathBuf>> {
    let out_dir = out_dir.as_ref();
    let files = decode(data)?
        .into_iter()
        .map(|(name, data)| Ok((out_dir.join(safe_path(&name)?), data)))
        .collect::<Result<Vec<_>>>()?;

    let mut written = Vec::with_capacity(files.len());
    for (path, data) in files {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data)?;
        tracing::trace!(path = %path.display(), "extracted");
        written.push(path);
    }
    tracing::debug!(out_dir = %out_dir.display(), files = written.len(), "extracted archive");
    Ok(written)
}
