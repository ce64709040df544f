//! TAR backend, with transparent gzip, bzip2 and xz decompression.

use super::{write_scratch_entry, ArchiveBackend, BackendKind, MemberWriter};
use crate::error::{SecurityError, ViewerError};
use crate::safety::{is_safe_entry_type, EntryType};
use crate::types::{EntryRecord, ExtractOptions, ExtractStats};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Compression wrapped around the tar stream, detected from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Gzip,
    Bzip2,
    Xz,
}

impl Compression {
    fn detect(head: &[u8]) -> Self {
        match head {
            [0x1F, 0x8B, ..] => Compression::Gzip,
            [b'B', b'Z', b'h', ..] => Compression::Bzip2,
            [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, ..] => Compression::Xz,
            _ => Compression::None,
        }
    }
}

pub struct TarBackend {
    archive_path: PathBuf,
    options: ExtractOptions,
}

impl TarBackend {
    pub fn new(archive_path: PathBuf, options: ExtractOptions) -> Self {
        Self {
            archive_path,
            options,
        }
    }

    fn open(&self) -> Result<tar::Archive<Box<dyn Read>>, ViewerError> {
        let file = File::open(&self.archive_path)
            .map_err(|_| ViewerError::NotFound(self.archive_path.clone()))?;
        let mut reader = BufReader::new(file);
        let head = reader
            .fill_buf()
            .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;
        let compression = Compression::detect(head);
        tracing::debug!(path = %self.archive_path.display(), ?compression, "Opening tar stream");

        let stream: Box<dyn Read> = match compression {
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Xz => {
                // lzma-rs has no streaming reader; inflate up front.
                let mut decoded = Vec::new();
                lzma_rs::xz_decompress(&mut reader, &mut decoded)
                    .map_err(|e| ViewerError::ArchiveRead(format!("xz: {}", e)))?;
                Box::new(Cursor::new(decoded))
            }
            Compression::None => Box::new(reader),
        };

        Ok(tar::Archive::new(stream))
    }
}

fn entry_type(header: &tar::Header) -> EntryType {
    let kind = header.entry_type();
    if kind.is_dir() {
        EntryType::Directory
    } else if kind.is_file() || kind.is_gnu_sparse() || kind.is_contiguous() {
        EntryType::File
    } else if kind.is_symlink() {
        EntryType::Symlink
    } else if kind.is_hard_link() {
        EntryType::Hardlink
    } else {
        EntryType::Other
    }
}

/// Extended-header records that describe the following member.
fn is_metadata(header: &tar::Header) -> bool {
    let kind = header.entry_type();
    kind.is_pax_global_extensions()
        || kind.is_pax_local_extensions()
        || kind.is_gnu_longname()
        || kind.is_gnu_longlink()
}

/// Outcome of one pass over the archive looking for a member.
enum Lookup {
    Written(PathBuf),
    Link(String),
    Missing,
}

const MAX_LINK_DEPTH: usize = 8;

/// Member path with `.` segments and `..` resolved, `None` if it climbs out
/// of the archive root.
fn normalize_member(path: &str) -> Option<String> {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

/// Member a link points to. Hard link names are relative to the archive
/// root, symlink names to the link's own directory. Absolute symlinks leave
/// the archive.
fn link_target(link_path: &str, link_name: &str, kind: EntryType) -> Option<String> {
    if kind == EntryType::Hardlink {
        return normalize_member(link_name);
    }
    if link_name.starts_with('/') {
        return None;
    }
    let parent = link_path.trim_end_matches('/').rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    normalize_member(&format!("{}/{}", parent, link_name))
}

impl TarBackend {
    fn lookup(
        &self,
        dest_dir: &Path,
        entry_name: &str,
        matches: impl Fn(&str) -> bool,
    ) -> Result<Lookup, ViewerError> {
        let mut archive = self.open()?;
        let iter = archive
            .entries()
            .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;

        for entry_result in iter {
            let mut entry = entry_result.map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;
            let name = match entry.path() {
                Ok(path) => path.to_string_lossy().to_string(),
                Err(_) => continue,
            };
            if !matches(&name) {
                continue;
            }

            match entry_type(entry.header()) {
                EntryType::File => {
                    return write_scratch_entry(dest_dir, entry_name, &mut entry).map(Lookup::Written);
                }
                kind @ (EntryType::Symlink | EntryType::Hardlink) => {
                    let link_name = entry
                        .link_name()
                        .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?
                        .map(|link| link.to_string_lossy().to_string())
                        .unwrap_or_default();
                    return link_target(&name, &link_name, kind).map(Lookup::Link).ok_or_else(|| {
                        ViewerError::Extraction(format!("{}: link {} points outside the archive", entry_name, link_name))
                    });
                }
                EntryType::Directory | EntryType::Other => {}
            }
        }

        Ok(Lookup::Missing)
    }
}

impl ArchiveBackend for TarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Tar
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, ViewerError> {
        let mut archive = self.open()?;
        let mut entries = Vec::new();

        let iter = archive
            .entries()
            .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;
        for entry_result in iter {
            let entry = entry_result.map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;
            let header = entry.header();
            if is_metadata(header) {
                continue;
            }

            let path = entry
                .path()
                .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?
                .to_string_lossy()
                .to_string();
            let is_directory = header.entry_type().is_dir();
            let size = header.size().unwrap_or(0);

            entries.push(EntryRecord::from_archive_name(&path, size, is_directory));
        }

        Ok(entries)
    }

    /// Links are followed to their target member, so viewing a hard link or
    /// an in-archive symlink yields the target's bytes.
    fn extract_entry(&self, entry_name: &str, dest_dir: &Path) -> Result<PathBuf, ViewerError> {
        let mut lookup = self.lookup(dest_dir, entry_name, |name| name == entry_name)?;

        for _ in 0..MAX_LINK_DEPTH {
            match lookup {
                Lookup::Written(path) => return Ok(path),
                Lookup::Missing => return Err(ViewerError::EntryNotFound(entry_name.to_string())),
                Lookup::Link(target) => {
                    tracing::debug!(entry = entry_name, %target, "Following tar link");
                    lookup = self.lookup(dest_dir, entry_name, |name| {
                        normalize_member(name).as_deref() == Some(target.as_str())
                    })?;
                    if matches!(lookup, Lookup::Missing) {
                        return Err(ViewerError::Extraction(format!(
                            "{}: link target {} is not in the archive",
                            entry_name, target
                        )));
                    }
                }
            }
        }

        Err(ViewerError::Extraction(format!("{}: too many levels of links", entry_name)))
    }

    fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        let mut archive = self.open()?;
        let mut writer = MemberWriter::new(dest_dir, &self.options)?;

        let iter = archive
            .entries()
            .map_err(|e| ViewerError::Extraction(e.to_string()))?;
        for entry_result in iter {
            let mut entry = entry_result.map_err(|e| ViewerError::Extraction(e.to_string()))?;
            if is_metadata(entry.header()) {
                continue;
            }

            let name = entry
                .path()
                .map_err(|e| ViewerError::Extraction(e.to_string()))?
                .to_string_lossy()
                .to_string();
            let kind = entry_type(entry.header());

            if !is_safe_entry_type(kind, &self.options) {
                writer.reject(SecurityError::UnsafeEntryType(format!("{} ({:?})", name, kind)));
                continue;
            }

            match kind {
                EntryType::Directory => writer.directory(&name)?,
                EntryType::File => {
                    let size = entry.header().size().unwrap_or(0);
                    writer.file(&name, size, &mut entry)?;
                }
                EntryType::Symlink | EntryType::Hardlink => {
                    // Allowed links are unpacked by the tar crate itself, which
                    // refuses to write outside the destination.
                    if writer.target(&name).is_some() {
                        entry
                            .unpack_in(dest_dir)
                            .map_err(|e| ViewerError::Extraction(format!("{}: {}", name, e)))?;
                    }
                }
                EntryType::Other => {}
            }
        }

        let mut stats = writer.finish()?;
        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_targets() {
        assert_eq!(link_target("dir/hard.txt", "real.txt", EntryType::Hardlink).as_deref(), Some("real.txt"));
        assert_eq!(link_target("dir/soft.txt", "real.txt", EntryType::Symlink).as_deref(), Some("dir/real.txt"));
        assert_eq!(link_target("dir/soft.txt", "../real.txt", EntryType::Symlink).as_deref(), Some("real.txt"));
        assert_eq!(link_target("./soft.txt", "./a/./b.txt", EntryType::Symlink).as_deref(), Some("a/b.txt"));
        assert_eq!(link_target("soft.txt", "../../etc/passwd", EntryType::Symlink), None);
        assert_eq!(link_target("soft.txt", "/etc/passwd", EntryType::Symlink), None);
    }

    #[test]
    fn test_compression_detect() {
        assert_eq!(Compression::detect(&[0x1F, 0x8B, 0x08]), Compression::Gzip);
        assert_eq!(Compression::detect(b"BZh91AY"), Compression::Bzip2);
        assert_eq!(
            Compression::detect(&[0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00, 0x00]),
            Compression::Xz
        );
        assert_eq!(Compression::detect(b"ustar"), Compression::None);
        assert_eq!(Compression::detect(&[]), Compression::None);
    }
}
