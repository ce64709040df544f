//! Per-format archive backends behind one contract.
//!
//! A backend is chosen once when an archive is opened (see
//! [`BackendKind::for_path`] and [`BackendKind::for_family`]) and then used
//! for listing and extraction without re-deriving the format.

mod generic;
mod rar;
mod sevenz;
mod tar_archive;
mod zip_archive;

pub use self::generic::GenericBackend;
pub use self::rar::RarBackend;
pub use self::sevenz::SevenZipBackend;
pub use self::tar_archive::TarBackend;
pub use self::zip_archive::ZipBackend;

use crate::error::{SecurityError, ViewerError};
use crate::safety::{check_size_limits, resolve_output_path, validate_entry_path};
use crate::sniff::ArchiveFamily;
use crate::types::{dotted_extension, EntryRecord, ExtractOptions, ExtractStats};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Uniform operations every archive backend provides.
pub trait ArchiveBackend {
    fn kind(&self) -> BackendKind;

    /// Enumerate all members in archive-native order.
    fn list_entries(&self) -> Result<Vec<EntryRecord>, ViewerError>;

    /// Extract one member (by its archive-native name) to a fresh file under
    /// `dest_dir`, keeping the member's extension. Returns the file path.
    fn extract_entry(&self, entry_name: &str, dest_dir: &Path) -> Result<PathBuf, ViewerError>;

    /// Extract every member under `dest_dir`, preserving relative paths.
    fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError>;
}

/// Which backend handles an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Zip,
    Rar,
    SevenZip,
    Tar,
    Generic,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Zip => "zip",
            BackendKind::Rar => "rar",
            BackendKind::SevenZip => "7z",
            BackendKind::Tar => "tar",
            BackendKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

impl BackendKind {
    /// Select a backend from the file name.
    pub fn for_path(path: &Path) -> Self {
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("")
            .to_lowercase();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "zip" | "jar" => BackendKind::Zip,
            "rar" => BackendKind::Rar,
            "7z" => BackendKind::SevenZip,
            "tar" | "tgz" | "tbz" | "tbz2" | "txz" => BackendKind::Tar,
            "gz" | "bz2" | "xz" if filename.ends_with(&format!(".tar.{}", extension)) => {
                BackendKind::Tar
            }
            _ => BackendKind::Generic,
        }
    }

    /// Select a backend from a sniffed family.
    pub fn for_family(family: ArchiveFamily) -> Self {
        match family {
            ArchiveFamily::Zip => BackendKind::Zip,
            ArchiveFamily::Rar => BackendKind::Rar,
            ArchiveFamily::SevenZip => BackendKind::SevenZip,
            ArchiveFamily::Unknown => BackendKind::Generic,
        }
    }

    /// Instantiate the backend for `archive_path`.
    pub fn open(self, archive_path: &Path, options: &ExtractOptions) -> Box<dyn ArchiveBackend> {
        let path = archive_path.to_path_buf();
        let options = options.clone();
        match self {
            BackendKind::Zip => Box::new(ZipBackend::new(path, options)),
            BackendKind::Rar => Box::new(RarBackend::new(path, options)),
            BackendKind::SevenZip => Box::new(SevenZipBackend::new(path, options)),
            BackendKind::Tar => Box::new(TarBackend::new(path, options)),
            BackendKind::Generic => Box::new(GenericBackend::new(path, options)),
        }
    }
}

/// Create a fresh, uniquely named file under `dest_dir` carrying the
/// extension of `entry_name`. The file outlives this call.
pub(crate) fn fresh_scratch_file(dest_dir: &Path, entry_name: &str) -> Result<(File, PathBuf), ViewerError> {
    let leaf = entry_name.replace('\\', "/");
    let suffix = dotted_extension(Path::new(leaf.rsplit('/').next().unwrap_or("")));

    let temp = tempfile::Builder::new()
        .prefix("entry-")
        .suffix(&suffix)
        .tempfile_in(dest_dir)
        .map_err(|e| ViewerError::fs(dest_dir, e))?;

    temp.keep()
        .map_err(|e| ViewerError::fs(dest_dir, e.error))
}

/// Copy a member's bytes into a fresh scratch file.
pub(crate) fn write_scratch_entry(
    dest_dir: &Path,
    entry_name: &str,
    reader: &mut dyn Read,
) -> Result<PathBuf, ViewerError> {
    let (mut file, path) = fresh_scratch_file(dest_dir, entry_name)?;
    if let Err(e) = io::copy(reader, &mut file) {
        let _ = fs::remove_file(&path);
        return Err(ViewerError::Extraction(format!("{}: {}", entry_name, e)));
    }
    Ok(path)
}

/// Writes validated members under a destination directory while tracking
/// size limits and statistics.
///
/// Unsafe members are skipped one by one. When every member of an archive
/// was refused, [`MemberWriter::finish`] reports the first refusal.
pub(crate) struct MemberWriter<'a> {
    dest_dir: &'a Path,
    options: &'a ExtractOptions,
    stats: ExtractStats,
    accepted: usize,
    first_rejection: Option<SecurityError>,
}

impl<'a> MemberWriter<'a> {
    pub(crate) fn new(dest_dir: &'a Path, options: &'a ExtractOptions) -> Result<Self, ViewerError> {
        fs::create_dir_all(dest_dir).map_err(|e| ViewerError::fs(dest_dir, e))?;
        Ok(Self {
            dest_dir,
            options,
            stats: ExtractStats::default(),
            accepted: 0,
            first_rejection: None,
        })
    }

    /// Map a member name to its output path, or `None` when the name is unsafe.
    pub(crate) fn target(&mut self, entry_name: &str) -> Option<PathBuf> {
        let normalized = entry_name.replace('\\', "/");
        match validate_entry_path(Path::new(&normalized)) {
            Ok(relative) => {
                self.accepted += 1;
                Some(self.dest_dir.join(relative))
            }
            Err(e) => {
                self.reject(e);
                None
            }
        }
    }

    /// Record a member that will not be written.
    pub(crate) fn reject(&mut self, error: SecurityError) {
        tracing::warn!(error = %error, "Skipping unsafe archive member");
        self.first_rejection.get_or_insert(error);
    }

    /// Final statistics, or the first security refusal if nothing was accepted.
    pub(crate) fn finish(self) -> Result<ExtractStats, ViewerError> {
        match self.first_rejection {
            Some(error) if self.accepted == 0 => Err(ViewerError::Security(error)),
            _ => Ok(self.stats),
        }
    }

    pub(crate) fn directory(&mut self, entry_name: &str) -> Result<(), ViewerError> {
        if let Some(path) = self.target(entry_name) {
            fs::create_dir_all(&path).map_err(|e| ViewerError::fs(&path, e))?;
        }
        Ok(())
    }

    /// Write one file member. `size_hint` is checked against the limit
    /// before any byte is written.
    pub(crate) fn file(&mut self, entry_name: &str, size_hint: u64, reader: &mut dyn Read) -> Result<(), ViewerError> {
        let Some(path) = self.target(entry_name) else {
            return Ok(());
        };

        check_size_limits(self.stats.bytes_written + size_hint, self.options.size_limit_bytes)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ViewerError::fs(parent, e))?;
        }

        let Some(output_path) = resolve_output_path(&path, self.options.overwrite)? else {
            tracing::debug!(path = %path.display(), "Skipping existing file");
            return Ok(());
        };

        let mut out = File::create(&output_path).map_err(|e| ViewerError::fs(&output_path, e))?;
        let written = io::copy(reader, &mut out)
            .map_err(|e| ViewerError::Extraction(format!("{}: {}", entry_name, e)))?;

        self.stats.bytes_written += written;
        self.stats.files_extracted += 1;
        check_size_limits(self.stats.bytes_written, self.options.size_limit_bytes)
    }
}
