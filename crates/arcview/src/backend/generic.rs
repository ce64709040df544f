//! Backend for archives whose format could not be identified.
//!
//! Nothing here reads the container directly. Every operation unpacks the
//! whole archive through the fallback chain into a private directory and
//! works from the unpacked tree.

use super::{write_scratch_entry, ArchiveBackend, BackendKind, MemberWriter};
use crate::error::{SecurityError, ViewerError};
use crate::fallback::FallbackChain;
use crate::types::{EntryRecord, ExtractOptions, ExtractStats};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use walkdir::WalkDir;

pub struct GenericBackend {
    archive_path: PathBuf,
    options: ExtractOptions,
    chain: FallbackChain,
}

impl GenericBackend {
    pub fn new(archive_path: PathBuf, options: ExtractOptions) -> Self {
        let chain = FallbackChain::standard(&options);
        Self::with_chain(archive_path, options, chain)
    }

    /// Use a custom strategy list instead of the standard one.
    pub fn with_chain(archive_path: PathBuf, options: ExtractOptions, chain: FallbackChain) -> Self {
        Self {
            archive_path,
            options,
            chain,
        }
    }

    fn unpack(&self) -> Result<TempDir, ViewerError> {
        if !self.archive_path.exists() {
            return Err(ViewerError::NotFound(self.archive_path.clone()));
        }
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}unpack-", self.options.scratch_prefix))
            .tempdir()
            .map_err(|e| ViewerError::fs(std::env::temp_dir(), e))?;
        self.chain.extract_all(&self.archive_path, dir.path())?;
        Ok(dir)
    }
}

/// Relative member name with `/` separators, directories ending in `/`.
fn member_name(root: &Path, path: &Path, is_dir: bool) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut name = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if name.is_empty() {
        return None;
    }
    if is_dir {
        name.push('/');
    }
    Some(name)
}

fn walk_unpacked(root: &Path) -> impl Iterator<Item = (String, walkdir::DirEntry)> + '_ {
    WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(move |entry| {
            let is_dir = entry.file_type().is_dir();
            member_name(root, entry.path(), is_dir).map(|name| (name, entry))
        })
}

impl ArchiveBackend for GenericBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Generic
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, ViewerError> {
        let unpacked = self.unpack()?;
        let mut entries = Vec::new();

        for (name, entry) in walk_unpacked(unpacked.path()) {
            let is_dir = entry.file_type().is_dir();
            let size = if is_dir {
                0
            } else {
                entry.metadata().map(|m| m.len()).unwrap_or(0)
            };
            entries.push(EntryRecord::from_archive_name(&name, size, is_dir));
        }

        Ok(entries)
    }

    fn extract_entry(&self, entry_name: &str, dest_dir: &Path) -> Result<PathBuf, ViewerError> {
        let unpacked = self.unpack()?;
        let Some((_, entry)) = walk_unpacked(unpacked.path())
            .find(|(name, entry)| name == entry_name && entry.file_type().is_file())
        else {
            return Err(ViewerError::EntryNotFound(entry_name.to_string()));
        };

        let mut file = File::open(entry.path()).map_err(|e| ViewerError::fs(entry.path(), e))?;
        write_scratch_entry(dest_dir, entry_name, &mut file)
    }

    fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        let unpacked = self.unpack()?;
        let mut writer = MemberWriter::new(dest_dir, &self.options)?;

        for (name, entry) in walk_unpacked(unpacked.path()) {
            let file_type = entry.file_type();
            if file_type.is_dir() {
                writer.directory(&name)?;
            } else if file_type.is_file() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                let mut file = File::open(entry.path()).map_err(|e| ViewerError::fs(entry.path(), e))?;
                writer.file(&name, size, &mut file)?;
            } else {
                writer.reject(SecurityError::UnsafeEntryType(name));
            }
        }

        let mut stats = writer.finish()?;
        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}
