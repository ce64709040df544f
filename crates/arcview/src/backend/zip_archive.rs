//! ZIP (and JAR) backend.

use super::{write_scratch_entry, ArchiveBackend, BackendKind, MemberWriter};
use crate::error::ViewerError;
use crate::types::{EntryRecord, ExtractOptions, ExtractStats};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use zip::result::ZipError;
use zip::ZipArchive;

pub struct ZipBackend {
    archive_path: PathBuf,
    options: ExtractOptions,
}

impl ZipBackend {
    pub fn new(archive_path: PathBuf, options: ExtractOptions) -> Self {
        Self {
            archive_path,
            options,
        }
    }

    fn open(&self) -> Result<ZipArchive<File>, ViewerError> {
        let file = File::open(&self.archive_path)
            .map_err(|_| ViewerError::NotFound(self.archive_path.clone()))?;
        ZipArchive::new(file).map_err(|e| ViewerError::ArchiveRead(format!("{}: {}", self.archive_path.display(), e)))
    }
}

impl ArchiveBackend for ZipBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Zip
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, ViewerError> {
        let mut archive = self.open()?;
        let mut entries = Vec::with_capacity(archive.len());

        for i in 0..archive.len() {
            let entry = archive
                .by_index_raw(i)
                .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;
            entries.push(EntryRecord::from_archive_name(
                entry.name(),
                entry.size(),
                entry.is_dir(),
            ));
        }

        Ok(entries)
    }

    fn extract_entry(&self, entry_name: &str, dest_dir: &Path) -> Result<PathBuf, ViewerError> {
        let mut archive = self.open()?;
        let mut entry = match archive.by_name(entry_name) {
            Ok(entry) => entry,
            Err(ZipError::FileNotFound) => return Err(ViewerError::EntryNotFound(entry_name.to_string())),
            Err(e) => return Err(ViewerError::Extraction(format!("{}: {}", entry_name, e))),
        };
        if entry.is_dir() {
            return Err(ViewerError::EntryNotFound(entry_name.to_string()));
        }

        write_scratch_entry(dest_dir, entry_name, &mut entry)
    }

    fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        let mut archive = self.open()?;
        let mut writer = MemberWriter::new(dest_dir, &self.options)?;

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| ViewerError::Extraction(e.to_string()))?;
            let name = entry.name().to_string();

            if entry.is_dir() {
                writer.directory(&name)?;
            } else {
                let size = entry.size();
                writer.file(&name, size, &mut entry)?;
            }
        }

        let mut stats = writer.finish()?;
        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}
