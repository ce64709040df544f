//! 7-Zip backend.

use super::{write_scratch_entry, ArchiveBackend, BackendKind, MemberWriter};
use crate::error::ViewerError;
use crate::types::{EntryRecord, ExtractOptions, ExtractStats};
use sevenz_rust2::{Password, SevenZReader};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub struct SevenZipBackend {
    archive_path: PathBuf,
    options: ExtractOptions,
}

impl SevenZipBackend {
    pub fn new(archive_path: PathBuf, options: ExtractOptions) -> Self {
        Self {
            archive_path,
            options,
        }
    }

    fn open(&self) -> Result<SevenZReader<File>, ViewerError> {
        if !self.archive_path.exists() {
            return Err(ViewerError::NotFound(self.archive_path.clone()));
        }
        SevenZReader::open(&self.archive_path, Password::empty())
            .map_err(|e| ViewerError::ArchiveRead(format!("{}: {}", self.archive_path.display(), e)))
    }
}

impl ArchiveBackend for SevenZipBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SevenZip
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, ViewerError> {
        let reader = self.open()?;
        Ok(reader
            .archive()
            .files
            .iter()
            .map(|entry| EntryRecord::from_archive_name(entry.name(), entry.size(), entry.is_directory()))
            .collect())
    }

    fn extract_entry(&self, entry_name: &str, dest_dir: &Path) -> Result<PathBuf, ViewerError> {
        let mut reader = self.open()?;
        let mut extracted: Option<Result<PathBuf, ViewerError>> = None;

        reader
            .for_each_entries(|entry, data| {
                if entry.name() == entry_name && !entry.is_directory() {
                    extracted = Some(write_scratch_entry(dest_dir, entry_name, data));
                    return Ok(false);
                }
                // Solid blocks decode sequentially; drain what we skip.
                io::copy(data, &mut io::sink())?;
                Ok(true)
            })
            .map_err(|e| ViewerError::Extraction(format!("{}: {}", entry_name, e)))?;

        extracted.unwrap_or_else(|| Err(ViewerError::EntryNotFound(entry_name.to_string())))
    }

    fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        let mut reader = self.open()?;
        let mut writer = MemberWriter::new(dest_dir, &self.options)?;
        let mut failure: Option<ViewerError> = None;

        reader
            .for_each_entries(|entry, data| {
                let outcome = if entry.is_directory() {
                    writer.directory(entry.name())
                } else {
                    writer.file(entry.name(), entry.size(), data)
                };
                match outcome {
                    Ok(()) => Ok(true),
                    Err(e) => {
                        failure = Some(e);
                        Ok(false)
                    }
                }
            })
            .map_err(|e| ViewerError::Extraction(e.to_string()))?;

        if let Some(e) = failure {
            return Err(e);
        }

        let mut stats = writer.finish()?;
        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}
