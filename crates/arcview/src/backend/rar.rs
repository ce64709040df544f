//! RAR backend (read-only, via the unrar library).

use super::{write_scratch_entry, ArchiveBackend, BackendKind, MemberWriter};
use crate::error::ViewerError;
use crate::types::{EntryRecord, ExtractOptions, ExtractStats};
use std::path::{Path, PathBuf};
use std::time::Instant;
use unrar::Archive;

pub struct RarBackend {
    archive_path: PathBuf,
    options: ExtractOptions,
}

impl RarBackend {
    pub fn new(archive_path: PathBuf, options: ExtractOptions) -> Self {
        Self {
            archive_path,
            options,
        }
    }

    fn check_exists(&self) -> Result<(), ViewerError> {
        if self.archive_path.exists() {
            Ok(())
        } else {
            Err(ViewerError::NotFound(self.archive_path.clone()))
        }
    }
}

/// Member name exactly as stored in the RAR header. Separator handling is
/// left to `EntryRecord` and `MemberWriter`.
fn member_name(filename: &Path) -> String {
    filename.to_string_lossy().into_owned()
}

impl ArchiveBackend for RarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rar
    }

    fn list_entries(&self) -> Result<Vec<EntryRecord>, ViewerError> {
        self.check_exists()?;
        let archive = Archive::new(&self.archive_path)
            .open_for_listing()
            .map_err(|e| ViewerError::ArchiveRead(format!("{}: {}", self.archive_path.display(), e)))?;

        let mut entries = Vec::new();
        for header in archive {
            let header = header.map_err(|e| ViewerError::ArchiveRead(e.to_string()))?;
            entries.push(EntryRecord::from_archive_name(
                &member_name(&header.filename),
                header.unpacked_size,
                header.is_directory(),
            ));
        }

        Ok(entries)
    }

    fn extract_entry(&self, entry_name: &str, dest_dir: &Path) -> Result<PathBuf, ViewerError> {
        self.check_exists()?;
        let mut current = Some(
            Archive::new(&self.archive_path)
                .open_for_processing()
                .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?,
        );

        while let Some(archive) = current {
            let Some(header) = archive
                .read_header()
                .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?
            else {
                break;
            };

            let entry = header.entry();
            if member_name(&entry.filename) == entry_name && !entry.is_directory() {
                let (data, _) = header
                    .read()
                    .map_err(|e| ViewerError::Extraction(format!("{}: {}", entry_name, e)))?;
                return write_scratch_entry(dest_dir, entry_name, &mut data.as_slice());
            }

            current = Some(
                header
                    .skip()
                    .map_err(|e| ViewerError::ArchiveRead(e.to_string()))?,
            );
        }

        Err(ViewerError::EntryNotFound(entry_name.to_string()))
    }

    fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        self.check_exists()?;
        let mut writer = MemberWriter::new(dest_dir, &self.options)?;

        let mut current = Some(
            Archive::new(&self.archive_path)
                .as_first_part()
                .open_for_processing()
                .map_err(|e| ViewerError::Extraction(e.to_string()))?,
        );

        while let Some(archive) = current {
            let Some(header) = archive
                .read_header()
                .map_err(|e| ViewerError::Extraction(e.to_string()))?
            else {
                break;
            };

            let entry = header.entry();
            let name = member_name(&entry.filename);

            if entry.is_directory() {
                writer.directory(&name)?;
                current = Some(header.skip().map_err(|e| ViewerError::Extraction(e.to_string()))?);
                continue;
            }

            let (data, rest) = header
                .read()
                .map_err(|e| ViewerError::Extraction(format!("{}: {}", name, e)))?;
            writer.file(&name, data.len() as u64, &mut data.as_slice())?;
            current = Some(rest);
        }

        let mut stats = writer.finish()?;
        stats.duration = start_time.elapsed();
        Ok(stats)
    }
}
