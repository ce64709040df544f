//! Ties one opened archive to its backend and unified tree.

use crate::backend::{ArchiveBackend, BackendKind};
use crate::error::ViewerError;
use crate::host::DirectoryPrompt;
use crate::safety::resolve_output_path;
use crate::tree::{PathTreeBuilder, TreeNode};
use crate::types::{ExtractOptions, ExtractStats, ScratchExtraction};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// An opened archive: the backend chosen at open time plus the tree built
/// from its listing.
///
/// The backend is never re-derived. Reopening the archive means building a
/// new coordinator, which rebuilds the tree.
pub struct ExtractionCoordinator {
    archive_path: PathBuf,
    backend: Box<dyn ArchiveBackend>,
    tree: TreeNode,
    options: ExtractOptions,
}

impl ExtractionCoordinator {
    /// Open an archive, selecting the backend by file extension.
    pub fn open(archive_path: &Path, options: &ExtractOptions) -> Result<Self, ViewerError> {
        Self::open_as(archive_path, BackendKind::for_path(archive_path), options)
    }

    /// Open an archive with an explicitly chosen backend.
    pub fn open_as(archive_path: &Path, kind: BackendKind, options: &ExtractOptions) -> Result<Self, ViewerError> {
        tracing::debug!(path = %archive_path.display(), backend = %kind, "Opening archive");
        Self::with_backend(archive_path, kind.open(archive_path, options), options)
    }

    pub fn with_backend(
        archive_path: &Path,
        backend: Box<dyn ArchiveBackend>,
        options: &ExtractOptions,
    ) -> Result<Self, ViewerError> {
        let entries = backend.list_entries()?;
        let count = entries.len();
        let tree = PathTreeBuilder::build(entries);
        tracing::debug!(path = %archive_path.display(), entries = count, "Built archive tree");

        Ok(Self {
            archive_path: archive_path.to_path_buf(),
            backend,
            tree,
            options: options.clone(),
        })
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn tree(&self) -> &TreeNode {
        &self.tree
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    /// Look up a node by `/`-separated path.
    pub fn find(&self, entry_path: &str) -> Result<&TreeNode, ViewerError> {
        self.tree
            .find(entry_path)
            .ok_or_else(|| ViewerError::EntryNotFound(entry_path.to_string()))
    }

    /// Materialize one file node in `scratch_dir`.
    ///
    /// The caller owns the returned extraction and should register it with
    /// a session so it is deleted on teardown.
    pub fn extract_one(&self, node: &TreeNode, scratch_dir: &Path) -> Result<ScratchExtraction, ViewerError> {
        let Some(info) = node.file_info() else {
            return Err(ViewerError::EntryNotFound(format!("{} is a directory", node.name())));
        };

        let local_path = self.backend.extract_entry(&info.archive_name, scratch_dir)?;
        tracing::debug!(entry = %info.display_path(), local = %local_path.display(), "Extracted entry for viewing");

        Ok(ScratchExtraction {
            source_archive_path: self.archive_path.clone(),
            entry_path: info.display_path(),
            local_path,
        })
    }

    /// Extract the whole archive under `dest_dir`, keeping relative paths.
    pub fn extract_all(&self, dest_dir: &Path) -> Result<ExtractStats, ViewerError> {
        let start_time = Instant::now();
        let mut stats = self.backend.extract_all(dest_dir)?;
        stats.duration = start_time.elapsed();

        tracing::info!(
            archive = %self.archive_path.display(),
            dest = %dest_dir.display(),
            files = stats.files_extracted,
            bytes = stats.bytes_written,
            "Extraction complete"
        );
        Ok(stats)
    }

    /// Ask for a destination and extract everything there. `None` when the
    /// user cancelled.
    pub fn extract_all_prompted(&self, prompt: &dyn DirectoryPrompt) -> Result<Option<ExtractStats>, ViewerError> {
        match prompt.choose_directory() {
            Some(dest_dir) => self.extract_all(&dest_dir).map(Some),
            None => {
                tracing::debug!("Bulk extraction cancelled");
                Ok(None)
            }
        }
    }

    /// Save one member as `dest_dir/<basename>`, honouring the overwrite
    /// mode. Returns `None` when an existing file was kept.
    pub fn export_entry(&self, entry_path: &str, dest_dir: &Path) -> Result<Option<PathBuf>, ViewerError> {
        let node = self.find(entry_path)?;
        let Some(info) = node.file_info() else {
            return Err(ViewerError::EntryNotFound(format!("{} is a directory", entry_path)));
        };

        fs::create_dir_all(dest_dir).map_err(|e| ViewerError::fs(dest_dir, e))?;
        let Some(target) = resolve_output_path(&dest_dir.join(info.file_name()), self.options.overwrite)? else {
            return Ok(None);
        };

        let staging = tempfile::Builder::new()
            .prefix(".arcview-export-")
            .tempdir_in(dest_dir)
            .map_err(|e| ViewerError::fs(dest_dir, e))?;
        let extracted = self.backend.extract_entry(&info.archive_name, staging.path())?;
        fs::rename(&extracted, &target).map_err(|e| ViewerError::fs(&target, e))?;

        tracing::info!(entry = entry_path, dest = %target.display(), "Exported entry");
        Ok(Some(target))
    }
}
