//! Viewer sessions own the scratch space of everything they extract.

use crate::coordinator::ExtractionCoordinator;
use crate::error::ViewerError;
use crate::host::FileViewer;
use crate::mime::guess_mime;
use crate::tree::TreeNode;
use crate::types::{ExtractOptions, ScratchExtraction};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Outcome of tearing down a session's scratch space.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub files_removed: usize,

    /// Paths that could not be deleted, with the reason.
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scratch-space owner for one archive or executable view.
///
/// The scratch directory is created on the first extraction and deleted by
/// [`ViewerSession::close`], or on drop if the session was never closed.
pub struct ViewerSession {
    id: Uuid,
    prefix: String,
    scratch: Option<TempDir>,
    extractions: Vec<ScratchExtraction>,
}

impl ViewerSession {
    pub fn new(options: &ExtractOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            prefix: options.scratch_prefix.clone(),
            scratch: None,
            extractions: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The session's scratch directory, created on first use.
    pub fn scratch_dir(&mut self) -> Result<&Path, ViewerError> {
        let dir = match self.scratch.take() {
            Some(dir) => dir,
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(&format!("{}{}-", self.prefix, self.id))
                    .tempdir()
                    .map_err(|e| ViewerError::fs(std::env::temp_dir(), e))?;
                tracing::debug!(session = %self.id, dir = %dir.path().display(), "Created scratch directory");
                dir
            }
        };
        Ok(self.scratch.insert(dir).path())
    }

    /// Hand an extraction to the session so it is deleted on teardown.
    pub fn register(&mut self, extraction: ScratchExtraction) {
        self.extractions.push(extraction);
    }

    pub fn extractions(&self) -> &[ScratchExtraction] {
        &self.extractions
    }

    /// Extract a file node into scratch space and track it.
    pub fn extract(
        &mut self,
        coordinator: &ExtractionCoordinator,
        node: &TreeNode,
    ) -> Result<ScratchExtraction, ViewerError> {
        let scratch = self.scratch_dir()?.to_path_buf();
        let extraction = coordinator.extract_one(node, &scratch)?;
        self.register(extraction.clone());
        Ok(extraction)
    }

    /// Write bytes under `file_name` in scratch space and track them.
    pub(crate) fn materialize(
        &mut self,
        source: &Path,
        file_name: &str,
        data: &[u8],
    ) -> Result<ScratchExtraction, ViewerError> {
        let scratch = self.scratch_dir()?.to_path_buf();
        // One directory per item keeps the exact file name visible to the viewer.
        let dir = scratch.join(format!("item-{}", Uuid::new_v4().simple()));
        fs::create_dir(&dir).map_err(|e| ViewerError::fs(&dir, e))?;
        let local_path = dir.join(file_name);
        fs::write(&local_path, data).map_err(|e| ViewerError::fs(&local_path, e))?;

        let extraction = ScratchExtraction {
            source_archive_path: source.to_path_buf(),
            entry_path: file_name.to_string(),
            local_path,
        };
        self.register(extraction.clone());
        Ok(extraction)
    }

    /// Extract a node and open it in the external viewer with a MIME hint
    /// derived from the entry's name.
    pub fn view_entry(
        &mut self,
        coordinator: &ExtractionCoordinator,
        node: &TreeNode,
        viewer: &dyn FileViewer,
    ) -> Result<ScratchExtraction, ViewerError> {
        let extraction = self.extract(coordinator, node)?;
        open_in_viewer(&extraction, viewer)?;
        Ok(extraction)
    }

    /// Delete every extraction and the scratch directory.
    pub fn close(mut self) -> CleanupReport {
        self.cleanup()
    }

    fn cleanup(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        for extraction in self.extractions.drain(..) {
            match fs::remove_file(&extraction.local_path) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %extraction.local_path.display(), error = %e, "Failed to remove scratch file");
                    report.failures.push((extraction.local_path, e.to_string()));
                }
            }
        }

        if let Some(dir) = self.scratch.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove scratch directory");
                report.failures.push((path, e.to_string()));
            }
        }

        tracing::debug!(session = %self.id, removed = report.files_removed, "Closed viewer session");
        report
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        if self.scratch.is_some() || !self.extractions.is_empty() {
            self.cleanup();
        }
    }
}

/// Open an extraction with its entry-name MIME hint.
pub(crate) fn open_in_viewer(extraction: &ScratchExtraction, viewer: &dyn FileViewer) -> Result<(), ViewerError> {
    let mime = crate::mime::mime_for_extension(Path::new(&extraction.entry_path))
        .map(str::to_string)
        .unwrap_or_else(|| guess_mime(&extraction.local_path));
    viewer
        .open(&extraction.local_path, &mime)
        .map_err(|e| ViewerError::fs(&extraction.local_path, e))
}
