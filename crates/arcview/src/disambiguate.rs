//! Deciding whether an executable is opened as a PE image or as an archive.
//!
//! Files named `.exe`/`.dll` are sniffed. Without archive bytes they go
//! straight to the PE view; polyglots wait for the user's choice. Nothing
//! is cached, so reopening the file asks again.

use crate::backend::BackendKind;
use crate::coordinator::ExtractionCoordinator;
use crate::error::ViewerError;
use crate::host::{ChoicePrompt, ViewChoice};
use crate::pe::PeViewerModel;
use crate::sniff::{classify, ArchiveFamily};
use crate::types::ExtractOptions;
use std::path::{Path, PathBuf};

/// Where the open decision stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Undetermined,
    Resolved(ViewChoice),
}

/// A file opened as one of the two views.
pub enum OpenedView {
    Pe(PeViewerModel),
    Archive(ExtractionCoordinator),
}

/// Whether `path` names a Windows executable.
pub fn is_executable_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("exe") || e.eq_ignore_ascii_case("dll"))
        .unwrap_or(false)
}

/// Open-time state for a single file.
#[derive(Debug, Clone)]
pub struct Disambiguation {
    path: PathBuf,
    family: ArchiveFamily,
    resolution: Resolution,
}

impl Disambiguation {
    /// Sniff `path` and settle whatever does not need the user.
    pub fn start(path: &Path) -> Self {
        let family = classify(path);
        let resolution = if !is_executable_path(path) {
            Resolution::Resolved(ViewChoice::Archive)
        } else if family.is_archive() {
            Resolution::Undetermined
        } else {
            Resolution::Resolved(ViewChoice::Pe)
        };

        tracing::debug!(path = %path.display(), %family, ?resolution, "Started open disambiguation");
        Self {
            path: path.to_path_buf(),
            family,
            resolution,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Archive family found by sniffing.
    pub fn family(&self) -> ArchiveFamily {
        self.family
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Record an explicit answer. Ignored once resolved.
    pub fn choose(&mut self, choice: ViewChoice) -> Resolution {
        if self.resolution == Resolution::Undetermined {
            self.resolution = Resolution::Resolved(choice);
        }
        self.resolution
    }

    /// Ask `prompt` if the choice is still open.
    pub fn resolve_with(&mut self, prompt: &dyn ChoicePrompt) -> Resolution {
        if self.resolution == Resolution::Undetermined {
            if let Some(choice) = prompt.choose(&self.path, self.family) {
                self.choose(choice);
            }
        }
        self.resolution
    }

    /// Open the resolved view, or `None` while undetermined.
    ///
    /// A failed PE parse of a file that also carries archive bytes reports
    /// the detected family in `PeFormat::archive_fallback`, so the caller can
    /// offer the archive view instead.
    pub fn open(&self, options: &ExtractOptions) -> Result<Option<OpenedView>, ViewerError> {
        let choice = match self.resolution {
            Resolution::Undetermined => return Ok(None),
            Resolution::Resolved(choice) => choice,
        };

        match choice {
            ViewChoice::Pe => match PeViewerModel::open(&self.path) {
                Ok(model) => Ok(Some(OpenedView::Pe(model))),
                Err(ViewerError::PeFormat { reason, .. }) if self.family.is_archive() => {
                    tracing::warn!(path = %self.path.display(), family = %self.family, "PE parse failed on a file with archive bytes");
                    Err(ViewerError::PeFormat {
                        reason,
                        archive_fallback: Some(self.family),
                    })
                }
                Err(e) => Err(e),
            },
            ViewChoice::Archive => {
                let kind = if is_executable_path(&self.path) {
                    BackendKind::for_family(self.family)
                } else {
                    BackendKind::for_path(&self.path)
                };
                ExtractionCoordinator::open_as(&self.path, kind, options).map(|c| Some(OpenedView::Archive(c)))
            }
        }
    }
}
