//! Capabilities supplied by the embedding application.

use crate::sniff::ArchiveFamily;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Renders a local file (image, text, PDF, ...).
pub trait FileViewer {
    /// Called once per "view this entry" action.
    fn open(&self, local_path: &Path, mime_hint: &str) -> io::Result<()>;
}

/// Answer to the PE-or-archive question for polyglot executables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewChoice {
    Pe,
    Archive,
}

impl fmt::Display for ViewChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewChoice::Pe => f.write_str("PE"),
            ViewChoice::Archive => f.write_str("Archive"),
        }
    }
}

impl FromStr for ViewChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pe" => Ok(ViewChoice::Pe),
            "archive" => Ok(ViewChoice::Archive),
            other => Err(format!("expected PE or Archive, got '{}'", other)),
        }
    }
}

/// Asks the user how to open a file that is both an executable and an archive.
pub trait ChoicePrompt {
    /// `None` means the user dismissed the question.
    fn choose(&self, path: &Path, family: ArchiveFamily) -> Option<ViewChoice>;
}

/// Asks the user for a destination directory.
pub trait DirectoryPrompt {
    /// `None` means the user cancelled.
    fn choose_directory(&self) -> Option<PathBuf>;
}
