//! Error types for archive browsing, extraction and PE inspection.

use crate::sniff::ArchiveFamily;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for every viewer operation.
#[derive(Debug, Error)]
pub enum ViewerError {
    /// Reading magic bytes failed. Only surfaced by `sniff::try_classify`;
    /// `classify` recovers it as `ArchiveFamily::Unknown`.
    #[error("Could not sniff {path}: {source}")]
    Sniff {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive file not found at the specified path.
    #[error("Archive not found: {0}")]
    NotFound(PathBuf),

    /// The container cannot be opened or is corrupt.
    #[error("Cannot read archive: {0}")]
    ArchiveRead(String),

    /// The requested member does not exist in the archive.
    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    /// The member exists but decoding or writing it failed.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// Every method of the generic fallback chain failed.
    #[error("All extraction methods failed: {}", FailureList(.0))]
    FallbackExhausted(Vec<MethodFailure>),

    /// The extraction size limit was exceeded.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Current extracted size in bytes
        current: u64,
        /// Configured size limit in bytes
        limit: u64,
    },

    /// Executable headers or resource structures are malformed.
    #[error("Invalid PE image: {reason}")]
    PeFormat {
        reason: String,
        /// Archive family detected in the same file, if any. Lets the
        /// caller reopen it as an archive without sniffing again.
        archive_fallback: Option<ArchiveFamily>,
    },

    /// A scratch or destination path could not be created, written or removed.
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error without a more specific path context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A security violation was detected during extraction.
    #[error("Security violation: {0}")]
    Security(#[from] SecurityError),
}

/// Security-related errors during extraction.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../../etc/passwd").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),

    /// Unsafe entry type detected (e.g., symlink when not allowed).
    #[error("Unsafe entry type: {0}")]
    UnsafeEntryType(String),
}

/// One failed attempt of the generic fallback chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFailure {
    pub method: String,
    pub reason: String,
}

impl fmt::Display for MethodFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.method, self.reason)
    }
}

struct FailureList<'a>(&'a [MethodFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no extraction method available");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Error taxonomy exposed to callers and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Sniff,
    ArchiveRead,
    Extraction,
    PeFormat,
    Filesystem,
    Security,
}

impl ErrorKind {
    /// Stable code printed in CLI diagnostics.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Sniff => "E_SNIFF",
            ErrorKind::ArchiveRead => "E_ARCHIVE_READ",
            ErrorKind::Extraction => "E_EXTRACTION",
            ErrorKind::PeFormat => "E_PE_FORMAT",
            ErrorKind::Filesystem => "E_FILESYSTEM",
            ErrorKind::Security => "E_SECURITY",
        }
    }

    /// Process exit status for this kind. Never zero.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Sniff => 2,
            ErrorKind::ArchiveRead => 3,
            ErrorKind::Extraction => 4,
            ErrorKind::PeFormat => 5,
            ErrorKind::Filesystem => 6,
            ErrorKind::Security => 7,
        }
    }
}

impl ViewerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ViewerError::Sniff { .. } => ErrorKind::Sniff,
            ViewerError::NotFound(_)
            | ViewerError::ArchiveRead(_)
            | ViewerError::EntryNotFound(_) => ErrorKind::ArchiveRead,
            ViewerError::Extraction(_)
            | ViewerError::FallbackExhausted(_)
            | ViewerError::SizeLimitExceeded { .. } => ErrorKind::Extraction,
            ViewerError::PeFormat { .. } => ErrorKind::PeFormat,
            ViewerError::Filesystem { .. } | ViewerError::Io(_) => ErrorKind::Filesystem,
            ViewerError::Security(_) => ErrorKind::Security,
        }
    }

    /// Wrap an I/O error with the path it happened on.
    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ViewerError::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn pe(reason: impl Into<String>) -> Self {
        ViewerError::PeFormat {
            reason: reason.into(),
            archive_fallback: None,
        }
    }
}
