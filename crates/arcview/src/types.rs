//! Type definitions shared by the archive model.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One archive member as enumerated by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Path segments. The last one is empty only for directories stored
    /// with a trailing separator.
    pub path: Vec<String>,

    /// Member name exactly as stored in the archive
    pub archive_name: String,

    /// Uncompressed size in bytes
    pub size_bytes: u64,

    /// Whether this entry is a directory
    pub is_directory: bool,
}

impl EntryRecord {
    /// Build a record from a member name as stored in the archive.
    ///
    /// Backslashes are treated as separators, and empty or `.` segments
    /// are dropped except for a trailing separator.
    pub fn from_archive_name(name: &str, size_bytes: u64, is_directory: bool) -> Self {
        let normalized = name.replace('\\', "/");
        let trailing = normalized.ends_with('/');

        let mut path: Vec<String> = normalized
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .map(str::to_string)
            .collect();

        if trailing && !path.is_empty() {
            path.push(String::new());
        }

        Self {
            path,
            archive_name: name.to_string(),
            size_bytes,
            is_directory: is_directory || trailing,
        }
    }

    /// Segments joined with `/`, trailing separator included.
    pub fn display_path(&self) -> String {
        self.path.join("/")
    }

    /// Last non-empty segment.
    pub fn file_name(&self) -> &str {
        self.path
            .iter()
            .rev()
            .find(|segment| !segment.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Extension of the member including the leading dot, or an empty string.
    pub fn extension(&self) -> String {
        dotted_extension(Path::new(self.file_name()))
    }
}

/// Extension of `path` with a leading dot, or an empty string.
pub(crate) fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// A member materialized in scratch space for viewing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScratchExtraction {
    /// Archive (or executable) the bytes came from
    pub source_archive_path: PathBuf,

    /// Member path inside the source
    pub entry_path: String,

    /// Regular file holding exactly the member's bytes
    pub local_path: PathBuf,
}

/// Options for bulk extraction and exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// How to handle file conflicts during extraction
    pub overwrite: OverwriteMode,

    /// Maximum total extracted size in bytes (default: 20 GB)
    pub size_limit_bytes: Option<u64>,

    /// Whether to allow extraction of symbolic links
    pub allow_symlinks: bool,

    /// Whether to allow extraction of hard links
    pub allow_hardlinks: bool,

    /// Prefix of per-session scratch directories
    pub scratch_prefix: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            overwrite: OverwriteMode::Rename,
            size_limit_bytes: Some(20 * 1024 * 1024 * 1024), // 20 GB
            allow_symlinks: false,
            allow_hardlinks: false,
            scratch_prefix: "arcview-".to_string(),
        }
    }
}

impl ExtractOptions {
    /// Load options from a JSON settings file.
    ///
    /// A missing file yields the defaults. A file that cannot be parsed is
    /// logged and also yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings file, using defaults");
                return Self::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse settings file, using defaults");
            Self::default()
        })
    }
}

/// How to handle file conflicts during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwriteMode {
    /// Replace existing files
    Replace,

    /// Skip files that already exist
    Skip,

    /// Rename new files by appending (1), (2), etc.
    Rename,
}

impl std::str::FromStr for OverwriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(OverwriteMode::Replace),
            "skip" => Ok(OverwriteMode::Skip),
            "rename" => Ok(OverwriteMode::Rename),
            other => Err(format!("unknown overwrite mode: {}", other)),
        }
    }
}

/// Statistics about a completed bulk extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractStats {
    /// Number of files successfully extracted
    pub files_extracted: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Duration of the extraction operation (in milliseconds)
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Format a byte count as B/KB/MB/GB/TB with two decimals.
pub fn format_size(size_in_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = size_in_bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    format!("{:.2} {}", size, UNITS[unit_index])
}
