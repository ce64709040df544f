//! Security and safety checks for writing archive members to disk.
//!
//! Every path that ends up on disk during bulk extraction or export goes
//! through this module, so that a hostile member name can never escape the
//! destination directory (zip-slip).

use crate::error::{SecurityError, ViewerError};
use crate::types::{ExtractOptions, OverwriteMode};
use std::path::{Component, Path, PathBuf};

/// Entry type for filtering special file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Hard link
    Hardlink,
    /// Other special file types (device, socket, etc.)
    Other,
}

/// Validates and normalizes an archive entry path.
///
/// Rejects absolute paths and `..` components, drops `.` components and
/// redundant separators, and refuses paths that normalize to nothing.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use arcview::safety::validate_entry_path;
///
/// let safe_path = validate_entry_path(Path::new("dir/./file.txt")).unwrap();
/// assert_eq!(safe_path, Path::new("dir/file.txt"));
///
/// assert!(validate_entry_path(Path::new("../../etc/passwd")).is_err());
/// assert!(validate_entry_path(Path::new("/etc/passwd")).is_err());
/// ```
pub fn validate_entry_path(path: &Path) -> Result<PathBuf, SecurityError> {
    if path.is_absolute() {
        return Err(SecurityError::AbsolutePath(path.display().to_string()));
    }

    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                // Some archives store backslash-separated names.
                if part.to_string_lossy().split('\\').any(|p| p == "..") {
                    return Err(SecurityError::PathTraversal(path.display().to_string()));
                }
                normalized.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(path.display().to_string()));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(path.display().to_string()));
            }
        }
    }

    if normalized.as_os_str().is_empty() {
        return Err(SecurityError::PathTraversal(
            "Path normalizes to empty".to_string(),
        ));
    }

    Ok(normalized)
}

/// Checks the cumulative extracted size against the configured limit.
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> Result<(), ViewerError> {
    match limit {
        Some(max_bytes) if current_bytes > max_bytes => Err(ViewerError::SizeLimitExceeded {
            current: current_bytes,
            limit: max_bytes,
        }),
        _ => Ok(()),
    }
}

/// Determines if an entry type may be written based on the extraction options.
///
/// Symlinks and hardlinks are blocked unless enabled; other special files
/// are always blocked.
pub fn is_safe_entry_type(entry_type: EntryType, options: &ExtractOptions) -> bool {
    match entry_type {
        EntryType::File | EntryType::Directory => true,
        EntryType::Symlink => options.allow_symlinks,
        EntryType::Hardlink => options.allow_hardlinks,
        EntryType::Other => false,
    }
}

/// Resolve where a file should be written given the overwrite mode.
///
/// Returns `None` when the file exists and the mode is `Skip`.
pub fn resolve_output_path(path: &Path, mode: OverwriteMode) -> Result<Option<PathBuf>, ViewerError> {
    match mode {
        OverwriteMode::Replace => Ok(Some(path.to_path_buf())),
        OverwriteMode::Skip => {
            if path.exists() {
                Ok(None)
            } else {
                Ok(Some(path.to_path_buf()))
            }
        }
        OverwriteMode::Rename => {
            if !path.exists() {
                return Ok(Some(path.to_path_buf()));
            }

            let parent = path.parent().unwrap_or(Path::new(""));
            for i in 1..1000 {
                let candidate = parent.join(numbered_name(path, i));
                if !candidate.exists() {
                    return Ok(Some(candidate));
                }
            }

            Err(ViewerError::fs(
                path,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "Could not find unique filename",
                ),
            ))
        }
    }
}

/// `name.ext` -> `name (n).ext`
pub(crate) fn numbered_name(path: &Path, n: usize) -> String {
    let file_stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    match path.extension().and_then(|s| s.to_str()) {
        Some(ext) => format!("{} ({}).{}", file_stem, n, ext),
        None => format!("{} ({})", file_stem, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_entry_path_valid() {
        assert_eq!(
            validate_entry_path(Path::new("file.txt")).unwrap(),
            Path::new("file.txt")
        );
        assert_eq!(
            validate_entry_path(Path::new("dir/subdir/file.txt")).unwrap(),
            Path::new("dir/subdir/file.txt")
        );
        assert_eq!(
            validate_entry_path(Path::new("./dir/file.txt")).unwrap(),
            Path::new("dir/file.txt")
        );
        assert!(validate_entry_path(Path::new("dir/subdir/")).is_ok());
        assert!(validate_entry_path(Path::new("日本語/ファイル.txt")).is_ok());
    }

    #[test]
    fn test_validate_entry_path_absolute() {
        assert!(matches!(
            validate_entry_path(Path::new("/etc/passwd")),
            Err(SecurityError::AbsolutePath(_))
        ));
    }

    #[test]
    fn test_validate_entry_path_traversal() {
        for path in [
            "../etc/passwd",
            "dir/../../etc/passwd",
            "./../../etc/passwd",
            "dir/..",
            "safe\\..\\..\\evil",
        ] {
            assert!(
                matches!(
                    validate_entry_path(Path::new(path)),
                    Err(SecurityError::PathTraversal(_))
                ),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_entry_path_empty() {
        assert!(validate_entry_path(Path::new(".")).is_err());
        assert!(validate_entry_path(Path::new("././")).is_err());
    }

    #[test]
    fn test_check_size_limits() {
        assert!(check_size_limits(1000, Some(1000)).is_ok());
        assert!(check_size_limits(u64::MAX, None).is_ok());
        assert!(matches!(
            check_size_limits(1001, Some(1000)),
            Err(ViewerError::SizeLimitExceeded {
                current: 1001,
                limit: 1000
            })
        ));
    }

    #[test]
    fn test_is_safe_entry_type() {
        let mut options = ExtractOptions::default();
        assert!(is_safe_entry_type(EntryType::File, &options));
        assert!(is_safe_entry_type(EntryType::Directory, &options));
        assert!(!is_safe_entry_type(EntryType::Symlink, &options));
        assert!(!is_safe_entry_type(EntryType::Hardlink, &options));

        options.allow_symlinks = true;
        assert!(is_safe_entry_type(EntryType::Symlink, &options));
        assert!(!is_safe_entry_type(EntryType::Other, &options));
    }

    #[test]
    fn test_resolve_output_path_modes() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        assert_eq!(
            resolve_output_path(&file_path, OverwriteMode::Skip).unwrap(),
            Some(file_path.clone())
        );

        std::fs::write(&file_path, "content").unwrap();

        assert_eq!(resolve_output_path(&file_path, OverwriteMode::Skip).unwrap(), None);
        assert_eq!(
            resolve_output_path(&file_path, OverwriteMode::Replace).unwrap(),
            Some(file_path.clone())
        );

        let renamed = resolve_output_path(&file_path, OverwriteMode::Rename)
            .unwrap()
            .unwrap();
        assert_eq!(renamed, temp_dir.path().join("test (1).txt"));

        std::fs::write(&renamed, "content").unwrap();
        assert_eq!(
            resolve_output_path(&file_path, OverwriteMode::Rename).unwrap(),
            Some(temp_dir.path().join("test (2).txt"))
        );
    }

    #[test]
    fn test_numbered_name_without_extension() {
        assert_eq!(numbered_name(Path::new("README"), 3), "README (3)");
    }
}
