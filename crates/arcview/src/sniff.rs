//! Content-based archive detection, independent of extension.

use crate::error::ViewerError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Archive family detected from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFamily {
    Zip,
    Rar,
    SevenZip,
    Unknown,
}

impl ArchiveFamily {
    /// Whether a concrete family was identified.
    pub fn is_archive(self) -> bool {
        self != ArchiveFamily::Unknown
    }
}

impl fmt::Display for ArchiveFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveFamily::Zip => "ZIP",
            ArchiveFamily::Rar => "RAR",
            ArchiveFamily::SevenZip => "7Z",
            ArchiveFamily::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

const ZIP_LOCAL_HEADER: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SEVEN_ZIP_SIGNATURE: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
const RAR4_SIGNATURE: [u8; 7] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x00];
const RAR5_SIGNATURE: [u8; 8] = [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07, 0x01, 0x00];

/// How far into the file the raw ZIP header scan looks.
const SCAN_WINDOW: usize = 1024;

/// Classify a file by content. I/O failures are logged and reported as
/// `ArchiveFamily::Unknown`.
pub fn classify(path: &Path) -> ArchiveFamily {
    match try_classify(path) {
        Ok(family) => family,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Sniffing failed, treating as unknown");
            ArchiveFamily::Unknown
        }
    }
}

/// Classify a file by content, surfacing I/O failures.
///
/// Structural checks run first (ZIP end-of-central-directory, RAR and 7Z
/// headers opened by their decoders), then raw signature scans of the
/// leading bytes.
pub fn try_classify(path: &Path) -> Result<ArchiveFamily, ViewerError> {
    let head = read_head(path).map_err(|source| ViewerError::Sniff {
        path: path.to_path_buf(),
        source,
    })?;

    let family = if zip_validates(path) {
        ArchiveFamily::Zip
    } else if rar_validates(path, &head) {
        ArchiveFamily::Rar
    } else if seven_zip_validates(path, &head) {
        ArchiveFamily::SevenZip
    } else {
        classify_signature(&head)
    };

    tracing::debug!(path = %path.display(), %family, "Sniffed archive family");
    Ok(family)
}

/// Signature-only classification of a leading buffer.
///
/// A ZIP local header anywhere in the first 1024 bytes wins (self-extracting
/// stubs), then a 7Z signature at offset 0.
pub fn classify_signature(head: &[u8]) -> ArchiveFamily {
    let window = &head[..head.len().min(SCAN_WINDOW)];

    if contains(window, &ZIP_LOCAL_HEADER) {
        ArchiveFamily::Zip
    } else if head.starts_with(&SEVEN_ZIP_SIGNATURE) {
        ArchiveFamily::SevenZip
    } else {
        ArchiveFamily::Unknown
    }
}

fn read_head(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut head = Vec::with_capacity(SCAN_WINDOW);
    file.take(SCAN_WINDOW as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// ZIP whose end-of-central-directory record parses, located from the end
/// of the file, with a local header where the archive says its data starts.
/// Self-extracting stubs of any size in front of the payload are fine.
fn zip_validates(path: &Path) -> bool {
    let Ok(file) = File::open(path) else {
        return false;
    };
    let Ok(mut archive) = zip::ZipArchive::new(file) else {
        return false;
    };
    if archive.is_empty() {
        return false;
    }
    let Ok(header_start) = archive.by_index_raw(0).map(|entry| entry.header_start()) else {
        return false;
    };
    starts_with_at(path, header_start, &ZIP_LOCAL_HEADER)
}

/// RAR opened by the unrar library, which also finds the marker block
/// behind a self-extracting stub.
fn rar_validates(path: &Path, head: &[u8]) -> bool {
    let rar_at_start = head.starts_with(&RAR4_SIGNATURE) || head.starts_with(&RAR5_SIGNATURE);
    if !rar_at_start && !head.starts_with(b"MZ") {
        return false;
    }
    unrar::Archive::new(path).open_for_listing().is_ok()
}

fn starts_with_at(path: &Path, offset: u64, expected: &[u8]) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut found = vec![0u8; expected.len()];
    file.seek(SeekFrom::Start(offset)).is_ok() && file.read_exact(&mut found).is_ok() && found == expected
}

fn seven_zip_validates(path: &Path, head: &[u8]) -> bool {
    if !head.starts_with(&SEVEN_ZIP_SIGNATURE) {
        return false;
    }
    sevenz_rust2::SevenZReader::open(path, sevenz_rust2::Password::empty()).is_ok()
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
