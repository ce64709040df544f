//! Best-effort MIME hints handed to the external file viewer.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Fallback when neither the extension nor the content is recognized.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Formats the host viewer knows how to render.
const MIME_BY_EXTENSION: &[(&str, &str)] = &[
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("jfif", "image/jpeg"),
    ("gif", "image/gif"),
    ("ico", "image/vnd.microsoft.icon"),
    ("bmp", "image/bmp"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("py", "text/x-python"),
    ("java", "text/x-java"),
    ("kt", "text/x-kotlin"),
    ("json", "application/json"),
    ("class", "application/java-vm"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("jar", "application/java-archive"),
    ("rar", "application/vnd.rar"),
    ("7z", "application/x-7z-compressed"),
    ("tar", "application/x-tar"),
    ("exe", "application/vnd.microsoft.portable-executable"),
    ("dll", "application/vnd.microsoft.portable-executable"),
];

/// Bytes read for content sniffing.
const SNIFF_LEN: u64 = 8192;

/// MIME hint from the file extension alone.
pub fn mime_for_extension(name: &Path) -> Option<&'static str> {
    let extension = name.extension()?.to_str()?.to_ascii_lowercase();
    MIME_BY_EXTENSION
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// MIME hint for a file on disk: extension table, then content sniffing,
/// then `application/octet-stream`.
pub fn guess_mime(path: &Path) -> String {
    if let Some(mime) = mime_for_extension(path) {
        return mime.to_string();
    }

    let mut head = Vec::new();
    let sniffed = File::open(path)
        .and_then(|file| file.take(SNIFF_LEN).read_to_end(&mut head))
        .ok()
        .and_then(|_| infer::get(&head));

    match sniffed {
        Some(kind) => kind.mime_type().to_string(),
        None => OCTET_STREAM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_table() {
        assert_eq!(mime_for_extension(Path::new("a/b/Photo.JPG")), Some("image/jpeg"));
        assert_eq!(mime_for_extension(Path::new("notes.md")), Some("text/markdown"));
        assert_eq!(mime_for_extension(Path::new("5_1033.ico")), Some("image/vnd.microsoft.icon"));
        assert_eq!(mime_for_extension(Path::new("README")), None);
    }

    #[test]
    fn test_guess_falls_back_to_content() {
        let dir = tempfile::TempDir::new().unwrap();

        let png = dir.path().join("entry-abc");
        std::fs::write(&png, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]).unwrap();
        assert_eq!(guess_mime(&png), "image/png");

        let unknown = dir.path().join("data.version");
        std::fs::write(&unknown, b"\x01\x02\x03").unwrap();
        assert_eq!(guess_mime(&unknown), OCTET_STREAM);

        assert_eq!(guess_mime(&dir.path().join("missing.bin")), OCTET_STREAM);
    }
}
