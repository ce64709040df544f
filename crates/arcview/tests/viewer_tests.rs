use arcview::backend::BackendKind;
use arcview::{
    classify, ArchiveFamily, Disambiguation, EntryRecord, ExtractOptions, ExtractionCoordinator, FileViewer,
    OpenedView, PathTreeBuilder, Resolution, ViewChoice, ViewerError, ViewerSession,
};
use std::cell::RefCell;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Smallest PE32 image goblin accepts: headers only, no sections.
fn minimal_pe() -> Vec<u8> {
    const PE_OFFSET: usize = 0x80;
    let mut image = vec![0u8; 0x180];

    image[0..2].copy_from_slice(b"MZ");
    put_u32(&mut image, 0x3C, PE_OFFSET as u32);
    image[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");

    let coff = PE_OFFSET + 4;
    put_u16(&mut image, coff, 0x014c);
    put_u32(&mut image, coff + 4, 0x6000_0000);
    put_u16(&mut image, coff + 16, 224);
    put_u16(&mut image, coff + 18, 0x0102);

    let opt = coff + 20;
    put_u16(&mut image, opt, 0x10b);
    put_u32(&mut image, opt + 28, 0x0040_0000);
    put_u32(&mut image, opt + 32, 0x1000);
    put_u32(&mut image, opt + 36, 0x200);
    put_u16(&mut image, opt + 40, 6);
    put_u16(&mut image, opt + 48, 6);
    put_u32(&mut image, opt + 56, 0x1000);
    put_u32(&mut image, opt + 60, 0x180);
    put_u16(&mut image, opt + 68, 3);
    put_u32(&mut image, opt + 92, 16);
    image
}

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::{SimpleFileOptions, ZipWriter};

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        for (name, data) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

/// PE headers followed by a ZIP, like a self-extracting installer.
fn create_polyglot(path: &Path) {
    create_polyglot_with_stub(path, 0);
}

/// Same, with `stub_len` bytes of loader code between headers and payload.
fn create_polyglot_with_stub(path: &Path, stub_len: usize) {
    let mut bytes = minimal_pe();
    bytes.resize(bytes.len() + stub_len, 0xCC);
    bytes.extend(zip_bytes(&[("setup/config.ini", b"[install]\nsilent=1\n")]));
    fs::write(path, bytes).unwrap();
}

#[derive(Default)]
struct RecordingViewer {
    opened: RefCell<Vec<(PathBuf, String)>>,
}

impl FileViewer for RecordingViewer {
    fn open(&self, local_path: &Path, mime_hint: &str) -> std::io::Result<()> {
        self.opened
            .borrow_mut()
            .push((local_path.to_path_buf(), mime_hint.to_string()));
        Ok(())
    }
}

#[test]
fn test_sniff_ignores_extension() {
    let dir = TempDir::new().unwrap();

    let seven = dir.path().join("notes.txt");
    fs::write(&seven, b"7z\xBC\xAF\x27\x1C\x00\x04rest").unwrap();
    assert_eq!(classify(&seven), ArchiveFamily::SevenZip);

    let plain = dir.path().join("plain.zip");
    fs::write(&plain, b"just text").unwrap();
    assert_eq!(classify(&plain), ArchiveFamily::Unknown);

    assert_eq!(classify(&dir.path().join("missing.exe")), ArchiveFamily::Unknown);
}

#[test]
fn test_sniff_finds_zip_after_pe_stub() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("installer.exe");
    create_polyglot(&path);

    assert_eq!(classify(&path), ArchiveFamily::Zip);
}

#[test]
fn test_installer_with_large_stub_offers_both_views() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("installer.exe");
    create_polyglot_with_stub(&path, 64 * 1024);

    assert_eq!(classify(&path), ArchiveFamily::Zip);

    let mut state = Disambiguation::start(&path);
    assert_eq!(state.resolution(), Resolution::Undetermined);
    state.choose(ViewChoice::Archive);
    match state.open(&ExtractOptions::default()).unwrap() {
        Some(OpenedView::Archive(coordinator)) => {
            assert_eq!(coordinator.kind(), BackendKind::Zip);
            assert!(coordinator.find("setup/config.ini").is_ok());
        }
        _ => panic!("expected the archive view"),
    }
}

#[test]
fn test_plain_pe_opens_without_prompt() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tool.exe");
    fs::write(&path, minimal_pe()).unwrap();

    let state = Disambiguation::start(&path);
    assert_eq!(state.family(), ArchiveFamily::Unknown);
    assert_eq!(state.resolution(), Resolution::Resolved(ViewChoice::Pe));

    match state.open(&ExtractOptions::default()).unwrap() {
        Some(OpenedView::Pe(model)) => {
            assert_eq!(model.summary().machine, 0x014c);
            assert!(!model.summary().is_64);
            assert!(model.list_resources().is_empty());
        }
        _ => panic!("expected the PE view"),
    }
}

#[test]
fn test_polyglot_both_views() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("installer.exe");
    create_polyglot(&path);
    let options = ExtractOptions::default();

    let mut state = Disambiguation::start(&path);
    assert_eq!(state.resolution(), Resolution::Undetermined);
    assert!(state.open(&options).unwrap().is_none());

    state.choose(ViewChoice::Archive);
    match state.open(&options).unwrap() {
        Some(OpenedView::Archive(coordinator)) => {
            assert_eq!(coordinator.kind(), BackendKind::Zip);
            let node = coordinator.find("setup/config.ini").unwrap();
            let scratch = TempDir::new().unwrap();
            let extraction = coordinator.extract_one(node, scratch.path()).unwrap();
            assert_eq!(fs::read(extraction.local_path).unwrap(), b"[install]\nsilent=1\n");
        }
        _ => panic!("expected the archive view"),
    }

    // Reopening asks again; nothing is remembered.
    let mut again = Disambiguation::start(&path);
    assert_eq!(again.resolution(), Resolution::Undetermined);
    again.choose(ViewChoice::Pe);
    assert!(matches!(
        again.open(&options).unwrap(),
        Some(OpenedView::Pe(_))
    ));
}

#[test]
fn test_broken_pe_reports_archive_family() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("packed.exe");
    fs::write(&path, zip_bytes(&[("a.txt", b"a")])).unwrap();

    let mut state = Disambiguation::start(&path);
    state.choose(ViewChoice::Pe);
    let err = state.open(&ExtractOptions::default()).err().unwrap();

    assert_eq!(err.kind().code(), "E_PE_FORMAT");
    assert!(matches!(
        err,
        ViewerError::PeFormat {
            archive_fallback: Some(ArchiveFamily::Zip),
            ..
        }
    ));
}

#[test]
fn test_session_view_and_cleanup() {
    let dir = TempDir::new().unwrap();
    let archive = dir.path().join("bundle.zip");
    fs::write(
        &archive,
        zip_bytes(&[("docs/guide.pdf", b"%PDF-1.4 stub"), ("src/main.rs", b"fn main() {}")]),
    )
    .unwrap();

    let options = ExtractOptions::default();
    let coordinator = ExtractionCoordinator::open(&archive, &options).unwrap();
    let viewer = RecordingViewer::default();
    let mut session = ViewerSession::new(&options);

    let pdf = session
        .view_entry(&coordinator, coordinator.find("docs/guide.pdf").unwrap(), &viewer)
        .unwrap();
    let source = session
        .extract(&coordinator, coordinator.find("src/main.rs").unwrap())
        .unwrap();

    assert_eq!(pdf.entry_path, "docs/guide.pdf");
    assert_eq!(pdf.local_path.extension().unwrap(), "pdf");
    assert_eq!(viewer.opened.borrow()[0].1, "application/pdf");
    assert_eq!(session.extractions().len(), 2);

    let scratch = pdf.local_path.parent().unwrap().to_path_buf();
    let report = session.close();

    assert!(report.is_clean());
    assert_eq!(report.files_removed, 2);
    assert!(!pdf.local_path.exists());
    assert!(!source.local_path.exists());
    assert!(!scratch.exists());
    // The archive itself is untouched.
    assert!(archive.exists());
}

#[test]
fn test_tree_ordering_and_counts() {
    let entries = vec![
        EntryRecord::from_archive_name("zeta.txt", 1, false),
        EntryRecord::from_archive_name("Alpha/", 0, true),
        EntryRecord::from_archive_name("alpha/inner.txt", 2, false),
        EntryRecord::from_archive_name("beta.txt", 3, false),
        EntryRecord::from_archive_name("Alpha/deep/file.bin", 4, false),
    ];
    let root = PathTreeBuilder::build(entries);

    let names: Vec<_> = root.children().iter().map(|n| n.name().to_string()).collect();
    assert_eq!(names, vec!["Alpha", "alpha", "beta.txt", "zeta.txt"]);
    assert_eq!(root.file_count(), 4);
    assert!(root.find("Alpha/deep/file.bin").unwrap().file_info().is_some());
    assert!(root.find("Alpha/deep").unwrap().is_dir());
}
