//! # Arcview
//!
//! Archive content model and format sniffing for file viewers.
//!
//! Given a ZIP, RAR, 7-Zip, TAR or unidentified archive, the library builds a
//! unified directory/file tree, extracts single entries into per-session
//! scratch space for viewing, and performs bulk extraction. Executables are
//! sniffed for embedded archives and can be browsed as PE images with their
//! resource tables.
//!
//! ## Supported Formats
//!
//! - ZIP and JAR (including self-extracting stubs)
//! - TAR (plain, gzip, bzip2, xz)
//! - 7-Zip
//! - RAR (read-only)
//! - Anything else through a fallback chain of external tools and decoders
//!
//! ## Example
//!
//! ```rust,no_run
//! use arcview::{ExtractOptions, ExtractionCoordinator, ViewerSession};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ExtractOptions::default();
//! let archive = ExtractionCoordinator::open(Path::new("archive.zip"), &options)?;
//! print!("{}", archive.tree().render());
//!
//! let mut session = ViewerSession::new(&options);
//! let node = archive.find("docs/readme.md")?;
//! let extraction = session.extract(&archive, node)?;
//! println!("Readable at {}", extraction.local_path.display());
//!
//! // Removes every scratch file of the session.
//! session.close();
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod coordinator;
pub mod disambiguate;
pub mod error;
pub mod fallback;
pub mod host;
pub mod mime;
pub mod pe;
pub mod safety;
pub mod session;
pub mod sniff;
pub mod tree;
pub mod types;

// Re-export main types
pub use backend::{ArchiveBackend, BackendKind};
pub use coordinator::ExtractionCoordinator;
pub use disambiguate::{Disambiguation, OpenedView, Resolution};
pub use error::{ErrorKind, MethodFailure, SecurityError, ViewerError};
pub use fallback::{ExtractStrategy, FallbackChain};
pub use host::{ChoicePrompt, DirectoryPrompt, FileViewer, ViewChoice};
pub use pe::{PeSummary, PeViewerModel, ResourceEntry};
pub use safety::EntryType;
pub use session::{CleanupReport, ViewerSession};
pub use sniff::{classify, ArchiveFamily};
pub use tree::{PathTreeBuilder, TreeNode};
pub use types::{format_size, EntryRecord, ExtractOptions, ExtractStats, OverwriteMode, ScratchExtraction};
