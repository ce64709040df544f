//! Ordered extraction strategies for archives of unidentified format.
//!
//! Each strategy gets exactly one attempt. Failures are collected and only
//! surfaced when every strategy has failed.

use crate::backend::BackendKind;
use crate::error::{MethodFailure, ViewerError};
use crate::types::ExtractOptions;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// One way of unpacking a whole archive into a directory.
pub trait ExtractStrategy {
    fn name(&self) -> &str;

    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ViewerError>;
}

/// Unpacks through a dedicated backend regardless of the file's extension.
pub struct BackendStrategy {
    kind: BackendKind,
    options: ExtractOptions,
}

impl BackendStrategy {
    pub fn new(kind: BackendKind, options: ExtractOptions) -> Self {
        Self { kind, options }
    }
}

impl ExtractStrategy for BackendStrategy {
    fn name(&self) -> &str {
        match self.kind {
            BackendKind::Zip => "zip",
            BackendKind::Rar => "rar",
            BackendKind::SevenZip => "7z",
            BackendKind::Tar => "tar",
            BackendKind::Generic => "generic",
        }
    }

    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ViewerError> {
        self.kind
            .open(archive_path, &self.options)
            .extract_all(dest_dir)
            .map(|_| ())
    }
}

/// Invocation recipe for an external extractor.
#[derive(Debug, Clone, Copy)]
struct ToolRecipe {
    program: &'static str,
    build: fn(&mut Command, &Path, &Path),
}

const TOOL_RECIPES: &[ToolRecipe] = &[
    ToolRecipe {
        program: "7z",
        build: seven_zip_args,
    },
    ToolRecipe {
        program: "7za",
        build: seven_zip_args,
    },
    ToolRecipe {
        program: "bsdtar",
        build: |cmd, archive, dest| {
            cmd.arg("-xf").arg(archive).arg("-C").arg(dest);
        },
    },
    ToolRecipe {
        program: "unar",
        build: |cmd, archive, dest| {
            cmd.arg("-q").arg("-f").arg("-D").arg("-o").arg(dest).arg(archive);
        },
    },
];

fn seven_zip_args(cmd: &mut Command, archive: &Path, dest: &Path) {
    let mut out = std::ffi::OsString::from("-o");
    out.push(dest);
    cmd.arg("x").arg("-y").arg(out).arg(archive);
}

/// Runs the first multi-format extractor found on `PATH`.
#[derive(Debug, Default)]
pub struct SystemToolStrategy;

impl SystemToolStrategy {
    fn locate() -> Option<(ToolRecipe, PathBuf)> {
        TOOL_RECIPES
            .iter()
            .find_map(|recipe| which::which(recipe.program).ok().map(|path| (*recipe, path)))
    }
}

impl ExtractStrategy for SystemToolStrategy {
    fn name(&self) -> &str {
        "system-tool"
    }

    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ViewerError> {
        let Some((recipe, program)) = Self::locate() else {
            return Err(ViewerError::Extraction(
                "no external archive tool found on PATH".to_string(),
            ));
        };

        let mut cmd = Command::new(&program);
        (recipe.build)(&mut cmd, archive_path, dest_dir);
        tracing::debug!(program = %program.display(), archive = %archive_path.display(), "Running external extractor");

        let output = cmd
            .output()
            .map_err(|e| ViewerError::Extraction(format!("{}: {}", recipe.program, e)))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ViewerError::Extraction(format!(
                "{} exited with {}: {}",
                recipe.program,
                output.status,
                stderr.trim()
            )))
        }
    }
}

/// libarchive through compress-tools.
#[cfg(feature = "libarchive")]
#[derive(Debug, Default)]
pub struct LibarchiveStrategy;

#[cfg(feature = "libarchive")]
impl ExtractStrategy for LibarchiveStrategy {
    fn name(&self) -> &str {
        "libarchive"
    }

    fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<(), ViewerError> {
        let file = fs::File::open(archive_path).map_err(|e| ViewerError::fs(archive_path, e))?;
        compress_tools::uncompress_archive(file, dest_dir, compress_tools::Ownership::Ignore)
            .map_err(|e| ViewerError::Extraction(e.to_string()))
    }
}

/// Ordered list of strategies tried one after another.
pub struct FallbackChain {
    strategies: Vec<Box<dyn ExtractStrategy>>,
}

impl FallbackChain {
    pub fn new(strategies: Vec<Box<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    /// External tool first, then the 7z, zip and rar decoders.
    pub fn standard(options: &ExtractOptions) -> Self {
        let mut strategies: Vec<Box<dyn ExtractStrategy>> = Vec::new();
        #[cfg(feature = "libarchive")]
        strategies.push(Box::new(LibarchiveStrategy));
        strategies.push(Box::new(SystemToolStrategy));
        strategies.push(Box::new(BackendStrategy::new(BackendKind::SevenZip, options.clone())));
        strategies.push(Box::new(BackendStrategy::new(BackendKind::Zip, options.clone())));
        strategies.push(Box::new(BackendStrategy::new(BackendKind::Rar, options.clone())));
        Self::new(strategies)
    }

    pub fn method_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Unpack `archive_path` into `dest_dir` with the first strategy that
    /// succeeds and return its name.
    ///
    /// Every attempt runs in its own staging directory inside `dest_dir`, so
    /// a failed attempt leaves nothing behind.
    pub fn extract_all(&self, archive_path: &Path, dest_dir: &Path) -> Result<String, ViewerError> {
        fs::create_dir_all(dest_dir).map_err(|e| ViewerError::fs(dest_dir, e))?;
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            let staging = tempfile::Builder::new()
                .prefix(".arcview-staging-")
                .tempdir_in(dest_dir)
                .map_err(|e| ViewerError::fs(dest_dir, e))?;

            match strategy.extract_all(archive_path, staging.path()) {
                Ok(()) => {
                    promote(staging.path(), dest_dir)?;
                    tracing::info!(method = strategy.name(), archive = %archive_path.display(), "Extracted with fallback method");
                    return Ok(strategy.name().to_string());
                }
                Err(e) => {
                    tracing::warn!(method = strategy.name(), error = %e, "Extraction method failed");
                    failures.push(MethodFailure {
                        method: strategy.name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(ViewerError::FallbackExhausted(failures))
    }
}

/// Move every top-level item of `staging` into `dest_dir`.
fn promote(staging: &Path, dest_dir: &Path) -> Result<(), ViewerError> {
    let read_dir = fs::read_dir(staging).map_err(|e| ViewerError::fs(staging, e))?;
    for item in read_dir {
        let item = item.map_err(|e| ViewerError::fs(staging, e))?;
        let target = dest_dir.join(item.file_name());
        if target.is_dir() && item.path().is_dir() {
            promote(&item.path(), &target)?;
        } else {
            fs::rename(item.path(), &target).map_err(|e| ViewerError::fs(&target, e))?;
        }
    }
    Ok(())
}
