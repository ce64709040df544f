//! Command-line interface for browsing archives and PE resources.
//!
//! Thin wrapper over the `arcview` library: every command opens the file the
//! same way a viewer would and prints the result.

use arcview::sniff::try_classify;
use arcview::{
    format_size, ArchiveFamily, ChoicePrompt, DirectoryPrompt, Disambiguation, ExtractOptions, ExtractStats,
    ExtractionCoordinator, OpenedView, OverwriteMode, PeViewerModel, Resolution, ViewChoice, ViewerError,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "arcview")]
#[command(version, about = "Browse archives and executables from the command line", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overwrite mode: replace, skip, rename
    #[arg(long, global = true)]
    overwrite: Option<OverwriteMode>,

    /// Size limit for bulk extraction in bytes
    #[arg(long, global = true)]
    size_limit: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the archive family detected from content
    Sniff {
        file: PathBuf,
    },

    /// Print the tree of an archive, or the summary of an executable
    List {
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// How to open an executable that also contains an archive: pe or archive
        #[arg(long = "as", value_name = "VIEW")]
        view: Option<ViewChoice>,
    },

    /// Export one member to DEST_DIR/<basename>
    Extract {
        archive: PathBuf,

        /// Member path as shown by `list`
        entry: String,

        dest_dir: PathBuf,
    },

    /// Extract the whole archive
    ExtractAll {
        archive: PathBuf,

        /// Destination directory (asked on stdin when omitted)
        dest_dir: Option<PathBuf>,
    },

    /// List the resources of an executable
    Resources {
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write every resource of an executable to DEST_DIR
    ExtractResources {
        file: PathBuf,
        dest_dir: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let options = load_options(&cli);

    let result = match cli.command {
        Commands::Sniff { file } => handle_sniff(&file),
        Commands::List { file, json, view } => handle_list(&file, json, view, &options),
        Commands::Extract {
            archive,
            entry,
            dest_dir,
        } => handle_extract(&archive, &entry, &dest_dir, &options),
        Commands::ExtractAll { archive, dest_dir } => handle_extract_all(&archive, dest_dir, &options),
        Commands::Resources { file, json } => handle_resources(&file, json),
        Commands::ExtractResources { file, dest_dir } => handle_extract_resources(&file, &dest_dir, &options),
    };

    if let Err(e) = result {
        let kind = e.kind();
        eprintln!("error[{}]: {}", kind.code(), e);
        if let ViewerError::PeFormat {
            archive_fallback: Some(family),
            ..
        } = &e
        {
            eprintln!("hint: the file also contains a {} archive; rerun with `--as archive`", family);
        }
        process::exit(kind.exit_code());
    }
}

/// Settings file first, then command-line overrides.
fn load_options(cli: &Cli) -> ExtractOptions {
    let mut options = match &cli.config {
        Some(path) => ExtractOptions::load_or_default(path),
        None => ExtractOptions::default(),
    };
    if let Some(mode) = cli.overwrite {
        options.overwrite = mode;
    }
    if let Some(limit) = cli.size_limit {
        options.size_limit_bytes = Some(limit);
    }
    options
}

/// Asks on stdin whether a polyglot executable is opened as PE or archive.
struct StdinChoicePrompt;

impl ChoicePrompt for StdinChoicePrompt {
    fn choose(&self, path: &Path, family: ArchiveFamily) -> Option<ViewChoice> {
        eprint!(
            "{} is an executable that also contains a {} archive. Open as [PE/Archive]: ",
            path.display(),
            family
        );
        read_answer()?.parse().ok()
    }
}

/// Asks on stdin for a destination directory. An empty answer cancels.
struct StdinDirectoryPrompt;

impl DirectoryPrompt for StdinDirectoryPrompt {
    fn choose_directory(&self) -> Option<PathBuf> {
        eprint!("Extract to directory: ");
        let answer = read_answer()?;
        let answer = answer.trim();
        (!answer.is_empty()).then(|| PathBuf::from(answer))
    }
}

fn read_answer() -> Option<String> {
    io::stderr().flush().ok()?;
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ViewerError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ViewerError::Io(io::Error::other(e)))?;
    println!("{}", text);
    Ok(())
}

/// Open `path` as an archive even when it is an executable.
fn open_archive(path: &Path, options: &ExtractOptions) -> Result<ExtractionCoordinator, ViewerError> {
    let mut state = Disambiguation::start(path);
    state.choose(ViewChoice::Archive);
    match state.open(options)? {
        Some(OpenedView::Archive(coordinator)) => Ok(coordinator),
        _ => Err(ViewerError::ArchiveRead(format!(
            "{} does not contain an archive",
            path.display()
        ))),
    }
}

fn handle_sniff(file: &Path) -> Result<(), ViewerError> {
    let family = try_classify(file)?;
    println!("{}: {}", file.display(), family);
    Ok(())
}

fn handle_list(
    file: &Path,
    json: bool,
    view: Option<ViewChoice>,
    options: &ExtractOptions,
) -> Result<(), ViewerError> {
    let mut state = Disambiguation::start(file);
    if let Some(choice) = view {
        state.choose(choice);
    }
    if state.resolve_with(&StdinChoicePrompt) == Resolution::Undetermined {
        eprintln!("No view chosen");
        return Ok(());
    }

    match state.open(options)? {
        Some(OpenedView::Archive(coordinator)) => {
            if json {
                return print_json(coordinator.tree());
            }
            let tree = coordinator.tree();
            println!(
                "{} ({} backend, {} files, {} directories)",
                file.display(),
                coordinator.kind(),
                tree.file_count(),
                tree.dir_count()
            );
            print!("{}", tree.render());
        }
        Some(OpenedView::Pe(model)) => {
            if json {
                return print_json(&serde_json::json!({
                    "summary": model.summary(),
                    "resources": model.list_resources(),
                }));
            }
            print_pe_summary(&model);
            print_resources(&model);
        }
        None => {}
    }
    Ok(())
}

fn print_pe_summary(model: &PeViewerModel) {
    let summary = model.summary();
    println!("{}", model.path().display());
    println!(
        "  {} {} image, {} sections",
        summary.machine_name,
        if summary.is_64 { "PE32+" } else { "PE32" },
        summary.number_of_sections
    );
    if summary.is_dll {
        println!("  DLL");
    }
    println!("  Entry point: {:#x}", summary.entry_point);
    println!("  Image base:  {:#x}", summary.image_base);

    for section in &summary.sections {
        println!(
            "  {:<8} va={:#010x} vsize={:#x} raw={:#x}",
            section.name, section.virtual_address, section.virtual_size, section.raw_size
        );
    }
    for library in &summary.imports {
        println!("  imports {} ({} functions)", library.dll, library.functions.len());
    }
    if !summary.exports.is_empty() {
        println!("  {} exports", summary.exports.len());
    }
}

fn print_resources(model: &PeViewerModel) {
    let resources = model.list_resources();
    if resources.is_empty() {
        println!("No resources");
        return;
    }
    for resource in resources {
        println!(
            "{:<32} {:<16} {:>6} {:>12}",
            resource.file_name,
            resource.type_name,
            resource.lang_id,
            format_size(resource.size_bytes)
        );
    }
    if model.skipped_entries() > 0 {
        println!("({} malformed entries skipped)", model.skipped_entries());
    }
}

fn handle_extract(archive: &Path, entry: &str, dest_dir: &Path, options: &ExtractOptions) -> Result<(), ViewerError> {
    let coordinator = open_archive(archive, options)?;
    match coordinator.export_entry(entry, dest_dir)? {
        Some(path) => println!("Extracted {} to {}", entry, path.display()),
        None => println!("Kept existing file for {}", entry),
    }
    Ok(())
}

fn handle_extract_all(archive: &Path, dest_dir: Option<PathBuf>, options: &ExtractOptions) -> Result<(), ViewerError> {
    let coordinator = open_archive(archive, options)?;

    let dest_dir = match dest_dir {
        Some(dir) => dir,
        None => match StdinDirectoryPrompt.choose_directory() {
            Some(dir) => dir,
            None => {
                eprintln!("Extraction cancelled");
                return Ok(());
            }
        },
    };

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Extracting {}", archive.display()));

    match coordinator.extract_all(&dest_dir) {
        Ok(stats) => {
            spinner.finish_and_clear();
            print_stats(&stats, &dest_dir);
            Ok(())
        }
        Err(e) => {
            spinner.abandon();
            Err(e)
        }
    }
}

fn handle_resources(file: &Path, json: bool) -> Result<(), ViewerError> {
    let model = PeViewerModel::open(file)?;
    if json {
        return print_json(model.list_resources());
    }
    print_resources(&model);
    Ok(())
}

fn handle_extract_resources(file: &Path, dest_dir: &Path, options: &ExtractOptions) -> Result<(), ViewerError> {
    let model = PeViewerModel::open(file)?;
    let stats = model.extract_all_resources(dest_dir, options)?;
    print_stats(&stats, dest_dir);
    Ok(())
}

fn print_stats(stats: &ExtractStats, dest_dir: &Path) {
    println!(
        "Extracted {} files ({}) to {} in {:.2?}",
        stats.files_extracted,
        format_size(stats.bytes_written),
        dest_dir.display(),
        stats.duration
    );
}
