use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use geotitle::config::Config;
use geotitle::editor::{self, Advance, EditorSession};
use geotitle::exif::{self, WriteMode};
use geotitle::pipeline::{self, BatchPipeline, FileOutcome, FileReport, GpsStatus};
use geotitle::status::{status_channel, CancelFlag, StatusEvent};

#[derive(Parser, Debug)]
#[command(
    name = "geotitle",
    version,
    about = "Geotag JPEGs from their filenames, title them with AI, and edit GPS by hand"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Geotag, title and rename every new JPEG in a folder
    Process {
        /// Folder of JPEGs (default: image_path from config or IMAGE_PATH)
        #[arg(value_name = "FOLDER")]
        folder: Option<PathBuf>,

        /// Output per-file reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the GPS coordinates of images or folders
    Show {
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },

    /// Overwrite the GPS coordinates of one image
    SetGps {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(long, allow_hyphen_values = true)]
        lat: String,

        #[arg(long, allow_hyphen_values = true)]
        lon: String,
    },

    /// Walk a folder and enter coordinates one image at a time
    Edit {
        #[arg(value_name = "FOLDER")]
        folder: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("No command given. Use --help for usage.");
    };

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env();

    match command {
        Command::Process { folder, json } => {
            let folder = resolve_folder(folder, &config)?;
            run_batch(&config, &folder, json).await
        }
        Command::Show { paths } => show(&paths),
        Command::SetGps { file, lat, lon } => set_gps(&file, &lat, &lon),
        Command::Edit { folder } => {
            let folder = resolve_folder(folder, &config)?;
            edit(&folder)
        }
    }
}

fn resolve_folder(folder: Option<PathBuf>, config: &Config) -> Result<PathBuf> {
    folder
        .or_else(|| config.image_path.as_ref().map(PathBuf::from))
        .context("No folder given and no image_path configured (set IMAGE_PATH or image_path in config.json)")
}

// ── process ─────────────────────────────────────────────────────────

async fn run_batch(config: &Config, folder: &Path, json: bool) -> Result<()> {
    let pipeline = BatchPipeline::from_config(config)?;

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, finishing the current step...");
                cancel.cancel();
            }
        });
    }

    // Progress lines are already logged by the pipeline; keep the reports.
    let (tx, mut rx) = status_channel();
    let collector = tokio::spawn(async move {
        let mut reports = Vec::new();
        while let Some(event) = rx.recv().await {
            if let StatusEvent::File(report) = event {
                reports.push(report);
            }
        }
        reports
    });

    let outcome = pipeline.run(folder, &tx, &cancel).await;
    drop(tx);
    let reports = collector.await.context("Status collector panicked")?;
    let summary = outcome?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print_report(report);
        }
    }

    if summary.cancelled {
        log::warn!(
            "Cancelled after {} of {} file(s)",
            summary.processed + summary.skipped + summary.failed,
            summary.candidates
        );
    }
    log::info!(
        "Done: {} processed, {} skipped, {} failed out of {} image(s)",
        summary.processed,
        summary.skipped,
        summary.failed,
        summary.candidates
    );
    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

fn print_report(report: &FileReport) {
    match report.outcome {
        FileOutcome::Processed => {
            let gps = match (report.gps, report.coordinate) {
                (GpsStatus::Written, Some(c)) => format!("GPS {c}"),
                (GpsStatus::AlreadyPresent, _) => "GPS kept".to_string(),
                (GpsStatus::NotFound, _) => "no location".to_string(),
                _ => "no place in name".to_string(),
            };
            println!(
                "  {GREEN}✓{RESET} {} → {BOLD}{}{RESET} {DIM}({gps}){RESET}",
                report.original,
                report.new_name.as_deref().unwrap_or(&report.original)
            );
        }
        FileOutcome::Skipped => {
            println!("  {DIM}- {} (already processed){RESET}", report.original);
        }
        FileOutcome::Failed => {
            println!(
                "  {RED}✗{RESET} {}: {}",
                report.original,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
        FileOutcome::Cancelled => {
            println!("  {DIM}- {} (cancelled){RESET}", report.original);
        }
    }
}

// ── show / set-gps ──────────────────────────────────────────────────

fn show(paths: &[PathBuf]) -> Result<()> {
    let mut images = Vec::new();
    for path in paths {
        if path.is_dir() {
            images.extend(pipeline::collect_jpegs(path)?);
        } else {
            images.push(path.clone());
        }
    }
    if images.is_empty() {
        anyhow::bail!("No JPEG files found in the specified paths.");
    }

    for path in &images {
        match exif::read_gps(path) {
            Ok(Some(coord)) => println!("{:<40} {coord}", path.display().to_string()),
            Ok(None) => println!("{:<40} {DIM}(no GPS){RESET}", path.display().to_string()),
            Err(e) => log::error!("{}: {e:#}", path.display()),
        }
    }
    Ok(())
}

fn set_gps(file: &Path, lat: &str, lon: &str) -> Result<()> {
    let coord = editor::parse_coordinate(lat, lon)?;
    exif::write_gps(file, &coord, WriteMode::Overwrite)?;
    println!("{} ← {coord}", file.display());
    Ok(())
}

// ── edit ────────────────────────────────────────────────────────────

fn edit(folder: &Path) -> Result<()> {
    let mut session = EditorSession::load_folder(folder)?;
    if session.is_empty() {
        anyhow::bail!("No JPEG files found in {}", folder.display());
    }

    println!("{DIM}Enter \"<lat> <lon>\" to save, blank to skip, m for a map link, q to quit.{RESET}");
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        let current = match session.load_current() {
            Ok(Some(current)) => Some(current),
            Ok(None) => break,
            Err(e) => {
                let name = session
                    .current_path()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!();
                println!(
                    "{BOLD}[{}/{}] {name}{RESET}",
                    session.index() + 1,
                    session.files().len()
                );
                println!("  {RED}{e:#}{RESET}");
                println!("  {DIM}(blank to skip){RESET}");
                None
            }
        };
        if let Some(current) = &current {
            println!();
            println!(
                "{BOLD}[{}/{}] {}{RESET}",
                current.position, current.total, current.file_name
            );
            match current.coordinate {
                Some(c) => println!("  Current GPS: {c}"),
                None => println!("  Current GPS: {DIM}(none){RESET}"),
            }
        }

        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();

        let advance = match line {
            "q" | "quit" => break,
            "" => session.skip(),
            "m" | "map" => {
                match current.as_ref().and_then(|c| c.coordinate) {
                    Some(c) => println!("  {}", editor::map_url(&c)),
                    None => println!("  {DIM}(no coordinate to show){RESET}"),
                }
                continue;
            }
            _ if current.is_none() => {
                println!("  {RED}This image could not be opened; leave blank to skip it.{RESET}");
                continue;
            }
            input => {
                let (lat, lon) = split_pair(input);
                match session.save_current_and_advance(lat, lon) {
                    Ok(advance) => advance,
                    // Bad input or an unwritable file: stay here and let the user retry or skip.
                    Err(e) => {
                        println!("  {RED}{e}{RESET}");
                        continue;
                    }
                }
            }
        };

        if advance == Advance::EndOfList {
            println!();
            println!("All images have been processed.");
            break;
        }
    }
    Ok(())
}

/// "48.85, 2.35" or "48.85 2.35" → ("48.85", "2.35").
fn split_pair(input: &str) -> (&str, &str) {
    let mut parts = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty());
    (parts.next().unwrap_or(""), parts.next().unwrap_or(""))
}
