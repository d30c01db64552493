use anyhow::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::ai::{self, OpenAiService, TitleService};
use crate::config::{Config, TitleConfig};
use crate::error::SetupError;
use crate::exif::{self, GpsCoordinate, WriteMode, WriteOutcome};
use crate::geocode::{Geocoder, NominatimGeocoder};
use crate::ledger::{self, LedgerEntry, LedgerWriter};
use crate::rename::{self, place_from_filename, sanitize_title};
use crate::status::{emit, CancelFlag, StatusEvent, StatusSender};

/// What happened to the GPS tags of one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpsStatus {
    /// No place name in the filename, or the file was never reached.
    NotAttempted,
    /// The geocoder had no match.
    NotFound,
    Written,
    /// The file already had GPS; it was left untouched.
    AlreadyPresent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Processed,
    /// Already in the ledger (or renamed together with an earlier sibling).
    Skipped,
    Failed,
    /// The run was cancelled before this file was renamed.
    Cancelled,
}

/// The result of running one file through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub original: String,
    pub outcome: FileOutcome,
    pub place: Option<String>,
    pub coordinate: Option<GpsCoordinate>,
    pub gps: GpsStatus,
    pub title: Option<String>,
    /// New file name of the JPEG, when it was renamed.
    pub new_name: Option<String>,
    pub error: Option<String>,
}

impl FileReport {
    fn new(path: &Path, original: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            original: original.to_string(),
            outcome: FileOutcome::Processed,
            place: None,
            coordinate: None,
            gps: GpsStatus::NotAttempted,
            title: None,
            new_name: None,
            error: None,
        }
    }

    fn fail(mut self, error: impl std::fmt::Display) -> Self {
        self.outcome = FileOutcome::Failed;
        self.error = Some(error.to_string());
        self
    }
}

/// Totals for one run over a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub folder: PathBuf,
    pub candidates: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// JPEG files directly inside `folder`, sorted by file name.
pub fn collect_jpegs(folder: &Path) -> Result<Vec<PathBuf>, SetupError> {
    std::fs::read_dir(folder).map_err(|source| SetupError::FolderUnreadable {
        path: folder.to_path_buf(),
        source,
    })?;

    let mut images = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        match entry {
            Ok(entry) => {
                let p = entry.path();
                if entry.file_type().is_file() && exif::is_jpeg(p) {
                    images.push(p.to_path_buf());
                }
            }
            Err(e) => log::warn!("Skipping unreadable entry in {}: {e}", folder.display()),
        }
    }
    Ok(images)
}

/// Geocode → GPS write → title → rename → ledger, for every JPEG in a folder.
///
/// # Example
///
/// ```rust,no_run
/// use geotitle::config::Config;
/// use geotitle::pipeline::BatchPipeline;
/// use geotitle::status::{status_channel, CancelFlag};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::load(None)?;
/// let pipeline = BatchPipeline::from_config(&config)?;
/// let (tx, _rx) = status_channel();
/// let summary = pipeline.run("./photos".as_ref(), &tx, &CancelFlag::new()).await?;
/// println!("{} processed, {} failed", summary.processed, summary.failed);
/// # Ok(())
/// # }
/// ```
pub struct BatchPipeline {
    geocoder: Box<dyn Geocoder>,
    titles: Box<dyn TitleService>,
    title_settings: TitleConfig,
}

impl BatchPipeline {
    pub fn new(
        geocoder: Box<dyn Geocoder>,
        titles: Box<dyn TitleService>,
        title_settings: TitleConfig,
    ) -> Self {
        Self {
            geocoder,
            titles,
            title_settings,
        }
    }

    /// Nominatim + OpenAI from configuration. Fails without an API key.
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.has_api_key() {
            return Err(SetupError::MissingApiKey.into());
        }
        Ok(Self::new(
            Box::new(NominatimGeocoder::from_config(config)?),
            Box::new(OpenAiService::from_config(config)?),
            config.title.clone(),
        ))
    }

    /// Process every eligible JPEG in `folder`.
    ///
    /// Per-file problems end up in that file's [`FileReport`]; only setup
    /// failures (unreadable folder, unusable ledger) return `Err`, which is
    /// also sent as [`StatusEvent::Aborted`].
    pub async fn run(
        &self,
        folder: &Path,
        status: &StatusSender,
        cancel: &CancelFlag,
    ) -> Result<RunSummary, SetupError> {
        match self.run_inner(folder, status, cancel).await {
            Ok(summary) => {
                emit(status, StatusEvent::Finished(summary.clone()));
                Ok(summary)
            }
            Err(e) => {
                log::error!("Run aborted: {e}");
                emit(status, StatusEvent::Aborted(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_inner(
        &self,
        folder: &Path,
        status: &StatusSender,
        cancel: &CancelFlag,
    ) -> Result<RunSummary, SetupError> {
        let progress = |msg: String| {
            log::info!("{msg}");
            emit(status, StatusEvent::Progress(msg));
        };

        progress("Processing images...".to_string());
        let images = collect_jpegs(folder)?;
        let mut processed = ledger::load_processed(folder)?;
        let mut ledger = LedgerWriter::open(folder)?;

        let mut summary = RunSummary {
            folder: folder.to_path_buf(),
            candidates: images.len(),
            ..RunSummary::default()
        };

        for (i, path) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let name = file_name(path);
            let stem = file_stem(path);
            progress(format!("[{}/{}] {name}", i + 1, images.len()));

            let report = if processed.contains(&stem) || !path.exists() {
                progress(format!("Skipping already processed file: {name}"));
                let mut report = FileReport::new(path, &name);
                report.outcome = FileOutcome::Skipped;
                report
            } else {
                self.process_file(folder, path, &mut ledger, &mut processed, status, cancel)
                    .await?
            };

            match report.outcome {
                FileOutcome::Processed => summary.processed += 1,
                FileOutcome::Skipped => summary.skipped += 1,
                FileOutcome::Failed => {
                    summary.failed += 1;
                    log::error!(
                        "{name}: {}",
                        report.error.as_deref().unwrap_or("unknown error")
                    );
                }
                FileOutcome::Cancelled => summary.cancelled = true,
            }
            emit(status, StatusEvent::File(report));

            if summary.cancelled {
                break;
            }
        }

        if summary.cancelled {
            progress("Cancelled.".to_string());
        } else {
            progress(format!(
                "Processing complete! {} processed, {} skipped, {} failed.",
                summary.processed, summary.skipped, summary.failed
            ));
        }
        Ok(summary)
    }

    /// One file. Only a ledger write failure escapes as `Err`.
    async fn process_file(
        &self,
        folder: &Path,
        path: &Path,
        ledger: &mut LedgerWriter,
        processed: &mut HashSet<String>,
        status: &StatusSender,
        cancel: &CancelFlag,
    ) -> Result<FileReport, SetupError> {
        let name = file_name(path);
        let stem = file_stem(path);
        let mut report = FileReport::new(path, &name);
        let progress = |msg: String| {
            log::info!("  {msg}");
            emit(status, StatusEvent::Progress(msg));
        };

        // Geocode + GPS
        let place = place_from_filename(&name);
        if !place.is_empty() {
            report.place = Some(place.clone());
            match self.geocoder.geocode(&place).await {
                Ok(Some(coord)) => {
                    report.coordinate = Some(coord);
                    progress(format!("Checking GPS data for {name}..."));
                    match exif::write_gps(path, &coord, WriteMode::KeepExisting) {
                        Ok(WriteOutcome::Written) => {
                            report.gps = GpsStatus::Written;
                            progress(format!("Added GPS {coord} to {name}"));
                        }
                        Ok(WriteOutcome::AlreadyPresent) => {
                            report.gps = GpsStatus::AlreadyPresent;
                            progress(format!(
                                "GPS data already present in {name}, skipping GPS update."
                            ));
                        }
                        Err(e) => return Ok(report.fail(format!("{e:#}"))),
                    }
                }
                Ok(None) => {
                    report.gps = GpsStatus::NotFound;
                    progress(format!("No location found for \"{place}\""));
                }
                Err(e) => {
                    return Ok(report.fail(format!(
                        "{} lookup failed: {e:#}",
                        self.geocoder.name()
                    )));
                }
            }
        }

        // Title
        progress(format!("Generating title for {name}..."));
        let title = match ai::infer_title(&*self.titles, path, &self.title_settings).await {
            Ok(t) => t,
            Err(e) => return Ok(report.fail(format!("{e:#}"))),
        };
        report.title = Some(title.clone());

        let safe_title = sanitize_title(&title);
        if safe_title.is_empty() {
            return Ok(report.fail(format!("title \"{title}\" has no usable characters")));
        }

        if cancel.is_cancelled() {
            report.outcome = FileOutcome::Cancelled;
            return Ok(report);
        }

        // Rename (with sidecars)
        let new_stem = if safe_title == stem {
            stem.clone()
        } else {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_default();
            let target = rename::unique_target(folder, &safe_title, &ext);
            let new_stem = file_stem(&target);
            if let Err(e) = rename::rename_siblings(folder, &stem, &new_stem) {
                return Ok(report.fail(format!("{e:#}")));
            }
            new_stem
        };
        let new_name = match path.extension() {
            Some(ext) => format!("{new_stem}.{}", ext.to_string_lossy()),
            None => new_stem.clone(),
        };

        // Ledger
        let entry = LedgerEntry {
            original: name.clone(),
            title: new_stem.clone(),
        };
        ledger
            .append(&entry)
            .map_err(|source| SetupError::LedgerUnwritable {
                path: ledger.path().to_path_buf(),
                source,
            })?;
        processed.insert(stem);
        processed.insert(new_stem);

        progress(format!("Processed: {name} → {new_name}"));
        report.new_name = Some(new_name);
        Ok(report)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
