//! Error kinds callers need to tell apart.
//!
//! Most library operations return [`anyhow::Result`]; the enums here cover
//! the cases a front end reacts to differently (show a prompt, keep the
//! current image, abort a run).

use std::path::PathBuf;
use thiserror::Error;

/// An out-of-range or non-numeric coordinate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoordinateError {
    #[error("latitude {0} is outside -90..=90")]
    Latitude(f64),

    #[error("longitude {0} is outside -180..=180")]
    Longitude(f64),

    #[error("coordinate is not a finite number")]
    NotFinite,
}

/// Failures from the manual GPS editor.
#[derive(Error, Debug)]
pub enum EditorError {
    /// Bad user input. Nothing was written and the index did not move.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no JPEG images in this folder")]
    Empty,

    #[error("failed to save GPS: {0:#}")]
    Write(anyhow::Error),
}

impl From<CoordinateError> for EditorError {
    fn from(e: CoordinateError) -> Self {
        EditorError::Validation(e.to_string())
    }
}

/// Failures that stop a batch run before (or instead of) any per-file work.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("folder {} is not readable: {source}", path.display())]
    FolderUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ledger {} is not writable: {source}", path.display())]
    LedgerUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("ledger {} could not be read: {source}", path.display())]
    LedgerUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no OpenAI API key configured (set OPENAI_API_KEY or openai.api_key in config.json)")]
    MissingApiKey,
}
