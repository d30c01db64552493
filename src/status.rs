//! Worker → UI status events and cooperative cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::pipeline::{FileReport, RunSummary};

/// A progress update from a batch run.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// Human-readable step message ("Generating title for …").
    Progress(String),
    /// One candidate file finished (processed, skipped or failed).
    File(FileReport),
    /// The run ended normally or was cancelled.
    Finished(RunSummary),
    /// Setup failed; nothing was processed.
    Aborted(String),
}

pub type StatusSender = mpsc::UnboundedSender<StatusEvent>;
pub type StatusReceiver = mpsc::UnboundedReceiver<StatusEvent>;

pub fn status_channel() -> (StatusSender, StatusReceiver) {
    mpsc::unbounded_channel()
}

/// Send without caring whether the receiver is still around.
pub(crate) fn emit(tx: &StatusSender, event: StatusEvent) {
    let _ = tx.send(event);
}

/// Shared "please stop" flag, checked by the pipeline between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
