//! Stage progress.
//!
//! Stages count their work units (record files, variables, stages of a
//! full run) through a [`ProgressCallback`]. The binary renders them as
//! terminal bars; tests and library callers pass [`null_progress`].

use std::sync::Arc;

/// Receiver of work-unit counts from a running stage.
///
/// Trend estimation ticks the same callback from every `rayon` worker.
pub trait ProgressCallback: Send + Sync {
    /// Number of units the stage is about to process.
    fn set_total(&self, total: u64);

    fn inc(&self, delta: u64);

    /// What the stage is currently doing.
    fn set_message(&self, msg: String);

    /// The stage is done; `msg` summarizes it.
    fn finish(&self, msg: String);
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
