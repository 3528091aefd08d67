#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal progress and logging for the drought risk binary.
//!
//! [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, so log lines are printed above the progress bars
//! instead of through them. [`TerminalProgress`] renders the pipeline's
//! [`ProgressCallback`] with `indicatif`.

use std::sync::Arc;
use std::time::Duration;

use drought_risk_pipeline::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

pub use indicatif::MultiProgress;

/// An `indicatif` bar driven by pipeline progress.
pub struct TerminalProgress {
    bar: ProgressBar,
    /// Applied once the amount of work is known.
    sized_style: ProgressStyle,
}

impl TerminalProgress {
    /// Per-file progress inside a stage.
    ///
    /// Spins until the stage reports how many files it will read, then
    /// shows a bar with rate and ETA.
    #[must_use]
    pub fn files_bar(multi: &MultiProgress) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let sized_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.cyan/dim} {pos}/{len} files {per_sec} [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

        Arc::new(Self { bar, sized_style })
    }

    /// Stage-level progress of a full run.
    #[must_use]
    pub fn stages_bar(multi: &MultiProgress) -> Arc<dyn ProgressCallback> {
        let bar = multi.add(ProgressBar::new(0));
        let sized_style = ProgressStyle::with_template(
            "{msg:>28} {bar:40.green/dim} stage {pos}/{len} [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
        bar.set_style(sized_style.clone());

        Arc::new(Self { bar, sized_style })
    }
}

impl ProgressCallback for TerminalProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(0);
        self.bar.set_style(self.sized_style.clone());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger (level from `RUST_LOG`, default `info`) and
/// returns the [`MultiProgress`] every bar must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    let logger = builder.build();
    let level = logger.filter();

    // Already set when called twice in one process.
    let _ = indicatif_log_bridge::LogWrapper::new(multi.clone(), logger).try_init();
    log::set_max_level(level);

    multi
}
