#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Stage orchestration for the drought risk pipeline.
//!
//! Every stage reads a complete snapshot of its inputs, computes, and
//! writes its own field group back through the store:
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | [`register_stations`] | listing, record headers | station identity + location |
//! | [`correct_coordinates`] | listing, record headers | station location |
//! | [`compute_trends`] | record files | station trend |
//! | [`aggregate_regions`] | boundaries, stations | region identity + summaries |
//! | [`score_regions`] | regions, plants, sediment stations | region risk |
//! | [`annotate_boundaries`] | regions, boundaries, stations | annotated `GeoJSON` |
//!
//! Re-running a stage with unchanged inputs rewrites identical files.

pub mod config;
pub mod progress;
pub mod regions;
pub mod stations;

use std::sync::Arc;

use drought_risk_parser::ParseError;
use drought_risk_registry::TransformError;
use drought_risk_scoring::ScoringError;
use drought_risk_spatial::SpatialError;
use drought_risk_station_models::VariableKind;
use drought_risk_store::StoreError;

pub use config::{PipelineConfig, StateConfig, VariableConfig};
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use regions::{aggregate_regions, annotate_boundaries, load_plants, score_regions};
pub use stations::{
    TrendReport, compute_trends, correct_coordinates, record_files, record_station_id,
    register_stations,
};

/// Errors that can stop a pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Filesystem I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`PipelineConfig`].
    #[error("Invalid configuration {path}: {source}")]
    ConfigParse {
        path: String,
        source: toml::de::Error,
    },

    /// A setting is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// A stage was asked to run for a variable without a section.
    #[error("Variable {0} is not configured")]
    NotConfigured(VariableKind),

    /// An input file is not valid JSON.
    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Coordinate transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Region error: {0}")]
    Spatial(#[from] SpatialError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// A stage of [`run_all`], for progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Register(VariableKind),
    Correct(VariableKind),
    Trends(VariableKind),
    Aggregate,
    Score,
    Annotate,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register(kind) => write!(f, "register {kind}"),
            Self::Correct(kind) => write!(f, "correct {kind} coordinates"),
            Self::Trends(kind) => write!(f, "{kind} trends"),
            Self::Aggregate => f.write_str("aggregate"),
            Self::Score => f.write_str("score"),
            Self::Annotate => f.write_str("annotate"),
        }
    }
}

/// Stages [`run_all`] executes for `config`, in order.
///
/// Coordinate correction runs only when a correction transform is
/// configured; trends only for variables with a records directory.
#[must_use]
pub fn planned_stages(config: &PipelineConfig) -> Vec<Stage> {
    let mut stages = Vec::new();
    for (&kind, variable) in &config.variables {
        stages.push(Stage::Register(kind));
        if config.correction.is_some() {
            stages.push(Stage::Correct(kind));
        }
        if variable.records_dir.is_some() {
            stages.push(Stage::Trends(kind));
        }
    }
    stages.extend([Stage::Aggregate, Stage::Score, Stage::Annotate]);
    stages
}

/// Runs every stage for every configured variable.
///
/// `steps` advances once per stage; `records` reports the per-file work
/// inside a stage.
///
/// # Errors
///
/// Returns the first stage error; files written by earlier stages are
/// kept.
pub fn run_all(
    config: &PipelineConfig,
    steps: &Arc<dyn ProgressCallback>,
    records: &Arc<dyn ProgressCallback>,
) -> Result<(), PipelineError> {
    let stages = planned_stages(config);
    steps.set_total(stages.len() as u64);

    for stage in stages {
        steps.set_message(stage.to_string());
        log::info!("Running stage: {stage}");
        match stage {
            Stage::Register(kind) => {
                register_stations(config, kind, records)?;
            }
            Stage::Correct(kind) => {
                correct_coordinates(config, kind, records)?;
            }
            Stage::Trends(kind) => {
                compute_trends(config, kind, records)?;
            }
            Stage::Aggregate => {
                aggregate_regions(config, records)?;
            }
            Stage::Score => {
                score_regions(config)?;
            }
            Stage::Annotate => {
                annotate_boundaries(config)?;
            }
        }
        steps.inc(1);
    }

    steps.finish("Pipeline complete".to_string());
    Ok(())
}
