//! Station stages: registration, coordinate correction and trends.

use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drought_risk_parser::{ListingEntry, ParseOptions, RecordHeader, read_listing, read_record};
use drought_risk_registry::{AttachSummary, CorrectionSummary, RegisterSummary, StationRegistry};
use drought_risk_station_models::{Series, Station, TrendOutcome, VariableKind};
use drought_risk_store::Collection;
use drought_risk_store::groups::{STATION_IDENTITY, STATION_LOCATION, STATION_TREND};
use drought_risk_trend::{TrendConfig, estimate};
use rayon::prelude::*;

use crate::progress::ProgressCallback;
use crate::{PipelineConfig, PipelineError, VariableConfig};

/// Counts from one trend run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrendReport {
    pub files: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub attach: AttachSummary,
}

/// Station id of a record: the header's `HZB-Nummer`, else the file-name
/// suffix after the last `-`.
#[must_use]
pub fn record_station_id(path: &Path, header: &RecordHeader) -> Option<String> {
    header
        .station_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .or_else(|| {
            path.file_stem()?
                .to_str()?
                .rsplit('-')
                .next()
                .map(str::trim)
                .filter(|id| !id.is_empty())
        })
        .map(str::to_string)
}

/// Record files in `dir` with extension `extension`, in name order.
///
/// # Errors
///
/// Returns an error if `dir` cannot be listed.
pub fn record_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let io_err = |source| PipelineError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn header_entry(path: &Path, header: &RecordHeader) -> Option<ListingEntry> {
    let id = record_station_id(path, header)?;
    Some(ListingEntry {
        name: header.name.clone().unwrap_or_else(|| id.clone()),
        label: header.watercourse.clone(),
        projected: header.projected,
        catchment_km2: header.catchment_km2,
        id,
    })
}

/// The listing of `kind`, extended by record headers of stations the
/// listing does not name.
fn station_entries(
    kind: VariableKind,
    variable: &VariableConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<Vec<ListingEntry>, PipelineError> {
    let mut entries = match &variable.listing {
        Some(listing) => read_listing(listing, &variable.columns(kind))?,
        None => Vec::new(),
    };

    if let Some(dir) = &variable.records_dir {
        let files = record_files(dir, &variable.record_extension)?;
        let options = variable.parse_options(kind);
        progress.set_message(format!("Reading {kind} record headers"));
        progress.set_total(files.len() as u64);

        let headers: Vec<ListingEntry> = files
            .par_iter()
            .filter_map(|path| {
                let entry = match read_record(path, &options) {
                    Ok(record) => header_entry(path, &record.header),
                    Err(e) => {
                        log::warn!("Skipping {}: {e}", path.display());
                        None
                    }
                };
                progress.inc(1);
                entry
            })
            .collect();

        let mut known: BTreeSet<String> = entries.iter().map(|e| e.id.clone()).collect();
        let before = entries.len();
        for entry in headers {
            if known.insert(entry.id.clone()) {
                entries.push(entry);
            }
        }
        log::info!(
            "{} {kind} stations found only in record headers",
            entries.len() - before
        );
    }

    if entries.is_empty() {
        log::warn!("No {kind} stations listed; configure a listing or records_dir");
    }
    Ok(entries)
}

fn open_registry(
    config: &PipelineConfig,
    kind: VariableKind,
    required: bool,
) -> Result<(Collection, StationRegistry), PipelineError> {
    let path = config.state.stations_path(kind);
    let collection = if required {
        Collection::load(&path, "id")?
    } else {
        Collection::load_or_empty(&path, "id")?
    };
    let stations: Vec<Station> = collection.decode()?;
    Ok((collection, StationRegistry::from_stations(kind, stations)))
}

/// Adds listed stations of `kind` and refreshes their metadata.
///
/// # Errors
///
/// Returns an error if `kind` is not configured, an input cannot be read,
/// the transform fails, or the collection cannot be written.
pub fn register_stations(
    config: &PipelineConfig,
    kind: VariableKind,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RegisterSummary, PipelineError> {
    let variable = config.variable(kind)?;
    let entries = station_entries(kind, variable, progress)?;
    let (mut collection, mut registry) = open_registry(config, kind, false)?;

    let transform = config.transform.build();
    let summary = registry.register_listing(&entries, transform.as_ref(), &config.bounding_box)?;

    let stations = registry.into_stations();
    collection.merge(&STATION_IDENTITY, &stations)?;
    collection.merge(&STATION_LOCATION, &stations)?;
    collection.save(&config.state.stations_path(kind))?;

    progress.finish(format!("Registered {} {kind} stations", stations.len()));
    Ok(summary)
}

/// Re-derives station locations of `kind` with the correction transform.
///
/// Only the location group is written, so trends stay attached.
///
/// # Errors
///
/// Returns an error if `kind` is not configured, the station collection
/// does not exist, the transform fails, or the collection cannot be
/// written.
pub fn correct_coordinates(
    config: &PipelineConfig,
    kind: VariableKind,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<CorrectionSummary, PipelineError> {
    let variable = config.variable(kind)?;
    let (mut collection, mut registry) = open_registry(config, kind, true)?;
    let entries = station_entries(kind, variable, progress)?;

    let transform = config
        .correction
        .as_ref()
        .unwrap_or(&config.transform)
        .build();
    let summary =
        registry.correct_coordinates(&entries, transform.as_ref(), &config.bounding_box)?;

    collection.merge(&STATION_LOCATION, &registry.into_stations())?;
    collection.save(&config.state.stations_path(kind))?;

    progress.finish(format!(
        "Corrected {} {kind} locations ({} cleared)",
        summary.corrected, summary.cleared
    ));
    Ok(summary)
}

fn trend_for_file(
    path: &Path,
    options: &ParseOptions,
    config: &TrendConfig,
) -> Option<(String, TrendOutcome)> {
    let record = match read_record(path, options) {
        Ok(record) => record,
        Err(e) => {
            log::warn!("Skipping {}: {e}", path.display());
            return None;
        }
    };
    let Some(id) = record_station_id(path, &record.header) else {
        log::warn!("Skipping {}: no station id", path.display());
        return None;
    };

    let series = Series::from_observations(record.observations);
    let outcome = estimate(&series, config);
    match &outcome {
        TrendOutcome::Accepted(trend) => log::debug!(
            "{id}: {:+.4}/decade over {} years",
            trend.slope_per_decade,
            trend.year_count
        ),
        TrendOutcome::Rejected { reason } => log::debug!("{id}: rejected ({reason})"),
        TrendOutcome::Pending => {}
    }
    Some((id, outcome))
}

/// Estimates a trend for every record file of `kind` and attaches the
/// outcomes to registered stations.
///
/// Files are processed in parallel; outcomes are collected by station id,
/// the first file in name order winning when two files share an id.
///
/// # Errors
///
/// Returns an error if `kind` has no records directory, the station
/// collection does not exist, or it cannot be written.
pub fn compute_trends(
    config: &PipelineConfig,
    kind: VariableKind,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<TrendReport, PipelineError> {
    let variable = config.variable(kind)?;
    let dir = variable.records_dir.as_deref().ok_or_else(|| {
        PipelineError::Invalid(format!("{kind} has no records_dir to compute trends from"))
    })?;
    let (mut collection, mut registry) = open_registry(config, kind, true)?;

    let files = record_files(dir, &variable.record_extension)?;
    let options = variable.parse_options(kind);
    let trend_config = variable.trend_config(kind);

    progress.set_message(format!("Computing {kind} trends"));
    progress.set_total(files.len() as u64);

    let results: Vec<Option<(String, TrendOutcome)>> = files
        .par_iter()
        .map(|path| {
            let result = trend_for_file(path, &options, &trend_config);
            progress.inc(1);
            result
        })
        .collect();

    let mut report = TrendReport {
        files: files.len(),
        ..TrendReport::default()
    };
    let mut outcomes = BTreeMap::new();
    for (id, outcome) in results.into_iter().flatten() {
        match outcomes.entry(id) {
            Entry::Vacant(slot) => {
                match outcome {
                    TrendOutcome::Accepted(_) => report.accepted += 1,
                    TrendOutcome::Rejected { .. } => report.rejected += 1,
                    TrendOutcome::Pending => {}
                }
                slot.insert(outcome);
            }
            Entry::Occupied(slot) => {
                log::warn!("Duplicate {kind} record for station {}, keeping first", slot.key());
            }
        }
    }

    report.attach = registry.attach_trends(outcomes);
    collection.merge(&STATION_TREND, &registry.into_stations())?;
    collection.save(&config.state.stations_path(kind))?;

    log::info!(
        "{kind} trends: {} files, {} accepted, {} rejected, {} orphans",
        report.files,
        report.accepted,
        report.rejected,
        report.attach.orphans.len()
    );
    progress.finish(format!(
        "{kind}: {} trends accepted of {} records",
        report.accepted, report.files
    ));
    Ok(report)
}
