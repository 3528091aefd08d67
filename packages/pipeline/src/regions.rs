//! Region stages: aggregation, scoring and boundary annotation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use drought_risk_region_models::Region;
use drought_risk_scoring::ScoringContext;
use drought_risk_spatial::{load_regions, summarize_regions};
use drought_risk_station_models::{HydropowerPlant, Station, VariableKind};
use drought_risk_store::groups::{REGION_IDENTITY, REGION_RISK, REGION_SUMMARIES};
use drought_risk_store::{
    Collection, StoreError, annotate_geojson, load_geojson, station_features, write_atomic,
};

use crate::progress::ProgressCallback;
use crate::{PipelineConfig, PipelineError};

fn load_stations(config: &PipelineConfig, kind: VariableKind) -> Result<Vec<Station>, PipelineError> {
    Ok(Collection::load(&config.state.stations_path(kind), "id")?.decode()?)
}

/// Reads the hydropower plant inventory.
///
/// # Errors
///
/// Returns an error if `path` does not exist or is not a JSON array of
/// plants.
pub fn load_plants(path: &Path) -> Result<Vec<HydropowerPlant>, PipelineError> {
    if !path.exists() {
        return Err(StoreError::MissingInput {
            path: path.display().to_string(),
        }
        .into());
    }
    let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let plants: Vec<HydropowerPlant> =
        serde_json::from_str(&text).map_err(|source| PipelineError::Json {
            path: path.display().to_string(),
            source,
        })?;
    log::info!("Loaded {} hydropower plants from {}", plants.len(), path.display());
    Ok(plants)
}

/// Loads regions from the boundaries and summarizes every configured
/// variable onto them.
///
/// Regions no longer present in the boundaries are dropped from the
/// region collection together with their summaries and risk.
///
/// # Errors
///
/// Returns an error if the boundaries cannot be read, a configured
/// variable has no station collection yet, or the region collection cannot
/// be written.
pub fn aggregate_regions(
    config: &PipelineConfig,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<usize, PipelineError> {
    let mut regions = load_regions(&config.regions)?;

    progress.set_message("Aggregating stations onto regions".to_string());
    progress.set_total(config.variables.len() as u64);

    for (&kind, variable) in &config.variables {
        let stations = load_stations(config, kind)?;
        summarize_regions(
            &mut regions,
            kind,
            variable.trend_config(kind).trend_unit,
            &stations,
            &variable.search_config(kind),
        );
        progress.inc(1);
    }

    let path = config.state.regions_path();
    let mut collection = Collection::load_or_empty(&path, "key")?;
    let current: BTreeSet<String> = regions.iter().map(|r| r.key.clone()).collect();
    collection.retain_keys(&current);
    collection.merge(&REGION_IDENTITY, &regions)?;
    collection.merge(&REGION_SUMMARIES, &regions)?;
    collection.save(&path)?;

    progress.finish(format!("Aggregated {} regions", regions.len()));
    Ok(regions.len())
}

/// Scores every persisted region.
///
/// # Errors
///
/// Returns an error if the region collection, a configured plant
/// inventory, or the sediment station collection is missing, or if the
/// collection cannot be written.
pub fn score_regions(config: &PipelineConfig) -> Result<Vec<Region>, PipelineError> {
    let path = config.state.regions_path();
    let mut collection = Collection::load(&path, "key")?;
    let mut regions: Vec<Region> = collection.decode()?;

    let plants = config.plants.as_deref().map(load_plants).transpose()?;
    if plants.is_none() {
        log::info!("No hydropower plant inventory configured");
    }
    let sediment = if config.variables.contains_key(&VariableKind::Sediment) {
        load_stations(config, VariableKind::Sediment)?
    } else {
        Vec::new()
    };

    let context = ScoringContext {
        plants: plants.as_deref(),
        sediment_stations: &sediment,
    };
    drought_risk_scoring::score_regions(&mut regions, &context, &config.scoring);

    collection.merge(&REGION_RISK, &regions)?;
    collection.save(&path)?;
    Ok(regions)
}

fn write_geojson(path: &Path, value: &serde_json::Value) -> Result<(), PipelineError> {
    let text = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    write_atomic(path, &text)?;
    Ok(())
}

/// Writes the boundary collection with region properties attached, and a
/// point collection of each configured variable's stations.
///
/// # Errors
///
/// Returns an error if the region collection, the boundaries or a station
/// collection is missing, or an output cannot be written.
pub fn annotate_boundaries(config: &PipelineConfig) -> Result<usize, PipelineError> {
    let regions: Vec<Region> = Collection::load(&config.state.regions_path(), "key")?.decode()?;
    let boundary = load_geojson(&config.regions.path)?;
    let annotated = annotate_geojson(&boundary, &config.regions.key_property, &regions)?;

    let path = config.state.annotated_path();
    write_geojson(&path, &annotated)?;
    log::info!("Wrote annotated boundaries to {}", path.display());

    for &kind in config.variables.keys() {
        let stations = load_stations(config, kind)?;
        let path = config.state.station_features_path(kind);
        write_geojson(&path, &station_features(&stations))?;
        log::info!("Wrote {kind} station points to {}", path.display());
    }

    Ok(regions.len())
}
