#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Distance-weighted aggregation of station trends onto regions.
//!
//! For each region centroid, stations with an accepted trend and a known
//! location within the search radius contribute with weight
//! `1 / (1 + distance_km)`. If none is in range, the nearest
//! [`SearchConfig::fallback_count`] stations are used instead and the
//! summary is flagged as estimated. Distance ties keep the input order.

pub mod regions;

use drought_risk_region_models::{Contributor, Region, RegionSummary};
use drought_risk_station_models::{GeoPoint, Station, TrendUnit, VariableKind};
use geo::{Distance, Haversine, Point};
use serde::Deserialize;

pub use regions::{RegionSource, SpatialError, load_regions, parse_regions};

/// Search settings for one variable.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Inclusive search radius around the region centroid.
    pub radius_km: f64,
    /// Nearest stations used when none is within the radius.
    pub fallback_count: usize,
    /// Maximum distinct labels kept on a summary.
    pub max_labels: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_km: 30.0,
            fallback_count: 3,
            max_labels: 4,
        }
    }
}

impl SearchConfig {
    #[must_use]
    pub fn with_radius(radius_km: f64) -> Self {
        Self {
            radius_km,
            ..Self::default()
        }
    }
}

/// Great-circle distance in kilometres (haversine, mean Earth radius).
#[must_use]
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    Haversine.distance(
        Point::new(a.longitude, a.latitude),
        Point::new(b.longitude, b.latitude),
    ) / 1000.0
}

/// Summarizes the trends of `stations` around `target`.
///
/// Returns `None` when no station has both an accepted trend and a
/// location.
#[must_use]
pub fn aggregate(
    target: GeoPoint,
    kind: VariableKind,
    unit: TrendUnit,
    stations: &[Station],
    config: &SearchConfig,
) -> Option<RegionSummary> {
    let candidates: Vec<(&Station, f64)> = stations
        .iter()
        .filter(|s| s.trend.trend().is_some())
        .filter_map(|s| {
            let location = s.location.as_ref()?;
            Some((s, haversine_km(target, location.point())))
        })
        .collect();

    if candidates.is_empty() {
        return None;
    }

    let in_range: Vec<(&Station, f64)> = candidates
        .iter()
        .copied()
        .filter(|(_, d)| *d <= config.radius_km)
        .collect();

    let (contributors, estimated) = if in_range.is_empty() {
        let mut nearest = candidates;
        // Stable: equal distances keep input order.
        nearest.sort_by(|a, b| a.1.total_cmp(&b.1));
        nearest.truncate(config.fallback_count);
        (nearest, true)
    } else {
        (in_range, false)
    };

    let mut weight_sum = 0.0;
    let mut trend_sum = 0.0;
    let mut magnitude_sum = 0.0;
    let mut labels: Vec<String> = Vec::new();
    let mut shares = Vec::with_capacity(contributors.len());

    for (station, distance_km) in &contributors {
        let Some(trend) = station.trend.trend() else {
            continue;
        };
        let weight = 1.0 / (1.0 + distance_km);
        weight_sum += weight;
        trend_sum += weight * trend.value_in(unit);
        magnitude_sum += weight * trend.mean_level;

        if let Some(label) = station.label.as_deref().map(str::trim)
            && !label.is_empty()
            && labels.len() < config.max_labels
            && !labels.iter().any(|l| l == label)
        {
            labels.push(label.to_string());
        }

        shares.push(Contributor {
            station_id: station.id.clone(),
            distance_km: *distance_km,
            weight,
        });
    }

    Some(RegionSummary {
        kind,
        unit,
        mean_trend: trend_sum / weight_sum,
        mean_magnitude: magnitude_sum / weight_sum,
        station_count: shares.len(),
        estimated,
        labels,
        contributors: shares,
    })
}

/// Writes the `kind` summary of every region, removing it where no
/// summary can be formed.
pub fn summarize_regions(
    regions: &mut [Region],
    kind: VariableKind,
    unit: TrendUnit,
    stations: &[Station],
    config: &SearchConfig,
) {
    let mut estimated = 0_usize;
    let mut absent = 0_usize;

    for region in regions.iter_mut() {
        match aggregate(region.centroid(), kind, unit, stations, config) {
            Some(summary) => {
                if summary.estimated {
                    estimated += 1;
                }
                region.summaries.insert(kind, summary);
            }
            None => {
                absent += 1;
                region.summaries.remove(&kind);
            }
        }
    }

    log::info!(
        "Aggregated {kind} onto {} regions ({estimated} estimated, {absent} without data)",
        regions.len()
    );
}
