#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Station, observation series and trend types.
//!
//! Every raw measurement format is normalized into these types before it
//! reaches the trend estimator, the station registry or the spatial
//! aggregator. A station is identified by a stable string id and carries
//! exactly one [`TrendOutcome`], which distinguishes "not yet processed"
//! from "processed but rejected".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Label shown for stations without a watercourse or groundwater area.
pub const UNKNOWN_LABEL: &str = "Unknown";

/// The measured quantity a station reports.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariableKind {
    /// Groundwater level (metres above sea level).
    Level,
    /// River discharge (m³/s).
    Discharge,
    /// Precipitation (mm).
    Precipitation,
    /// Suspended-sediment load (t).
    Sediment,
}

impl VariableKind {
    /// All variable kinds, in pipeline order.
    pub const ALL: &[Self] = &[
        Self::Level,
        Self::Discharge,
        Self::Precipitation,
        Self::Sediment,
    ];

    /// Whether negative readings are physically impossible for this kind.
    #[must_use]
    pub const fn is_non_negative(self) -> bool {
        !matches!(self, Self::Level)
    }
}

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A single dated reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    #[must_use]
    pub const fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Time-ordered, date-unique observations for one station.
///
/// Construction sorts by date (stable) and keeps the first reading of
/// every date, so dates are always strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    observations: Vec<Observation>,
}

impl Series {
    #[must_use]
    pub fn from_observations(mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.date);
        observations.dedup_by_key(|o| o.date);
        Self { observations }
    }

    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Returns a new series with only the observations `keep` accepts.
    #[must_use]
    pub fn filtered(&self, keep: impl Fn(&Observation) -> bool) -> Self {
        Self {
            observations: self
                .observations
                .iter()
                .filter(|o| keep(*o))
                .copied()
                .collect(),
        }
    }
}

/// A station position together with the transform that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationLocation {
    pub latitude: f64,
    pub longitude: f64,
    /// Identifier of the coordinate transform (e.g. `linear`, `cs2cs`).
    pub transform: String,
    /// Version of that transform; corrections only move forward.
    pub version: u32,
}

impl StationLocation {
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// The transform that found no valid position for a station.
///
/// Transforms of this version or older may not locate the station again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationExclusion {
    pub transform: String,
    pub version: u32,
}

/// Unit in which a decadal trend bound or aggregate is expressed.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendUnit {
    /// Variable units per decade.
    #[default]
    Absolute,
    /// Percent of the long-term mean per decade.
    Percent,
}

/// An accepted decadal trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    /// OLS slope of the annual statistic against calendar year, times ten.
    pub slope_per_decade: f64,
    /// `slope_per_decade` relative to `mean_level`, in percent.
    pub relative_slope_pct: f64,
    /// Two-sided Mann-Kendall p-value, when computable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub significance: Option<f64>,
    /// Mean of the retained annual statistics.
    pub mean_level: f64,
    /// Last retained annual statistic.
    pub current_level: f64,
    pub year_count: usize,
    pub first_year: i32,
    pub last_year: i32,
    pub span_years: i32,
}

impl Trend {
    /// The trend expressed in `unit`.
    #[must_use]
    pub const fn value_in(&self, unit: TrendUnit) -> f64 {
        match unit {
            TrendUnit::Absolute => self.slope_per_decade,
            TrendUnit::Percent => self.relative_slope_pct,
        }
    }
}

/// Why a series produced no trend.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RejectReason {
    TooFewObservations,
    InsufficientCoverage,
    ImplausibleMean,
    ImplausibleTrend,
}

/// Result of running the trend estimator on a station.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrendOutcome {
    /// Not processed yet.
    #[default]
    Pending,
    /// Processed; contributes no trend.
    Rejected { reason: RejectReason },
    /// Processed; every gate passed.
    Accepted(Trend),
}

impl TrendOutcome {
    #[must_use]
    pub const fn trend(&self) -> Option<&Trend> {
        match self {
            Self::Accepted(trend) => Some(trend),
            Self::Pending | Self::Rejected { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A measuring station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub kind: VariableKind,
    /// Watercourse (rivers) or groundwater area (wells).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catchment_km2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<StationLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_excluded: Option<LocationExclusion>,
    #[serde(default)]
    pub trend: TrendOutcome,
}

impl Station {
    #[must_use]
    pub const fn new(id: String, name: String, kind: VariableKind) -> Self {
        Self {
            id,
            name,
            kind,
            label: None,
            catchment_km2: None,
            location: None,
            location_excluded: None,
            trend: TrendOutcome::Pending,
        }
    }

    /// The watercourse or area label, or [`UNKNOWN_LABEL`].
    #[must_use]
    pub fn display_label(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// Transform version behind the current location or its exclusion.
    #[must_use]
    pub fn location_version(&self) -> Option<u32> {
        self.location
            .as_ref()
            .map(|l| l.version)
            .or_else(|| self.location_excluded.as_ref().map(|e| e.version))
    }
}

/// Hydropower plant category, ordered by expected flow alteration.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case", from = "String")]
#[strum(serialize_all = "snake_case")]
pub enum PlantType {
    RunOfRiver,
    Storage,
    PumpedStorage,
    Other,
}

impl PlantType {
    /// Relative flow-alteration weight used by the hydropower factor.
    #[must_use]
    pub const fn impact_weight(self) -> f64 {
        match self {
            Self::RunOfRiver => 0.3,
            Self::Storage => 0.7,
            Self::PumpedStorage => 0.5,
            Self::Other => 0.4,
        }
    }
}

impl From<String> for PlantType {
    /// Accepts both the canonical names and the German registry labels
    /// (`Laufkraftwerk`, `Speicherkraftwerk`, `Pumpspeicherkraftwerk`).
    fn from(value: String) -> Self {
        let lower = value.to_lowercase();
        if lower.contains("pump") {
            Self::PumpedStorage
        } else if lower.contains("speicher") || lower == "storage" {
            Self::Storage
        } else if lower.contains("lauf") || lower.contains("run_of_river") {
            Self::RunOfRiver
        } else {
            Self::Other
        }
    }
}

/// A hydropower plant from the plant inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HydropowerPlant {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
    #[serde(rename = "mw")]
    pub capacity_mw: f64,
    #[serde(rename = "type")]
    pub plant_type: PlantType,
    #[serde(rename = "river", default, skip_serializing_if = "Option::is_none")]
    pub watercourse: Option<String>,
}

impl HydropowerPlant {
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn series_sorts_and_keeps_first_duplicate() {
        let series = Series::from_observations(vec![
            Observation::new(day(2020, 1, 3), 3.0),
            Observation::new(day(2020, 1, 1), 1.0),
            Observation::new(day(2020, 1, 3), 99.0),
            Observation::new(day(2020, 1, 2), 2.0),
        ]);

        let values: Vec<f64> = series.observations().iter().map(|o| o.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert!(
            series
                .observations()
                .windows(2)
                .all(|w| w[0].date < w[1].date)
        );
    }

    #[test]
    fn plant_type_from_german_labels() {
        assert_eq!(
            PlantType::from("Pumpspeicherkraftwerk".to_string()),
            PlantType::PumpedStorage
        );
        assert_eq!(
            PlantType::from("Speicherkraftwerk".to_string()),
            PlantType::Storage
        );
        assert_eq!(
            PlantType::from("Laufkraftwerk".to_string()),
            PlantType::RunOfRiver
        );
        assert_eq!(PlantType::from("Wind".to_string()), PlantType::Other);
    }

    #[test]
    fn trend_outcome_round_trips_with_status_tag() {
        let outcome = TrendOutcome::Rejected {
            reason: RejectReason::ImplausibleTrend,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"status":"rejected","reason":"implausible_trend"}"#);

        let pending: TrendOutcome = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert!(pending.is_pending());
    }

    #[test]
    fn display_label_falls_back_to_unknown() {
        let mut station = Station::new("1".into(), "A".into(), VariableKind::Discharge);
        assert_eq!(station.display_label(), UNKNOWN_LABEL);
        station.label = Some("Donau".into());
        assert_eq!(station.display_label(), "Donau");
    }

    #[test]
    fn plant_deserializes_from_inventory_shape() {
        let plant: HydropowerPlant = serde_json::from_str(
            r#"{"lat": 47.1, "lon": 13.2, "mw": 120.0, "type": "Speicherkraftwerk", "river": "Salzach"}"#,
        )
        .unwrap();
        assert_eq!(plant.plant_type, PlantType::Storage);
        assert_eq!(plant.watercourse.as_deref(), Some("Salzach"));
        assert!((plant.plant_type.impact_weight() - 0.7).abs() < f64::EPSILON);
    }
}
