#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Region, aggregated trend summary and risk score types.
//!
//! A [`Region`] carries one [`RegionSummary`] per variable (produced by the
//! spatial aggregator) and an optional [`RiskScore`] (produced by the risk
//! composer). [`Region::geo_properties`] flattens both into the property
//! map written onto boundary features.

use std::collections::BTreeMap;

use drought_risk_station_models::{GeoPoint, TrendUnit, VariableKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum_macros::{AsRefStr, Display, EnumString};

/// One station's share of a region summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub station_id: String,
    pub distance_km: f64,
    pub weight: f64,
}

/// Distance-weighted summary of one variable's station trends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSummary {
    pub kind: VariableKind,
    /// Unit of `mean_trend`.
    pub unit: TrendUnit,
    pub mean_trend: f64,
    /// Weighted mean of the contributors' long-term mean levels.
    pub mean_magnitude: f64,
    pub station_count: usize,
    /// `true` when no station was in range and the nearest ones were used.
    pub estimated: bool,
    /// Distinct watercourse or area labels, in contributor order.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
}

/// An input to the composite risk score.
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
pub enum Factor {
    Level,
    Discharge,
    Precipitation,
    Sediment,
    Hydropower,
}

impl Factor {
    pub const ALL: &[Self] = &[
        Self::Level,
        Self::Discharge,
        Self::Precipitation,
        Self::Sediment,
        Self::Hydropower,
    ];

    #[must_use]
    pub const fn from_variable(kind: VariableKind) -> Self {
        match kind {
            VariableKind::Level => Self::Level,
            VariableKind::Discharge => Self::Discharge,
            VariableKind::Precipitation => Self::Precipitation,
            VariableKind::Sediment => Self::Sediment,
        }
    }
}

/// Whether a factor value was computed or substituted.
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
pub enum FactorSource {
    Computed,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorRisk {
    /// Risk contribution in `[0, 1]`.
    pub value: f64,
    pub source: FactorSource,
}

/// A named post-composition adjustment and what drove it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedModifier {
    pub name: String,
    pub adjustment: f64,
    #[serde(default)]
    pub diagnostics: BTreeMap<String, f64>,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

/// Composite drought risk for one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub factors: BTreeMap<Factor, FactorRisk>,
    /// Weighted combination of `factors`, before modifiers.
    pub base_score: f64,
    #[serde(default)]
    pub modifiers: Vec<AppliedModifier>,
    /// Final score in `[0, 1]`.
    pub score: f64,
    pub category: RiskCategory,
}

/// An administrative region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub key: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summaries: BTreeMap<VariableKind, RegionSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskScore>,
}

impl Region {
    #[must_use]
    pub const fn new(key: String, name: String, centroid: GeoPoint) -> Self {
        Self {
            key,
            name,
            latitude: centroid.latitude,
            longitude: centroid.longitude,
            summaries: BTreeMap::new(),
            risk: None,
        }
    }

    #[must_use]
    pub const fn centroid(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Flattens summaries and risk into `GeoJSON` feature properties.
    ///
    /// Keys are `<variable>_trend`, `<variable>_stations`, `<factor>_risk`,
    /// `risk_score` and so on; absent summaries produce no keys at all.
    #[must_use]
    pub fn geo_properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert("region_key".into(), Value::from(self.key.clone()));
        props.insert("region_name".into(), Value::from(self.name.clone()));

        for (kind, summary) in &self.summaries {
            let prefix = kind.as_ref();
            props.insert(format!("{prefix}_trend"), Value::from(summary.mean_trend));
            props.insert(format!("{prefix}_trend_unit"), Value::from(summary.unit.as_ref()));
            props.insert(
                format!("{prefix}_magnitude"),
                Value::from(summary.mean_magnitude),
            );
            props.insert(
                format!("{prefix}_stations"),
                Value::from(summary.station_count),
            );
            props.insert(format!("{prefix}_estimated"), Value::from(summary.estimated));
            if !summary.labels.is_empty() {
                props.insert(
                    format!("{prefix}_labels"),
                    Value::from(summary.labels.join(", ")),
                );
            }
        }

        if let Some(risk) = &self.risk {
            props.insert("risk_score".into(), Value::from(risk.score));
            props.insert("risk_base_score".into(), Value::from(risk.base_score));
            props.insert("risk_category".into(), Value::from(risk.category.as_ref()));
            for (factor, value) in &risk.factors {
                props.insert(format!("{factor}_risk"), Value::from(value.value));
            }
            for modifier in &risk.modifiers {
                props.insert(
                    format!("{}_adjustment", modifier.name),
                    Value::from(modifier.adjustment),
                );
                for (name, value) in &modifier.diagnostics {
                    props.insert(format!("{}_{name}", modifier.name), Value::from(*value));
                }
            }
        }

        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(kind: VariableKind) -> RegionSummary {
        RegionSummary {
            kind,
            unit: TrendUnit::Absolute,
            mean_trend: -0.4,
            mean_magnitude: 312.5,
            station_count: 2,
            estimated: false,
            labels: vec!["Mur".into(), "Enns".into()],
            contributors: Vec::new(),
        }
    }

    #[test]
    fn geo_properties_flatten_summaries_and_risk() {
        let mut region = Region::new("AT-6".into(), "Steiermark".into(), GeoPoint::new(47.2, 15.1));
        region
            .summaries
            .insert(VariableKind::Level, summary(VariableKind::Level));
        region.risk = Some(RiskScore {
            factors: BTreeMap::from([(
                Factor::Level,
                FactorRisk {
                    value: 0.9,
                    source: FactorSource::Computed,
                },
            )]),
            base_score: 0.55,
            modifiers: vec![AppliedModifier {
                name: "watercourse_impact".into(),
                adjustment: 0.1,
                diagnostics: BTreeMap::from([("influenced_mw".into(), 250.0)]),
            }],
            score: 0.605,
            category: RiskCategory::High,
        });

        let props = region.geo_properties();
        assert_eq!(props["region_key"], "AT-6");
        assert_eq!(props["level_labels"], "Mur, Enns");
        assert_eq!(props["level_stations"], 2);
        assert_eq!(props["risk_category"], "high");
        assert_eq!(props["level_risk"], 0.9);
        assert_eq!(props["watercourse_impact_influenced_mw"], 250.0);
        assert!(!props.contains_key("discharge_trend"));
    }

    #[test]
    fn region_without_results_serializes_identity_only() {
        let region = Region::new("AT-9".into(), "Wien".into(), GeoPoint::new(48.2, 16.37));
        let json = serde_json::to_value(&region).unwrap();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["key", "latitude", "longitude", "name"]);
    }
}
