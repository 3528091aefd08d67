#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Composite drought risk scoring.
//!
//! Each variable's aggregated trend `t` is clamped to `[-L, +L]` and
//! mapped to a risk of `(L - t) / 2L`, so a strongly falling trend scores
//! 1 and a strongly rising one scores 0. Factor risks are combined with a
//! configured weight vector into a base score, then each [`RiskModifier`]
//! may raise it by a bounded factor. The final score is categorized with
//! inclusive thresholds.

pub mod modifiers;

use std::collections::BTreeMap;

use drought_risk_region_models::{
    AppliedModifier, Factor, FactorRisk, FactorSource, Region, RiskCategory, RiskScore,
};
use drought_risk_spatial::haversine_km;
use drought_risk_station_models::{GeoPoint, HydropowerPlant, Station, VariableKind};
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumString};

pub use modifiers::{ModifierEffect, RiskModifier, WatercourseImpact, WatercourseImpactConfig};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Errors in a scoring configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("Factor weights sum to {sum}, expected 1")]
    WeightSum { sum: f64 },

    #[error("Weight for {factor} is negative ({weight})")]
    NegativeWeight { factor: Factor, weight: f64 },

    #[error("Thresholds must satisfy 0 <= medium ({medium}) <= high ({high}) <= 1")]
    InvalidThresholds { medium: f64, high: f64 },

    #[error("Risk limit for {kind} must be positive, got {limit}")]
    InvalidLimit { kind: VariableKind, limit: f64 },

    #[error("Neutral risk must be within [0, 1], got {0}")]
    InvalidNeutral(f64),

    #[error("{factor} has weight {weight} but no risk limit")]
    MissingLimit { factor: Factor, weight: f64 },

    #[error("{setting} must be {requirement}, got {value}")]
    InvalidParameter {
        setting: &'static str,
        requirement: &'static str,
        value: f64,
    },
}

fn require_positive(setting: &'static str, value: f64) -> Result<(), ScoringError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ScoringError::InvalidParameter {
            setting,
            requirement: "positive",
            value,
        })
    }
}

fn require_non_negative(setting: &'static str, value: f64) -> Result<(), ScoringError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ScoringError::InvalidParameter {
            setting,
            requirement: "non-negative",
            value,
        })
    }
}

/// What to do with a factor that has no value for a region.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MissingPolicy {
    /// Substitute the neutral risk.
    #[default]
    Neutral,
    /// Drop the factor and rescale the remaining weights.
    Renormalize,
}

/// Inclusive lower bounds of the medium and high categories.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high: 0.6,
            medium: 0.4,
        }
    }
}

/// Hydropower pressure factor settings.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct HydropowerConfig {
    pub radius_km: f64,
    /// Weighted capacity that saturates the factor at 1.
    pub capacity_scale_mw: f64,
}

impl Default for HydropowerConfig {
    fn default() -> Self {
        Self {
            radius_km: 30.0,
            capacity_scale_mw: 500.0,
        }
    }
}

fn default_weights() -> BTreeMap<Factor, f64> {
    BTreeMap::from([
        (Factor::Level, 0.35),
        (Factor::Hydropower, 0.25),
        (Factor::Precipitation, 0.25),
        (Factor::Discharge, 0.15),
        (Factor::Sediment, 0.0),
    ])
}

fn default_limits() -> BTreeMap<VariableKind, f64> {
    BTreeMap::from([
        (VariableKind::Level, 0.5),
        (VariableKind::Discharge, 20.0),
        (VariableKind::Precipitation, 100.0),
        (VariableKind::Sediment, 50.0),
    ])
}

const fn default_neutral() -> f64 {
    0.5
}

/// Scoring settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScoringConfig {
    /// Factor weights; must be non-negative and sum to 1.
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<Factor, f64>,
    /// Trend magnitude `L` that maps to risk 0 or 1, in the summary unit.
    #[serde(default = "default_limits")]
    pub risk_limits: BTreeMap<VariableKind, f64>,
    #[serde(default)]
    pub missing: MissingPolicy,
    #[serde(default = "default_neutral")]
    pub neutral_risk: f64,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub hydropower: HydropowerConfig,
    #[serde(default)]
    pub watercourse_impact: WatercourseImpactConfig,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
            risk_limits: default_limits(),
            missing: MissingPolicy::default(),
            neutral_risk: default_neutral(),
            thresholds: Thresholds::default(),
            hydropower: HydropowerConfig::default(),
            watercourse_impact: WatercourseImpactConfig::default(),
        }
    }
}

impl ScoringConfig {
    /// Checks weights, limits, thresholds and the hydropower and modifier
    /// parameters.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ScoringError> {
        for (&factor, &weight) in &self.weights {
            if weight < 0.0 || !weight.is_finite() {
                return Err(ScoringError::NegativeWeight { factor, weight });
            }
        }
        let sum: f64 = self.weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ScoringError::WeightSum { sum });
        }

        for (&kind, &limit) in &self.risk_limits {
            if limit <= 0.0 || !limit.is_finite() {
                return Err(ScoringError::InvalidLimit { kind, limit });
            }
        }
        for &kind in VariableKind::ALL {
            let factor = Factor::from_variable(kind);
            let weight = self.weight(factor);
            if weight > 0.0 && !self.risk_limits.contains_key(&kind) {
                return Err(ScoringError::MissingLimit { factor, weight });
            }
        }

        let Thresholds { high, medium } = self.thresholds;
        if !(0.0..=1.0).contains(&medium) || !(0.0..=1.0).contains(&high) || medium > high {
            return Err(ScoringError::InvalidThresholds { medium, high });
        }

        if !(0.0..=1.0).contains(&self.neutral_risk) {
            return Err(ScoringError::InvalidNeutral(self.neutral_risk));
        }

        require_positive("hydropower.radius_km", self.hydropower.radius_km)?;
        require_positive(
            "hydropower.capacity_scale_mw",
            self.hydropower.capacity_scale_mw,
        )?;
        self.watercourse_impact.validate()
    }

    #[must_use]
    pub fn weight(&self, factor: Factor) -> f64 {
        self.weights.get(&factor).copied().unwrap_or(0.0)
    }

    /// The configured modifier stages, in application order.
    #[must_use]
    pub fn modifiers(&self) -> Vec<Box<dyn RiskModifier>> {
        let mut stages: Vec<Box<dyn RiskModifier>> = Vec::new();
        if self.watercourse_impact.enabled {
            stages.push(Box::new(WatercourseImpact::new(self.watercourse_impact)));
        }
        stages
    }
}

/// External data the scorer reads besides the region itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringContext<'a> {
    /// `None` when no plant inventory is configured.
    pub plants: Option<&'a [HydropowerPlant]>,
    /// Sediment stations, for modifiers that look at shared watercourses.
    pub sediment_stations: &'a [Station],
}

/// Maps a trend onto `[0, 1]`: `-limit` → 1, `+limit` → 0.
#[must_use]
pub fn variable_risk(trend: f64, limit: f64) -> f64 {
    let t = trend.clamp(-limit, limit);
    (limit - t) / (2.0 * limit)
}

/// Hydropower pressure around `centroid`.
///
/// Each plant within the radius contributes
/// `capacity · type weight · (1 - d / radius)`; the sum is scaled by
/// `capacity_scale_mw` and capped at 1.
#[must_use]
pub fn hydropower_factor(
    centroid: GeoPoint,
    plants: &[HydropowerPlant],
    config: &HydropowerConfig,
) -> f64 {
    let pressure: f64 = plants
        .iter()
        .filter_map(|plant| {
            let d = haversine_km(centroid, plant.point());
            (d <= config.radius_km).then(|| {
                plant.capacity_mw * plant.plant_type.impact_weight() * (1.0 - d / config.radius_km)
            })
        })
        .sum();
    (pressure / config.capacity_scale_mw).clamp(0.0, 1.0)
}

/// Assigns the category; thresholds are inclusive.
#[must_use]
pub fn categorize(score: f64, thresholds: &Thresholds) -> RiskCategory {
    if score >= thresholds.high {
        RiskCategory::High
    } else if score >= thresholds.medium {
        RiskCategory::Medium
    } else {
        RiskCategory::Low
    }
}

/// Raw factor values of `region`; `None` marks a missing factor.
#[must_use]
pub fn factor_values(
    region: &Region,
    context: &ScoringContext<'_>,
    config: &ScoringConfig,
) -> BTreeMap<Factor, Option<f64>> {
    let mut values = BTreeMap::new();

    for &kind in VariableKind::ALL {
        let value = region.summaries.get(&kind).and_then(|summary| {
            let Some(limit) = config.risk_limits.get(&kind) else {
                log::warn!(
                    "{}: {kind} summary ignored, no risk limit configured",
                    region.key
                );
                return None;
            };
            Some(variable_risk(summary.mean_trend, *limit))
        });
        values.insert(Factor::from_variable(kind), value);
    }

    values.insert(
        Factor::Hydropower,
        context
            .plants
            .map(|plants| hydropower_factor(region.centroid(), plants, &config.hydropower)),
    );

    values
}

/// Combines factor values into `(recorded factors, base score)`.
#[must_use]
pub fn compose(
    values: &BTreeMap<Factor, Option<f64>>,
    config: &ScoringConfig,
) -> (BTreeMap<Factor, FactorRisk>, f64) {
    let mut factors = BTreeMap::new();
    let mut weighted = 0.0;
    let mut used_weight = 0.0;

    for &factor in Factor::ALL {
        let weight = config.weight(factor);
        match values.get(&factor).copied().flatten() {
            Some(value) => {
                factors.insert(
                    factor,
                    FactorRisk {
                        value,
                        source: FactorSource::Computed,
                    },
                );
                weighted += weight * value;
                used_weight += weight;
            }
            None => match config.missing {
                MissingPolicy::Neutral => {
                    factors.insert(
                        factor,
                        FactorRisk {
                            value: config.neutral_risk,
                            source: FactorSource::Neutral,
                        },
                    );
                    weighted += weight * config.neutral_risk;
                    used_weight += weight;
                }
                MissingPolicy::Renormalize => {}
            },
        }
    }

    let base = if used_weight > 0.0 {
        weighted / used_weight
    } else {
        config.neutral_risk
    };
    (factors, base.clamp(0.0, 1.0))
}

/// Scores one region.
#[must_use]
pub fn score_region(
    region: &Region,
    context: &ScoringContext<'_>,
    config: &ScoringConfig,
    modifiers: &[Box<dyn RiskModifier>],
) -> RiskScore {
    let values = factor_values(region, context, config);
    let (factors, base_score) = compose(&values, config);

    let mut score = base_score;
    let mut applied: Vec<AppliedModifier> = Vec::new();
    for modifier in modifiers {
        if let Some(effect) = modifier.evaluate(region, context) {
            score = (score * (1.0 + effect.adjustment)).min(1.0);
            applied.push(AppliedModifier {
                name: modifier.name().to_string(),
                adjustment: effect.adjustment,
                diagnostics: effect.diagnostics,
            });
        }
    }

    RiskScore {
        factors,
        base_score,
        modifiers: applied,
        score,
        category: categorize(score, &config.thresholds),
    }
}

/// Scores every region in place.
pub fn score_regions(regions: &mut [Region], context: &ScoringContext<'_>, config: &ScoringConfig) {
    let modifiers = config.modifiers();
    let mut counts: BTreeMap<RiskCategory, usize> = BTreeMap::new();

    for region in regions.iter_mut() {
        let risk = score_region(region, context, config, &modifiers);
        log::debug!(
            "{} ({}): base {:.3}, score {:.3}, {}",
            region.key,
            region.name,
            risk.base_score,
            risk.score,
            risk.category
        );
        *counts.entry(risk.category).or_default() += 1;
        region.risk = Some(risk);
    }

    log::info!(
        "Scored {} regions: {} high, {} medium, {} low",
        regions.len(),
        counts.get(&RiskCategory::High).unwrap_or(&0),
        counts.get(&RiskCategory::Medium).unwrap_or(&0),
        counts.get(&RiskCategory::Low).unwrap_or(&0)
    );
}

#[cfg(test)]
mod tests {
    use drought_risk_region_models::RegionSummary;
    use drought_risk_station_models::{PlantType, TrendUnit};

    use super::*;

    fn summary(kind: VariableKind, mean_trend: f64) -> RegionSummary {
        RegionSummary {
            kind,
            unit: TrendUnit::Absolute,
            mean_trend,
            mean_magnitude: 1.0,
            station_count: 1,
            estimated: false,
            labels: Vec::new(),
            contributors: Vec::new(),
        }
    }

    fn region() -> Region {
        Region::new("AT-3".into(), "Niederösterreich".into(), GeoPoint::new(48.2, 15.6))
    }

    fn config_without_modifiers() -> ScoringConfig {
        let mut config = ScoringConfig::default();
        config.watercourse_impact.enabled = false;
        config
    }

    #[test]
    fn variable_risk_maps_limits_to_bounds() {
        assert!((variable_risk(-2.0, 2.0) - 1.0).abs() < f64::EPSILON);
        assert!(variable_risk(2.0, 2.0).abs() < f64::EPSILON);
        assert!((variable_risk(0.0, 2.0) - 0.5).abs() < f64::EPSILON);
        assert!((variable_risk(-50.0, 2.0) - 1.0).abs() < f64::EPSILON);
        assert!(variable_risk(50.0, 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn falling_level_trend_scores_above_half() {
        // -3.08 per decade clamped to -2 against a limit of 2.
        let risk = variable_risk(-440.0 / 143.0, 2.0);
        assert!(risk > 0.5);
        assert!((risk - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let thresholds = Thresholds::default();
        assert_eq!(categorize(0.6, &thresholds), RiskCategory::High);
        assert_eq!(categorize(0.599_999, &thresholds), RiskCategory::Medium);
        assert_eq!(categorize(0.4, &thresholds), RiskCategory::Medium);
        assert_eq!(categorize(0.399_999, &thresholds), RiskCategory::Low);
    }

    #[test]
    fn neutral_policy_fills_missing_factors() {
        let mut region = region();
        region
            .summaries
            .insert(VariableKind::Level, summary(VariableKind::Level, -0.5));
        let config = config_without_modifiers();

        let risk = score_region(&region, &ScoringContext::default(), &config, &[]);
        // level 1.0 at 0.35, everything else neutral 0.5 at 0.65.
        assert!((risk.base_score - 0.675).abs() < 1e-12);
        assert_eq!(risk.category, RiskCategory::High);
        assert_eq!(risk.factors[&Factor::Level].source, FactorSource::Computed);
        assert_eq!(risk.factors[&Factor::Hydropower].source, FactorSource::Neutral);
    }

    #[test]
    fn renormalize_policy_rescales_present_weights() {
        let mut region = region();
        region
            .summaries
            .insert(VariableKind::Level, summary(VariableKind::Level, -0.5));
        region.summaries.insert(
            VariableKind::Precipitation,
            summary(VariableKind::Precipitation, 100.0),
        );
        let config = ScoringConfig {
            missing: MissingPolicy::Renormalize,
            ..config_without_modifiers()
        };

        let risk = score_region(&region, &ScoringContext::default(), &config, &[]);
        // (0.35 * 1 + 0.25 * 0) / 0.6
        assert!((risk.base_score - 0.35 / 0.6).abs() < 1e-12);
        assert_eq!(risk.factors.len(), 2);
    }

    #[test]
    fn renormalize_with_nothing_present_is_neutral() {
        let config = ScoringConfig {
            missing: MissingPolicy::Renormalize,
            ..config_without_modifiers()
        };
        let risk = score_region(&region(), &ScoringContext::default(), &config, &[]);
        assert!((risk.score - 0.5).abs() < f64::EPSILON);
        assert!(risk.factors.is_empty());
    }

    #[test]
    fn score_stays_in_unit_interval() {
        for level in [-10.0, -0.5, 0.0, 0.5, 10.0] {
            for precip in [-500.0, 0.0, 500.0] {
                let mut region = region();
                region
                    .summaries
                    .insert(VariableKind::Level, summary(VariableKind::Level, level));
                region.summaries.insert(
                    VariableKind::Precipitation,
                    summary(VariableKind::Precipitation, precip),
                );
                let risk = score_region(
                    &region,
                    &ScoringContext::default(),
                    &ScoringConfig::default(),
                    &ScoringConfig::default().modifiers(),
                );
                assert!((0.0..=1.0).contains(&risk.score));
                assert!((0.0..=1.0).contains(&risk.base_score));
            }
        }
    }

    #[test]
    fn hydropower_factor_decays_with_distance_and_saturates() {
        let centroid = GeoPoint::new(47.0, 14.0);
        let plant = |lat: f64, mw: f64, plant_type: PlantType| HydropowerPlant {
            name: None,
            latitude: lat,
            longitude: 14.0,
            capacity_mw: mw,
            plant_type,
            watercourse: None,
        };
        let config = HydropowerConfig::default();

        let at_centroid = [plant(47.0, 500.0, PlantType::Storage)];
        assert!((hydropower_factor(centroid, &at_centroid, &config) - 0.7).abs() < 1e-12);

        let outside = [plant(48.0, 5000.0, PlantType::Storage)];
        assert!(hydropower_factor(centroid, &outside, &config).abs() < f64::EPSILON);

        let huge = [plant(47.0, 100_000.0, PlantType::RunOfRiver)];
        assert!((hydropower_factor(centroid, &huge, &config) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn plants_present_make_hydropower_computed() {
        let plants: Vec<HydropowerPlant> = Vec::new();
        let context = ScoringContext {
            plants: Some(&plants),
            sediment_stations: &[],
        };
        let values = factor_values(&region(), &context, &ScoringConfig::default());
        assert_eq!(values[&Factor::Hydropower], Some(0.0));
        assert_eq!(values[&Factor::Level], None);
    }

    #[test]
    fn validation_rejects_bad_weights_and_thresholds() {
        let mut config = ScoringConfig::default();
        assert!(config.validate().is_ok());

        config.weights.insert(Factor::Sediment, 0.1);
        assert!(matches!(config.validate(), Err(ScoringError::WeightSum { .. })));

        let mut config = ScoringConfig::default();
        config.weights.insert(Factor::Sediment, -0.1);
        config.weights.insert(Factor::Level, 0.45);
        assert!(matches!(
            config.validate(),
            Err(ScoringError::NegativeWeight { factor: Factor::Sediment, .. })
        ));

        let mut config = ScoringConfig::default();
        config.thresholds = Thresholds {
            high: 0.3,
            medium: 0.5,
        };
        assert!(matches!(
            config.validate(),
            Err(ScoringError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn validation_rejects_hydropower_parameters_that_divide_by_zero() {
        let mut config = ScoringConfig::default();
        config.hydropower.radius_km = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ScoringError::InvalidParameter {
                setting: "hydropower.radius_km",
                ..
            })
        ));

        let mut config = ScoringConfig::default();
        config.hydropower.capacity_scale_mw = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ScoringError::InvalidParameter {
                setting: "hydropower.capacity_scale_mw",
                ..
            })
        ));
    }

    #[test]
    fn validation_rejects_watercourse_impact_parameters() {
        let cases: [(&str, fn(&mut WatercourseImpactConfig)); 5] = [
            ("watercourse_impact.radius_km", |c: &mut WatercourseImpactConfig| {
                c.radius_km = 0.0;
            }),
            ("watercourse_impact.capacity_scale_mw", |c: &mut WatercourseImpactConfig| {
                c.capacity_scale_mw = 0.0;
            }),
            ("watercourse_impact.max_adjustment", |c: &mut WatercourseImpactConfig| {
                c.max_adjustment = -0.1;
            }),
            ("watercourse_impact.hydro_coefficient", |c: &mut WatercourseImpactConfig| {
                c.hydro_coefficient = -1.0;
            }),
            ("watercourse_impact.sediment_coefficient", |c: &mut WatercourseImpactConfig| {
                c.sediment_coefficient = f64::NAN;
            }),
        ];

        for (expected, break_it) in cases {
            let mut config = ScoringConfig::default();
            break_it(&mut config.watercourse_impact);
            match config.validate() {
                Err(ScoringError::InvalidParameter { setting, .. }) => assert_eq!(setting, expected),
                other => panic!("{expected}: expected rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn validation_requires_limits_for_weighted_variables() {
        let mut config = ScoringConfig::default();
        config.risk_limits.remove(&VariableKind::Sediment);
        assert!(config.validate().is_ok());

        config.risk_limits.remove(&VariableKind::Precipitation);
        assert!(matches!(
            config.validate(),
            Err(ScoringError::MissingLimit {
                factor: Factor::Precipitation,
                ..
            })
        ));
    }

    #[test]
    fn validation_rejects_nan_weights() {
        let mut config = ScoringConfig::default();
        config.weights.insert(Factor::Sediment, f64::NAN);
        assert!(matches!(
            config.validate(),
            Err(ScoringError::NegativeWeight { factor: Factor::Sediment, .. })
        ));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ScoringConfig = toml::de::from_str(
            "missing = \"renormalize\"\n\n[weights]\nlevel = 0.5\ndischarge = 0.5\n",
        )
        .unwrap();
        assert_eq!(config.missing, MissingPolicy::Renormalize);
        assert!((config.weight(Factor::Hydropower)).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
        assert!((config.thresholds.high - 0.6).abs() < f64::EPSILON);
    }
}
