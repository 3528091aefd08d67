//! Post-composition modifier stages.
//!
//! A modifier looks at a region and its context and may return a
//! [`ModifierEffect`] whose adjustment `a` raises the score to
//! `min(1, score · (1 + a))`. Adjustments are bounded per modifier. The
//! scorer records each effect under the modifier's name.

use std::collections::BTreeMap;

use drought_risk_region_models::Region;
use drought_risk_spatial::haversine_km;
use drought_risk_station_models::VariableKind;
use serde::Deserialize;

use crate::{ScoringContext, ScoringError, require_non_negative, require_positive};

/// What a modifier found for one region.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierEffect {
    pub adjustment: f64,
    pub diagnostics: BTreeMap<String, f64>,
}

/// A named adjustment applied after base composition.
pub trait RiskModifier: Send + Sync {
    /// Name recorded on the region's risk score.
    fn name(&self) -> &str;

    /// Returns `None` when the modifier does not apply to `region`.
    fn evaluate(&self, region: &Region, context: &ScoringContext<'_>) -> Option<ModifierEffect>;
}

/// Settings for [`WatercourseImpact`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatercourseImpactConfig {
    pub enabled: bool,
    /// Plants farther than this from the centroid are ignored.
    pub radius_km: f64,
    /// Upper bound of the adjustment.
    pub max_adjustment: f64,
    pub hydro_coefficient: f64,
    /// Influenced capacity at which the hydro term saturates.
    pub capacity_scale_mw: f64,
    pub sediment_coefficient: f64,
}

impl Default for WatercourseImpactConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_km: 50.0,
            max_adjustment: 0.2,
            hydro_coefficient: 0.1,
            capacity_scale_mw: 500.0,
            sediment_coefficient: 0.2,
        }
    }
}

impl WatercourseImpactConfig {
    /// Checks that radii and scales are positive and that the bound and
    /// coefficients are non-negative.
    ///
    /// # Errors
    ///
    /// Returns [`ScoringError::InvalidParameter`] for the first bad value.
    pub fn validate(&self) -> Result<(), ScoringError> {
        require_positive("watercourse_impact.radius_km", self.radius_km)?;
        require_positive(
            "watercourse_impact.capacity_scale_mw",
            self.capacity_scale_mw,
        )?;
        require_non_negative("watercourse_impact.max_adjustment", self.max_adjustment)?;
        require_non_negative(
            "watercourse_impact.hydro_coefficient",
            self.hydro_coefficient,
        )?;
        require_non_negative(
            "watercourse_impact.sediment_coefficient",
            self.sediment_coefficient,
        )
    }
}

/// Raises risk for regions whose gauged rivers carry hydropower or a
/// falling sediment load.
///
/// The rivers are the watercourse labels of the region's discharge
/// summary. Influenced capacity is the capacity of nearby plants on those
/// rivers; the sediment trend is the mean relative trend of sediment
/// stations on those rivers.
#[derive(Debug, Clone, Copy)]
pub struct WatercourseImpact {
    config: WatercourseImpactConfig,
}

impl WatercourseImpact {
    pub const NAME: &str = "watercourse_impact";

    #[must_use]
    pub const fn new(config: WatercourseImpactConfig) -> Self {
        Self { config }
    }
}

fn same_watercourse(labels: &[String], candidate: Option<&str>) -> bool {
    candidate.is_some_and(|c| {
        let c = c.trim();
        labels.iter().any(|l| l.trim().eq_ignore_ascii_case(c))
    })
}

impl RiskModifier for WatercourseImpact {
    fn name(&self) -> &str {
        Self::NAME
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate(&self, region: &Region, context: &ScoringContext<'_>) -> Option<ModifierEffect> {
        let labels = &region.summaries.get(&VariableKind::Discharge)?.labels;
        if labels.is_empty() {
            return None;
        }

        let centroid = region.centroid();
        let plants: Vec<_> = context
            .plants
            .unwrap_or_default()
            .iter()
            .filter(|p| same_watercourse(labels, p.watercourse.as_deref()))
            .filter(|p| haversine_km(centroid, p.point()) <= self.config.radius_km)
            .collect();
        let influenced_mw: f64 = plants.iter().map(|p| p.capacity_mw).sum();

        let sediment: Vec<f64> = context
            .sediment_stations
            .iter()
            .filter(|s| same_watercourse(labels, s.label.as_deref()))
            .filter_map(|s| s.trend.trend().map(|t| t.relative_slope_pct))
            .collect();
        let sediment_trend_pct =
            (!sediment.is_empty()).then(|| sediment.iter().sum::<f64>() / sediment.len() as f64);

        let hydro_term =
            self.config.hydro_coefficient * (influenced_mw / self.config.capacity_scale_mw).min(1.0);
        let sediment_term = self.config.sediment_coefficient
            * sediment_trend_pct.map_or(0.0, |pct| (-pct / 100.0).max(0.0));
        let adjustment = (hydro_term + sediment_term).clamp(0.0, self.config.max_adjustment);

        let mut diagnostics = BTreeMap::from([
            ("influenced_mw".to_string(), influenced_mw),
            ("matched_plants".to_string(), plants.len() as f64),
        ]);
        if let Some(pct) = sediment_trend_pct {
            diagnostics.insert("sediment_trend_pct".to_string(), pct);
        }

        Some(ModifierEffect {
            adjustment,
            diagnostics,
        })
    }
}
