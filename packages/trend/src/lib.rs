#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Decadal trend estimation.
//!
//! [`estimate`] turns a cleaned [`Series`] into a [`TrendOutcome`]:
//!
//! 1. Sample-size floor on the raw series.
//! 2. Optional 3×IQR rejection of raw points (floor re-checked).
//! 3. Resampling to annual means or sums, dropping under-covered years.
//! 4. Optional removal of implausible annual values.
//! 5. Minimum year count, then 2σ rejection of annual values (minimum
//!    re-checked).
//! 6. OLS slope against calendar year, scaled to a decade.
//! 7. Plausibility gates on the long-term mean and the trend magnitude.
//!
//! The same estimator serves every variable; behavior differs only
//! through [`TrendConfig`].

pub mod stats;

use std::collections::BTreeMap;

use chrono::Datelike;
use drought_risk_station_models::{
    RejectReason, Series, Trend, TrendOutcome, TrendUnit, VariableKind,
};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// How daily values are folded into one value per year.
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
pub enum AnnualStatistic {
    Mean,
    Sum,
}

/// Inclusive range of plausible values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibleRange {
    pub min: f64,
    pub max: f64,
}

impl PlausibleRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Per-variable estimator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Minimum raw observations.
    pub min_observations: usize,
    /// Minimum qualifying years.
    pub min_years: usize,
    /// Minimum observations for a year to qualify.
    pub min_points_per_year: usize,
    pub statistic: AnnualStatistic,
    /// Range the long-term mean must fall in.
    pub plausible_mean: PlausibleRange,
    /// Largest accepted |trend| per decade, in `trend_unit`.
    pub max_decadal_trend: f64,
    #[serde(default)]
    pub trend_unit: TrendUnit,
    /// Reject raw points outside `[Q1 - 3·IQR, Q3 + 3·IQR]`.
    #[serde(default)]
    pub iqr_filter: bool,
    /// Drop annual values outside `plausible_mean` before fitting.
    #[serde(default)]
    pub drop_implausible_years: bool,
}

impl TrendConfig {
    /// Defaults for `kind`.
    #[must_use]
    pub const fn for_kind(kind: VariableKind) -> Self {
        match kind {
            VariableKind::Level => Self {
                min_observations: 60,
                min_years: 5,
                min_points_per_year: 10,
                statistic: AnnualStatistic::Mean,
                plausible_mean: PlausibleRange::new(0.0, 3000.0),
                max_decadal_trend: 2.0,
                trend_unit: TrendUnit::Absolute,
                iqr_filter: true,
                drop_implausible_years: false,
            },
            VariableKind::Discharge => Self {
                min_observations: 3000,
                min_years: 10,
                min_points_per_year: 300,
                statistic: AnnualStatistic::Mean,
                plausible_mean: PlausibleRange::new(0.0, 100_000.0),
                max_decadal_trend: 20.0,
                trend_unit: TrendUnit::Percent,
                iqr_filter: false,
                drop_implausible_years: false,
            },
            VariableKind::Precipitation => Self {
                min_observations: 3000,
                min_years: 10,
                min_points_per_year: 300,
                statistic: AnnualStatistic::Sum,
                plausible_mean: PlausibleRange::new(100.0, 5000.0),
                max_decadal_trend: 500.0,
                trend_unit: TrendUnit::Absolute,
                iqr_filter: false,
                drop_implausible_years: true,
            },
            VariableKind::Sediment => Self {
                min_observations: 1500,
                min_years: 6,
                min_points_per_year: 250,
                statistic: AnnualStatistic::Mean,
                plausible_mean: PlausibleRange::new(0.0, 10_000_000.0),
                max_decadal_trend: 100.0,
                trend_unit: TrendUnit::Percent,
                iqr_filter: false,
                drop_implausible_years: false,
            },
        }
    }
}

/// One qualifying year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnualAggregate {
    pub year: i32,
    pub statistic: f64,
    pub sample_count: usize,
}

/// Estimates the decadal trend of `series`.
#[must_use]
pub fn estimate(series: &Series, config: &TrendConfig) -> TrendOutcome {
    match try_estimate(series, config) {
        Ok(trend) => TrendOutcome::Accepted(trend),
        Err(reason) => TrendOutcome::Rejected { reason },
    }
}

fn try_estimate(series: &Series, config: &TrendConfig) -> Result<Trend, RejectReason> {
    if series.len() < config.min_observations {
        return Err(RejectReason::TooFewObservations);
    }

    let series = if config.iqr_filter {
        let filtered = iqr_filter(series);
        if filtered.len() < config.min_observations {
            return Err(RejectReason::TooFewObservations);
        }
        filtered
    } else {
        series.clone()
    };

    let mut annual = annual_aggregates(&series, config);
    if config.drop_implausible_years {
        annual.retain(|a| config.plausible_mean.contains(a.statistic));
    }
    if annual.len() < config.min_years {
        return Err(RejectReason::InsufficientCoverage);
    }

    let annual = sigma_filter(annual);
    if annual.len() < config.min_years {
        return Err(RejectReason::InsufficientCoverage);
    }

    let trend = fit(&annual).ok_or(RejectReason::InsufficientCoverage)?;

    if !config.plausible_mean.contains(trend.mean_level) {
        return Err(RejectReason::ImplausibleMean);
    }
    if trend.value_in(config.trend_unit).abs() > config.max_decadal_trend {
        return Err(RejectReason::ImplausibleTrend);
    }

    Ok(trend)
}

/// Folds `series` into one value per qualifying year, in year order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn annual_aggregates(series: &Series, config: &TrendConfig) -> Vec<AnnualAggregate> {
    let mut by_year: BTreeMap<i32, (f64, usize)> = BTreeMap::new();
    for obs in series.observations() {
        let entry = by_year.entry(obs.date.year()).or_insert((0.0, 0));
        entry.0 += obs.value;
        entry.1 += 1;
    }

    by_year
        .into_iter()
        .filter(|(_, (_, count))| *count >= config.min_points_per_year)
        .map(|(year, (sum, count))| AnnualAggregate {
            year,
            statistic: match config.statistic {
                AnnualStatistic::Mean => sum / count as f64,
                AnnualStatistic::Sum => sum,
            },
            sample_count: count,
        })
        .collect()
}

fn iqr_filter(series: &Series) -> Series {
    let mut values: Vec<f64> = series.observations().iter().map(|o| o.value).collect();
    values.sort_by(f64::total_cmp);

    let (Some(q1), Some(q3)) = (
        stats::quantile_sorted(&values, 0.25),
        stats::quantile_sorted(&values, 0.75),
    ) else {
        return series.clone();
    };
    let iqr = q3 - q1;
    if iqr <= 0.0 {
        return series.clone();
    }

    let lower = 3.0f64.mul_add(-iqr, q1);
    let upper = 3.0f64.mul_add(iqr, q3);
    series.filtered(|o| (lower..=upper).contains(&o.value))
}

/// Keeps years strictly within two population standard deviations of the
/// mean. A series without spread is returned unchanged.
fn sigma_filter(annual: Vec<AnnualAggregate>) -> Vec<AnnualAggregate> {
    let values: Vec<f64> = annual.iter().map(|a| a.statistic).collect();
    let (Some(mean), Some(std)) = (stats::mean(&values), stats::population_std(&values)) else {
        return annual;
    };
    if std <= 0.0 {
        return annual;
    }
    annual
        .into_iter()
        .filter(|a| (a.statistic - mean).abs() < 2.0 * std)
        .collect()
}

fn fit(annual: &[AnnualAggregate]) -> Option<Trend> {
    let first = annual.first()?;
    let last = annual.last()?;

    let points: Vec<(f64, f64)> = annual
        .iter()
        .map(|a| (f64::from(a.year), a.statistic))
        .collect();
    let values: Vec<f64> = annual.iter().map(|a| a.statistic).collect();

    let mean_level = stats::mean(&values)?;
    let slope_per_decade = stats::ols_slope(&points) * 10.0;
    let relative_slope_pct = if mean_level > 0.0 {
        slope_per_decade / mean_level * 100.0
    } else {
        0.0
    };

    Some(Trend {
        slope_per_decade,
        relative_slope_pct,
        significance: stats::mann_kendall_p(&values),
        mean_level,
        current_level: last.statistic,
        year_count: annual.len(),
        first_year: first.year,
        last_year: last.year,
        span_years: last.year - first.year,
    })
}
