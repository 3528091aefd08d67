//! Pipeline configuration.
//!
//! One TOML document configures every stage:
//!
//! ```toml
//! [state]
//! dir = "data/state"
//!
//! [regions]
//! path = "data/bundeslaender.geojson"
//! key_property = "iso"
//!
//! [transform]
//! type = "linear"
//!
//! [correction]
//! type = "external_command"
//! program = "cs2cs"
//!
//! [variables.level]
//! records_dir = "data/grundwasser"
//! listing = "data/messstellen_gw.csv"
//!
//! [variables.discharge]
//! records_dir = "data/owf"
//! listing = "data/messstellen_owf.csv"
//! search = { radius_km = 30.0 }
//!
//! [scoring.weights]
//! level = 0.35
//! hydropower = 0.25
//! precipitation = 0.25
//! discharge = 0.15
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use drought_risk_parser::{ListingColumns, ParseOptions};
use drought_risk_registry::{BoundingBox, TransformConfig};
use drought_risk_scoring::ScoringConfig;
use drought_risk_spatial::{RegionSource, SearchConfig};
use drought_risk_station_models::VariableKind;
use drought_risk_trend::TrendConfig;
use serde::Deserialize;

use crate::PipelineError;

/// Where persisted collections live.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("state"),
        }
    }
}

impl StateConfig {
    #[must_use]
    pub fn stations_path(&self, kind: VariableKind) -> PathBuf {
        self.dir.join(format!("stations_{kind}.json"))
    }

    #[must_use]
    pub fn regions_path(&self) -> PathBuf {
        self.dir.join("regions.json")
    }

    /// Boundary collection with region properties attached.
    #[must_use]
    pub fn annotated_path(&self) -> PathBuf {
        self.dir.join("regions.geojson")
    }

    /// Located stations of `kind` as points.
    #[must_use]
    pub fn station_features_path(&self, kind: VariableKind) -> PathBuf {
        self.dir.join(format!("stations_{kind}.geojson"))
    }
}

/// Inputs and estimator settings of one variable.
///
/// Every section is optional; missing ones fall back to the built-in
/// defaults for the variable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableConfig {
    /// Directory of per-station record files.
    #[serde(default)]
    pub records_dir: Option<PathBuf>,
    #[serde(default = "default_record_extension")]
    pub record_extension: String,
    /// Station metadata listing.
    #[serde(default)]
    pub listing: Option<PathBuf>,
    #[serde(default)]
    pub columns: Option<ListingColumns>,
    #[serde(default)]
    pub parse: Option<ParseOptions>,
    #[serde(default)]
    pub trend: Option<TrendConfig>,
    #[serde(default)]
    pub search: Option<SearchConfig>,
}

fn default_record_extension() -> String {
    "csv".to_string()
}

impl Default for VariableConfig {
    fn default() -> Self {
        Self {
            records_dir: None,
            record_extension: default_record_extension(),
            listing: None,
            columns: None,
            parse: None,
            trend: None,
            search: None,
        }
    }
}

impl VariableConfig {
    #[must_use]
    pub fn columns(&self, kind: VariableKind) -> ListingColumns {
        self.columns.clone().unwrap_or_else(|| match kind {
            VariableKind::Level => ListingColumns::groundwater(),
            _ => ListingColumns::surface_water(),
        })
    }

    #[must_use]
    pub fn parse_options(&self, kind: VariableKind) -> ParseOptions {
        self.parse
            .clone()
            .unwrap_or_else(|| ParseOptions::for_kind(kind))
    }

    #[must_use]
    pub fn trend_config(&self, kind: VariableKind) -> TrendConfig {
        self.trend
            .clone()
            .unwrap_or_else(|| TrendConfig::for_kind(kind))
    }

    #[must_use]
    pub fn search_config(&self, kind: VariableKind) -> SearchConfig {
        self.search.unwrap_or_else(|| {
            SearchConfig::with_radius(match kind {
                VariableKind::Level => 25.0,
                VariableKind::Discharge | VariableKind::Precipitation => 30.0,
                VariableKind::Sediment => 50.0,
            })
        })
    }
}

/// Configuration threaded through every stage.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub state: StateConfig,
    /// Region boundaries.
    pub regions: RegionSource,
    #[serde(default)]
    pub variables: BTreeMap<VariableKind, VariableConfig>,
    /// Transform for initial station locations.
    #[serde(default)]
    pub transform: TransformConfig,
    /// Transform of the coordinate correction pass; defaults to
    /// `transform`.
    #[serde(default)]
    pub correction: Option<TransformConfig>,
    #[serde(default)]
    pub bounding_box: BoundingBox,
    /// JSON array of hydropower plants. Without it the hydropower factor
    /// is missing.
    #[serde(default)]
    pub plants: Option<PathBuf>,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl PipelineConfig {
    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML for
    /// this structure, or fails [`Self::validate`].
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|e| match e {
            PipelineError::ConfigParse { source, .. } => PipelineError::ConfigParse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })?;
        log::info!(
            "Loaded configuration from {} ({} variables)",
            path.display(),
            config.variables.len()
        );
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not deserialize or fails
    /// [`Self::validate`].
    pub fn from_toml(text: &str) -> Result<Self, PipelineError> {
        let config: Self =
            toml::de::from_str(text).map_err(|source| PipelineError::ConfigParse {
                path: "<inline>".to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks settings that deserialization cannot.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Invalid`] or a scoring error describing the
    /// first problem found.
    pub fn validate(&self) -> Result<(), PipelineError> {
        self.scoring.validate()?;

        let bbox = &self.bounding_box;
        if bbox.min_latitude >= bbox.max_latitude || bbox.min_longitude >= bbox.max_longitude {
            return Err(PipelineError::Invalid(
                "bounding box minimum must be below its maximum".to_string(),
            ));
        }

        for (&kind, variable) in &self.variables {
            let search = variable.search_config(kind);
            if !search.radius_km.is_finite() || search.radius_km <= 0.0 {
                return Err(PipelineError::Invalid(format!(
                    "{kind} search radius must be positive, got {}",
                    search.radius_km
                )));
            }
            if search.fallback_count == 0 {
                return Err(PipelineError::Invalid(format!(
                    "{kind} fallback count must be at least 1"
                )));
            }

            let trend = variable.trend_config(kind);
            if trend.min_years < 2 {
                return Err(PipelineError::Invalid(format!(
                    "{kind} needs at least 2 years for a trend, got {}",
                    trend.min_years
                )));
            }
            if trend.plausible_mean.min > trend.plausible_mean.max {
                return Err(PipelineError::Invalid(format!(
                    "{kind} plausible mean range is inverted"
                )));
            }
            if trend.max_decadal_trend <= 0.0 {
                return Err(PipelineError::Invalid(format!(
                    "{kind} max decadal trend must be positive"
                )));
            }

            if !self.scoring.risk_limits.contains_key(&kind) {
                return Err(PipelineError::Invalid(format!(
                    "{kind} has no risk limit"
                )));
            }
        }

        Ok(())
    }

    /// Settings of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotConfigured`] if `kind` has no section.
    pub fn variable(&self, kind: VariableKind) -> Result<&VariableConfig, PipelineError> {
        self.variables
            .get(&kind)
            .ok_or(PipelineError::NotConfigured(kind))
    }
}

#[cfg(test)]
mod tests {
    use drought_risk_scoring::ScoringError;
    use drought_risk_station_models::TrendUnit;

    use super::*;

    const MINIMAL: &str = r#"
        [regions]
        path = "regions.geojson"

        [variables.level]
        records_dir = "gw"

        [variables.discharge]
        listing = "owf.csv"
        search = { radius_km = 12.5 }
    "#;

    #[test]
    fn minimal_config_uses_variable_defaults() {
        let config = PipelineConfig::from_toml(MINIMAL).unwrap();

        assert_eq!(config.state.regions_path(), PathBuf::from("state/regions.json"));
        assert_eq!(
            config.state.stations_path(VariableKind::Level),
            PathBuf::from("state/stations_level.json")
        );
        assert_eq!(config.regions.key_property, "iso");
        assert_eq!(config.transform, TransformConfig::default());
        assert!(config.correction.is_none());

        let level = config.variable(VariableKind::Level).unwrap();
        assert_eq!(level.record_extension, "csv");
        assert!((level.search_config(VariableKind::Level).radius_km - 25.0).abs() < f64::EPSILON);
        assert_eq!(level.columns(VariableKind::Level), ListingColumns::groundwater());
        assert!(!level.parse_options(VariableKind::Level).reject_negative);

        let discharge = config.variable(VariableKind::Discharge).unwrap();
        let search = discharge.search_config(VariableKind::Discharge);
        assert!((search.radius_km - 12.5).abs() < f64::EPSILON);
        assert_eq!(search.fallback_count, 3);
        assert_eq!(
            discharge.trend_config(VariableKind::Discharge).trend_unit,
            TrendUnit::Percent
        );

        assert!(matches!(
            config.variable(VariableKind::Sediment),
            Err(PipelineError::NotConfigured(VariableKind::Sediment))
        ));
    }

    #[test]
    fn parses_tagged_transforms() {
        let text = format!(
            "{MINIMAL}\n[correction]\ntype = \"external_command\"\nprogram = \"/usr/bin/cs2cs\"\nversion = 3\n"
        );
        let config = PipelineConfig::from_toml(&text).unwrap();
        let Some(TransformConfig::ExternalCommand(command)) = config.correction else {
            panic!("expected external command correction");
        };
        assert_eq!(command.program, "/usr/bin/cs2cs");
        assert_eq!(command.version, 3);
    }

    #[test]
    fn rejects_weights_not_summing_to_one() {
        let text = format!("{MINIMAL}\n[scoring.weights]\nlevel = 0.5\ndischarge = 0.3\n");
        assert!(matches!(
            PipelineConfig::from_toml(&text),
            Err(PipelineError::Scoring(ScoringError::WeightSum { .. }))
        ));
    }

    #[test]
    fn rejects_scoring_parameters_that_break_composition() {
        for section in [
            "[scoring.watercourse_impact]\nmax_adjustment = -0.1\n",
            "[scoring.watercourse_impact]\ncapacity_scale_mw = 0.0\n",
            "[scoring.hydropower]\ncapacity_scale_mw = 0.0\n",
            "[scoring.hydropower]\nradius_km = 0.0\n",
        ] {
            let text = format!("{MINIMAL}\n{section}");
            assert!(
                matches!(
                    PipelineConfig::from_toml(&text),
                    Err(PipelineError::Scoring(ScoringError::InvalidParameter { .. }))
                ),
                "accepted {section}"
            );
        }
    }

    #[test]
    fn rejects_non_positive_radius() {
        let text = MINIMAL.replace("12.5", "0.0");
        assert!(matches!(
            PipelineConfig::from_toml(&text),
            Err(PipelineError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_unparseable_documents() {
        assert!(matches!(
            PipelineConfig::from_toml("variables = 3"),
            Err(PipelineError::ConfigParse { .. })
        ));
    }
}
