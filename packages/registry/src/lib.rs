#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Station registry.
//!
//! Holds one [`Station`] per id for a single variable and applies the
//! three kinds of update the pipeline makes to it:
//!
//! - [`StationRegistry::register_listing`] adds stations and refreshes
//!   their identity, setting a location only where none exists yet and no
//!   correction of the same or a newer version excluded the station.
//! - [`StationRegistry::attach_trends`] replaces trend outcomes and never
//!   touches identity or location.
//! - [`StationRegistry::correct_coordinates`] is the only operation that
//!   replaces or clears an existing location, and only with an equal or
//!   newer transform version. A cleared location remembers the version
//!   that cleared it.

pub mod transform;

use std::collections::BTreeMap;

use drought_risk_parser::ListingEntry;
use drought_risk_station_models::{
    GeoPoint, LocationExclusion, Station, StationLocation, TrendOutcome, VariableKind,
};

pub use transform::{BoundingBox, CoordinateTransform, TransformConfig, TransformError};

/// Outcome counts of [`StationRegistry::register_listing`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterSummary {
    pub added: usize,
    pub refreshed: usize,
    /// Added or refreshed stations left without a location.
    pub unlocated: usize,
}

/// Outcome of [`StationRegistry::attach_trends`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttachSummary {
    pub updated: usize,
    /// Ids with a trend but no registered station.
    pub orphans: Vec<String>,
}

/// Outcome counts of [`StationRegistry::correct_coordinates`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrectionSummary {
    pub corrected: usize,
    /// Stations whose corrected location fell outside the bounding box.
    pub cleared: usize,
    /// Stations already located or excluded by a newer transform version.
    pub kept_newer: usize,
    /// Listing rows with no registered station.
    pub unknown: usize,
}

/// All stations of one variable, keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct StationRegistry {
    kind: VariableKind,
    stations: BTreeMap<String, Station>,
}

impl StationRegistry {
    #[must_use]
    pub const fn new(kind: VariableKind) -> Self {
        Self {
            kind,
            stations: BTreeMap::new(),
        }
    }

    /// Builds a registry from persisted stations. Stations of another
    /// kind are ignored.
    #[must_use]
    pub fn from_stations(kind: VariableKind, stations: impl IntoIterator<Item = Station>) -> Self {
        let mut registry = Self::new(kind);
        for station in stations {
            if station.kind == kind {
                registry.stations.insert(station.id.clone(), station);
            } else {
                log::warn!(
                    "Ignoring station {} of kind {} in {kind} registry",
                    station.id,
                    station.kind
                );
            }
        }
        registry
    }

    #[must_use]
    pub const fn kind(&self) -> VariableKind {
        self.kind
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.stations.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Stations in id order.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    #[must_use]
    pub fn into_stations(self) -> Vec<Station> {
        self.stations.into_values().collect()
    }

    /// Adds unknown stations and refreshes name, label and catchment of
    /// known ones. A location is set only on stations that have none and
    /// were not excluded by a correction of the same or a newer version.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate transform fails as a whole.
    pub fn register_listing(
        &mut self,
        entries: &[ListingEntry],
        transform: &dyn CoordinateTransform,
        bbox: &BoundingBox,
    ) -> Result<RegisterSummary, TransformError> {
        let points = transform_entries(entries, transform)?;
        let mut summary = RegisterSummary::default();

        for (entry, point) in entries.iter().zip(points) {
            if self.stations.contains_key(&entry.id) {
                summary.refreshed += 1;
            } else {
                summary.added += 1;
            }
            let kind = self.kind;
            let station = self
                .stations
                .entry(entry.id.clone())
                .or_insert_with(|| Station::new(entry.id.clone(), entry.name.clone(), kind));

            station.name.clone_from(&entry.name);
            if entry.label.is_some() {
                station.label.clone_from(&entry.label);
            }
            if entry.catchment_km2.is_some() {
                station.catchment_km2 = entry.catchment_km2;
            }
            let excluded = station
                .location_excluded
                .as_ref()
                .is_some_and(|e| e.version >= transform.version());
            if station.location.is_none() && !excluded {
                station.location = locate(&entry.id, point, transform, bbox);
                if station.location.is_some() {
                    station.location_excluded = None;
                }
            }
            if station.location.is_none() {
                summary.unlocated += 1;
            }
        }

        log::info!(
            "Registered {} {} stations ({} new, {} refreshed, {} without location)",
            entries.len(),
            self.kind,
            summary.added,
            summary.refreshed,
            summary.unlocated
        );
        Ok(summary)
    }

    /// Replaces trend outcomes by station id.
    pub fn attach_trends(&mut self, trends: BTreeMap<String, TrendOutcome>) -> AttachSummary {
        let mut summary = AttachSummary::default();

        for (id, outcome) in trends {
            if let Some(station) = self.stations.get_mut(&id) {
                station.trend = outcome;
                summary.updated += 1;
            } else {
                summary.orphans.push(id);
            }
        }

        if !summary.orphans.is_empty() {
            log::warn!(
                "{} {} trends have no registered station: {}",
                summary.orphans.len(),
                self.kind,
                summary.orphans.join(", ")
            );
        }
        summary
    }

    /// Re-derives locations of listed stations with `transform`.
    ///
    /// Stations located or excluded by a newer transform version are left
    /// alone. A result outside `bbox` clears the location and records the
    /// transform as the exclusion; the station and its trend outcome are
    /// kept either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate transform fails as a whole.
    pub fn correct_coordinates(
        &mut self,
        entries: &[ListingEntry],
        transform: &dyn CoordinateTransform,
        bbox: &BoundingBox,
    ) -> Result<CorrectionSummary, TransformError> {
        let points = transform_entries(entries, transform)?;
        let mut summary = CorrectionSummary::default();

        for (entry, point) in entries.iter().zip(points) {
            let Some(station) = self.stations.get_mut(&entry.id) else {
                summary.unknown += 1;
                continue;
            };

            if station
                .location_version()
                .is_some_and(|v| v > transform.version())
            {
                summary.kept_newer += 1;
                continue;
            }

            if let Some(location) = locate(&entry.id, point, transform, bbox) {
                station.location = Some(location);
                station.location_excluded = None;
                summary.corrected += 1;
            } else {
                station.location = None;
                station.location_excluded = Some(LocationExclusion {
                    transform: transform.id().to_string(),
                    version: transform.version(),
                });
                summary.cleared += 1;
            }
        }

        log::info!(
            "Corrected {} {} station locations with {} v{} ({} cleared, {} kept newer, {} unknown)",
            summary.corrected,
            self.kind,
            transform.id(),
            transform.version(),
            summary.cleared,
            summary.kept_newer,
            summary.unknown
        );
        Ok(summary)
    }
}

/// Transforms every entry's projected position in one batch, aligned with
/// `entries`.
fn transform_entries(
    entries: &[ListingEntry],
    transform: &dyn CoordinateTransform,
) -> Result<Vec<Option<GeoPoint>>, TransformError> {
    let projected: Vec<(f64, f64)> = entries.iter().filter_map(|e| e.projected).collect();
    let mut results = transform.transform(&projected)?.into_iter();

    Ok(entries
        .iter()
        .map(|e| e.projected.and_then(|_| results.next().flatten()))
        .collect())
}

fn locate(
    id: &str,
    point: Option<GeoPoint>,
    transform: &dyn CoordinateTransform,
    bbox: &BoundingBox,
) -> Option<StationLocation> {
    let point = point?;
    if !bbox.contains(point) {
        log::debug!(
            "Station {id} at ({}, {}) is outside the bounding box",
            point.latitude,
            point.longitude
        );
        return None;
    }
    Some(StationLocation {
        latitude: round5(point.latitude),
        longitude: round5(point.longitude),
        transform: transform.id().to_string(),
        version: transform.version(),
    })
}

fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

#[cfg(test)]
mod tests {
    use drought_risk_station_models::{RejectReason, Trend};

    use super::*;
    use crate::transform::LinearApproximation;

    /// Places points by `(x, y)` = `(lon, lat)` directly.
    struct Identity {
        version: u32,
    }

    impl CoordinateTransform for Identity {
        fn id(&self) -> &str {
            "identity"
        }

        fn version(&self) -> u32 {
            self.version
        }

        fn transform(&self, points: &[(f64, f64)]) -> Result<Vec<Option<GeoPoint>>, TransformError> {
            Ok(points.iter().map(|&(x, y)| Some(GeoPoint::new(y, x))).collect())
        }
    }

    fn entry(id: &str, projected: Option<(f64, f64)>) -> ListingEntry {
        ListingEntry {
            id: id.to_string(),
            name: format!("Station {id}"),
            label: Some("Mur".to_string()),
            projected,
            catchment_km2: None,
        }
    }

    fn trend() -> Trend {
        Trend {
            slope_per_decade: -0.3,
            relative_slope_pct: -0.1,
            significance: Some(0.01),
            mean_level: 300.0,
            current_level: 299.0,
            year_count: 20,
            first_year: 2000,
            last_year: 2019,
            span_years: 19,
        }
    }

    #[test]
    fn registers_new_stations_with_validated_location() {
        let mut registry = StationRegistry::new(VariableKind::Level);
        let summary = registry
            .register_listing(
                &[
                    entry("1", Some((15.0, 47.0))),
                    entry("2", Some((30.0, 60.0))),
                    entry("3", None),
                ],
                &Identity { version: 1 },
                &BoundingBox::default(),
            )
            .unwrap();

        assert_eq!(summary.added, 3);
        assert_eq!(summary.unlocated, 2);
        let located = registry.get("1").unwrap().location.as_ref().unwrap();
        assert!((located.latitude - 47.0).abs() < f64::EPSILON);
        assert_eq!(located.transform, "identity");
        assert!(registry.get("2").unwrap().location.is_none());
        assert!(registry.get("3").unwrap().trend.is_pending());
    }

    #[test]
    fn re_registering_never_moves_an_existing_location() {
        let mut registry = StationRegistry::new(VariableKind::Level);
        let bbox = BoundingBox::default();
        registry
            .register_listing(&[entry("1", Some((15.0, 47.0)))], &Identity { version: 1 }, &bbox)
            .unwrap();
        let summary = registry
            .register_listing(&[entry("1", Some((16.0, 48.0)))], &Identity { version: 5 }, &bbox)
            .unwrap();

        assert_eq!(summary.refreshed, 1);
        let location = registry.get("1").unwrap().location.as_ref().unwrap();
        assert!((location.longitude - 15.0).abs() < f64::EPSILON);
        assert_eq!(location.version, 1);
    }

    #[test]
    fn attach_trends_reports_orphans_and_keeps_location() {
        let mut registry = StationRegistry::new(VariableKind::Level);
        registry
            .register_listing(
                &[entry("1", Some((15.0, 47.0)))],
                &Identity { version: 1 },
                &BoundingBox::default(),
            )
            .unwrap();

        let summary = registry.attach_trends(BTreeMap::from([
            ("1".to_string(), TrendOutcome::Accepted(trend())),
            (
                "9".to_string(),
                TrendOutcome::Rejected {
                    reason: RejectReason::TooFewObservations,
                },
            ),
        ]));

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.orphans, vec!["9".to_string()]);
        let station = registry.get("1").unwrap();
        assert!(station.trend.trend().is_some());
        assert!(station.location.is_some());
        assert!(!registry.contains("9"));
    }

    #[test]
    fn correction_replaces_location_and_preserves_trend() {
        let mut registry = StationRegistry::new(VariableKind::Level);
        let bbox = BoundingBox::default();
        let linear = LinearApproximation::default();
        // (534101, 213402) lands inside the box under the linear approximation.
        registry
            .register_listing(&[entry("1", Some((534_101.0, 213_402.0)))], &linear, &bbox)
            .unwrap();
        registry.attach_trends(BTreeMap::from([(
            "1".to_string(),
            TrendOutcome::Accepted(trend()),
        )]));

        let summary = registry
            .correct_coordinates(&[entry("1", Some((15.44, 47.07)))], &Identity { version: 2 }, &bbox)
            .unwrap();

        assert_eq!(summary.corrected, 1);
        let station = registry.get("1").unwrap();
        let location = station.location.as_ref().unwrap();
        assert_eq!((location.transform.as_str(), location.version), ("identity", 2));
        assert!((location.latitude - 47.07).abs() < 1e-9);
        assert_eq!(station.trend, TrendOutcome::Accepted(trend()));
    }

    #[test]
    fn correction_never_downgrades_and_clears_out_of_bounds() {
        let mut registry = StationRegistry::new(VariableKind::Discharge);
        let bbox = BoundingBox::default();
        registry
            .register_listing(
                &[entry("1", Some((15.0, 47.0))), entry("2", Some((15.0, 47.0)))],
                &Identity { version: 3 },
                &bbox,
            )
            .unwrap();

        let summary = registry
            .correct_coordinates(&[entry("1", Some((16.0, 48.0)))], &Identity { version: 2 }, &bbox)
            .unwrap();
        assert_eq!(summary.kept_newer, 1);
        assert_eq!(registry.get("1").unwrap().location.as_ref().unwrap().version, 3);

        let summary = registry
            .correct_coordinates(
                &[entry("2", Some((40.0, 10.0))), entry("7", Some((15.0, 47.0)))],
                &Identity { version: 4 },
                &bbox,
            )
            .unwrap();
        assert_eq!((summary.cleared, summary.unknown), (1, 1));
        let station = registry.get("2").unwrap();
        assert!(station.location.is_none());
        assert_eq!(station.location_excluded.as_ref().unwrap().version, 4);
        assert!(registry.contains("2"));
    }

    #[test]
    fn re_registering_respects_a_newer_exclusion() {
        let mut registry = StationRegistry::new(VariableKind::Level);
        let bbox = BoundingBox::default();
        let listed = [entry("1", Some((15.0, 47.0)))];
        registry
            .register_listing(&listed, &Identity { version: 1 }, &bbox)
            .unwrap();

        let summary = registry
            .correct_coordinates(&[entry("1", Some((15.0, 52.0)))], &Identity { version: 2 }, &bbox)
            .unwrap();
        assert_eq!(summary.cleared, 1);

        let summary = registry
            .register_listing(&listed, &Identity { version: 1 }, &bbox)
            .unwrap();
        assert_eq!(summary.unlocated, 1);
        let station = registry.get("1").unwrap();
        assert!(station.location.is_none());
        assert_eq!(
            station.location_excluded,
            Some(LocationExclusion {
                transform: "identity".to_string(),
                version: 2,
            })
        );

        let summary = registry
            .correct_coordinates(&listed, &Identity { version: 1 }, &bbox)
            .unwrap();
        assert_eq!(summary.kept_newer, 1);
        assert!(registry.get("1").unwrap().location.is_none());

        registry
            .register_listing(&listed, &Identity { version: 3 }, &bbox)
            .unwrap();
        let station = registry.get("1").unwrap();
        assert_eq!(station.location.as_ref().unwrap().version, 3);
        assert!(station.location_excluded.is_none());
    }

    #[test]
    fn from_stations_filters_other_kinds() {
        let stations = vec![
            Station::new("1".into(), "A".into(), VariableKind::Level),
            Station::new("2".into(), "B".into(), VariableKind::Discharge),
        ];
        let registry = StationRegistry::from_stations(VariableKind::Level, stations);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("1"));
    }
}
