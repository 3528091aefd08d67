//! Region loading from boundary `GeoJSON`.
//!
//! Each feature of the boundary `FeatureCollection` becomes a [`Region`]
//! keyed by a configurable property, located at the centroid of its
//! polygon.

use std::collections::BTreeSet;
use std::path::PathBuf;

use drought_risk_region_models::Region;
use drought_risk_station_models::GeoPoint;
use geo::{Centroid, MultiPolygon};
use geojson::{Feature, GeoJson};
use serde::Deserialize;

/// Errors that can occur while loading region boundaries.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// Filesystem I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The boundary file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// The boundary file is valid `GeoJSON` but not a `FeatureCollection`.
    #[error("Expected a FeatureCollection in {0}")]
    NotFeatureCollection(String),
}

/// Where region boundaries come from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegionSource {
    pub path: PathBuf,
    /// Feature property holding the region key.
    #[serde(default = "default_key_property")]
    pub key_property: String,
    /// Feature property holding the display name.
    #[serde(default = "default_name_property")]
    pub name_property: String,
}

fn default_key_property() -> String {
    "iso".to_string()
}

fn default_name_property() -> String {
    "name".to_string()
}

/// Reads the boundary file of `source` into regions.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a `GeoJSON`
/// `FeatureCollection`.
pub fn load_regions(source: &RegionSource) -> Result<Vec<Region>, SpatialError> {
    let text = std::fs::read_to_string(&source.path).map_err(|e| SpatialError::Io {
        path: source.path.display().to_string(),
        source: e,
    })?;
    let regions = parse_regions(&text, &source.key_property, &source.name_property)
        .map_err(|e| match e {
            SpatialError::NotFeatureCollection(_) => {
                SpatialError::NotFeatureCollection(source.path.display().to_string())
            }
            other => other,
        })?;
    log::info!(
        "Loaded {} regions from {}",
        regions.len(),
        source.path.display()
    );
    Ok(regions)
}

/// Parses a boundary `FeatureCollection`.
///
/// Features without a key, without a polygon geometry, or repeating an
/// earlier key are skipped with a warning.
///
/// # Errors
///
/// Returns an error if `text` is not a `GeoJSON` `FeatureCollection`.
pub fn parse_regions(
    text: &str,
    key_property: &str,
    name_property: &str,
) -> Result<Vec<Region>, SpatialError> {
    let geojson = text.parse::<GeoJson>().map_err(Box::new)?;
    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(SpatialError::NotFeatureCollection("input".to_string()));
    };

    let mut seen = BTreeSet::new();
    let mut regions = Vec::new();

    for feature in collection.features {
        let Some(key) = property_string(&feature, key_property) else {
            log::warn!("Skipping boundary feature without '{key_property}' property");
            continue;
        };
        let Some(centroid) = feature_centroid(&feature) else {
            log::warn!("Skipping region {key}: geometry is not a polygon");
            continue;
        };
        if !seen.insert(key.clone()) {
            log::warn!("Skipping duplicate region key {key}");
            continue;
        }

        let name = property_string(&feature, name_property).unwrap_or_else(|| key.clone());
        regions.push(Region::new(key, name, centroid));
    }

    Ok(regions)
}

/// String or numeric property value as a string.
pub(crate) fn property_string(feature: &Feature, property: &str) -> Option<String> {
    match feature.property(property)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_centroid(feature: &Feature) -> Option<GeoPoint> {
    let geometry = feature.geometry.clone()?;
    let geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    let multi_polygon = match geometry {
        geo::Geometry::MultiPolygon(mp) => mp,
        geo::Geometry::Polygon(p) => MultiPolygon(vec![p]),
        _ => return None,
    };
    let point = multi_polygon.centroid()?;
    Some(GeoPoint::new(point.y(), point.x()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOUNDARIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"iso": 6, "name": "Steiermark"},
                "geometry": {"type": "Polygon", "coordinates": [[[14.0, 47.0], [16.0, 47.0], [16.0, 48.0], [14.0, 48.0], [14.0, 47.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"iso": "9"},
                "geometry": {"type": "MultiPolygon", "coordinates": [[[[16.2, 48.1], [16.6, 48.1], [16.6, 48.3], [16.2, 48.3], [16.2, 48.1]]]]}
            },
            {
                "type": "Feature",
                "properties": {"name": "No key"},
                "geometry": {"type": "Polygon", "coordinates": [[[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]]]}
            },
            {
                "type": "Feature",
                "properties": {"iso": "P"},
                "geometry": {"type": "Point", "coordinates": [15.0, 47.0]}
            },
            {
                "type": "Feature",
                "properties": {"iso": 6, "name": "Duplicate"},
                "geometry": {"type": "Polygon", "coordinates": [[[14.0, 47.0], [15.0, 47.0], [15.0, 48.0], [14.0, 47.0]]]}
            }
        ]
    }"#;

    #[test]
    fn parses_polygon_regions_with_centroids() {
        let regions = parse_regions(BOUNDARIES, "iso", "name").unwrap();
        assert_eq!(regions.len(), 2);

        let styria = &regions[0];
        assert_eq!(styria.key, "6");
        assert_eq!(styria.name, "Steiermark");
        assert!((styria.latitude - 47.5).abs() < 1e-9);
        assert!((styria.longitude - 15.0).abs() < 1e-9);

        let vienna = &regions[1];
        assert_eq!(vienna.key, "9");
        assert_eq!(vienna.name, "9");
        assert!((vienna.latitude - 48.2).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_collections() {
        let err = parse_regions(r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#, "iso", "name")
            .unwrap_err();
        assert!(matches!(err, SpatialError::NotFeatureCollection(_)));
        assert!(matches!(
            parse_regions("not json", "iso", "name"),
            Err(SpatialError::GeoJson(_))
        ));
    }
}
