//! Annotated `GeoJSON` output.
//!
//! Region output copies the boundary `FeatureCollection` and extends each
//! feature's properties with the flattened summary and risk properties of
//! the matching region. Station output is a point collection carrying the
//! trend fields.

use std::collections::BTreeMap;
use std::path::Path;

use drought_risk_region_models::Region;
use drought_risk_station_models::{Station, TrendOutcome};
use serde_json::{Map, Value, json};

use crate::StoreError;

/// Reads a `GeoJSON` document as plain JSON.
///
/// # Errors
///
/// Returns [`StoreError::MissingInput`] if `path` does not exist, or an
/// error if it cannot be read or parsed.
pub fn load_geojson(path: &Path) -> Result<Value, StoreError> {
    if !path.exists() {
        return Err(StoreError::MissingInput {
            path: path.display().to_string(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })
}

fn key_of(properties: &Map<String, Value>, key_property: &str) -> Option<String> {
    match properties.get(key_property)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Returns a copy of `boundary` with region properties attached.
///
/// Features whose key matches no region keep their original properties.
/// Derived properties overwrite original ones of the same name.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] if `boundary` is not a
/// `FeatureCollection`.
pub fn annotate_geojson(
    boundary: &Value,
    key_property: &str,
    regions: &[Region],
) -> Result<Value, StoreError> {
    let invalid = |reason: &str| StoreError::Invalid {
        path: "boundary".to_string(),
        reason: reason.to_string(),
    };

    if boundary.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(invalid("expected a FeatureCollection"));
    }

    let by_key: BTreeMap<&str, &Region> = regions.iter().map(|r| (r.key.as_str(), r)).collect();
    let mut annotated = boundary.clone();
    let Some(features) = annotated.get_mut("features").and_then(Value::as_array_mut) else {
        return Err(invalid("missing features array"));
    };

    let mut matched = 0_usize;
    for feature in features.iter_mut() {
        let Some(object) = feature.as_object_mut() else {
            continue;
        };
        let properties = object
            .entry("properties")
            .or_insert_with(|| Value::Object(Map::new()));
        if properties.is_null() {
            *properties = Value::Object(Map::new());
        }
        let Some(properties) = properties.as_object_mut() else {
            continue;
        };
        let Some(region) = key_of(properties, key_property).and_then(|k| by_key.get(k.as_str()).copied())
        else {
            continue;
        };

        properties.extend(region.geo_properties());
        matched += 1;
    }

    log::info!("Annotated {matched} of {} boundary features", features.len());
    Ok(annotated)
}

fn station_properties(station: &Station) -> Map<String, Value> {
    let mut props = Map::new();
    props.insert("id".into(), Value::from(station.id.clone()));
    props.insert("name".into(), Value::from(station.name.clone()));
    props.insert("kind".into(), Value::from(station.kind.as_ref()));
    props.insert("label".into(), Value::from(station.display_label()));
    if let Some(catchment) = station.catchment_km2 {
        props.insert("catchment_km2".into(), Value::from(catchment));
    }

    match &station.trend {
        TrendOutcome::Pending => {
            props.insert("trend_status".into(), Value::from("pending"));
        }
        TrendOutcome::Rejected { reason } => {
            props.insert("trend_status".into(), Value::from("rejected"));
            props.insert("trend_rejected".into(), Value::from(reason.as_ref()));
        }
        TrendOutcome::Accepted(trend) => {
            props.insert("trend_status".into(), Value::from("accepted"));
            props.insert("trend_per_decade".into(), Value::from(trend.slope_per_decade));
            props.insert("trend_pct".into(), Value::from(trend.relative_slope_pct));
            props.insert("mean_level".into(), Value::from(trend.mean_level));
            props.insert("current_level".into(), Value::from(trend.current_level));
            props.insert("first_year".into(), Value::from(trend.first_year));
            props.insert("last_year".into(), Value::from(trend.last_year));
            props.insert("years".into(), Value::from(trend.year_count));
            if let Some(p) = trend.significance {
                props.insert("significance".into(), Value::from(p));
            }
        }
    }

    props
}

/// Point `FeatureCollection` of the located `stations` with their trend
/// fields flattened into properties. Unlocated stations are left out.
#[must_use]
pub fn station_features(stations: &[Station]) -> Value {
    let features: Vec<Value> = stations
        .iter()
        .filter_map(|station| {
            let location = station.location.as_ref()?;
            Some(json!({
                "type": "Feature",
                "geometry": {
                    "type": "Point",
                    "coordinates": [location.longitude, location.latitude],
                },
                "properties": Value::Object(station_properties(station)),
            }))
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

#[cfg(test)]
mod tests {
    use drought_risk_region_models::{RiskCategory, RiskScore};
    use drought_risk_station_models::{GeoPoint, RejectReason, StationLocation, Trend, VariableKind};

    use super::*;

    #[test]
    fn station_features_flatten_trends_of_located_stations() {
        let location = StationLocation {
            latitude: 47.1,
            longitude: 15.4,
            transform: "linear".to_string(),
            version: 1,
        };
        let mut accepted = Station::new("1".into(), "Graz".into(), VariableKind::Discharge);
        accepted.location = Some(location.clone());
        accepted.trend = TrendOutcome::Accepted(Trend {
            slope_per_decade: -3.0,
            relative_slope_pct: -4.5,
            significance: Some(0.02),
            mean_level: 66.0,
            current_level: 60.0,
            year_count: 30,
            first_year: 1990,
            last_year: 2019,
            span_years: 29,
        });
        let mut rejected = Station::new("2".into(), "Leoben".into(), VariableKind::Discharge);
        rejected.location = Some(location);
        rejected.trend = TrendOutcome::Rejected {
            reason: RejectReason::InsufficientCoverage,
        };
        let unlocated = Station::new("3".into(), "Nowhere".into(), VariableKind::Discharge);

        let collection = station_features(&[accepted, rejected, unlocated]);
        let features = collection["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);

        assert_eq!(features[0]["geometry"]["coordinates"], json!([15.4, 47.1]));
        let props = &features[0]["properties"];
        assert_eq!(props["trend_status"], "accepted");
        assert_eq!(props["trend_pct"], -4.5);
        assert_eq!(props["first_year"], 1990);
        assert_eq!(props["label"], "Unknown");

        let props = &features[1]["properties"];
        assert_eq!(props["trend_rejected"], "insufficient_coverage");
        assert!(props.get("trend_per_decade").is_none());
    }

    fn boundary() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"iso": 6, "name": "Steiermark", "area": 16401},
                    "geometry": {"type": "Polygon", "coordinates": [[[14.0, 47.0], [16.0, 47.0], [16.0, 48.0], [14.0, 47.0]]]}
                },
                {
                    "type": "Feature",
                    "properties": null,
                    "geometry": null
                }
            ]
        })
    }

    #[test]
    fn attaches_region_properties_and_keeps_originals() {
        let mut region = Region::new("6".into(), "Steiermark".into(), GeoPoint::new(47.5, 15.0));
        region.risk = Some(RiskScore {
            factors: BTreeMap::new(),
            base_score: 0.7,
            modifiers: Vec::new(),
            score: 0.7,
            category: RiskCategory::High,
        });

        let input = boundary();
        let annotated = annotate_geojson(&input, "iso", &[region]).unwrap();

        let props = &annotated["features"][0]["properties"];
        assert_eq!(props["area"], 16401);
        assert_eq!(props["region_key"], "6");
        assert_eq!(props["risk_category"], "high");
        assert_eq!(annotated["features"][0]["geometry"], input["features"][0]["geometry"]);
        assert_eq!(annotated["features"][1]["properties"], json!({}));
        assert!(input["features"][0]["properties"].get("risk_score").is_none());
    }

    #[test]
    fn rejects_other_documents() {
        assert!(annotate_geojson(&json!([]), "iso", &[]).is_err());
    }
}
