//! Station metadata listings.
//!
//! Providers publish one semicolon-delimited table per station network.
//! Column names differ between networks, so the adapter is driven by a
//! [`ListingColumns`] mapping.

use std::path::Path;

use serde::Deserialize;

use crate::{ParseError, read_text};

/// Maps listing columns onto station fields.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ListingColumns {
    pub id: String,
    pub name: String,
    /// Watercourse or groundwater-area column.
    #[serde(default)]
    pub label: Option<String>,
    pub x: String,
    pub y: String,
    #[serde(default)]
    pub catchment: Option<String>,
}

impl ListingColumns {
    /// Column names of the groundwater well listing.
    #[must_use]
    pub fn groundwater() -> Self {
        Self {
            id: "hzbnr01".to_string(),
            name: "mstnam02".to_string(),
            label: Some("gwgeb03".to_string()),
            x: "xrkko09".to_string(),
            y: "yhkko10".to_string(),
            catchment: None,
        }
    }

    /// Column names of the surface water (gauge) listing.
    #[must_use]
    pub fn surface_water() -> Self {
        Self {
            id: "hzbnr01".to_string(),
            name: "mstnam02".to_string(),
            label: Some("gew03".to_string()),
            x: "xrkko08".to_string(),
            y: "yhkko09".to_string(),
            catchment: Some("egarea05".to_string()),
        }
    }
}

/// One station row of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub id: String,
    pub name: String,
    pub label: Option<String>,
    /// Projected `(x, y)` in the provider's reference system.
    pub projected: Option<(f64, f64)>,
    pub catchment_km2: Option<f64>,
}

/// Reads a listing file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, the header row is
/// unreadable, or a configured column is missing.
pub fn read_listing(path: &Path, columns: &ListingColumns) -> Result<Vec<ListingEntry>, ParseError> {
    let text = read_text(path)?;
    let entries = parse_listing(&text, columns)?;
    log::info!("{}: {} listed stations", path.display(), entries.len());
    Ok(entries)
}

/// Parses listing text. Rows without an id are skipped; rows without
/// usable coordinates are kept with `projected: None`.
///
/// # Errors
///
/// Returns an error if the header row is unreadable or a configured
/// column is missing. Columns are checked in field order, so the error
/// names the first missing one.
pub fn parse_listing(text: &str, columns: &ListingColumns) -> Result<Vec<ListingEntry>, ParseError> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let index = |column: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(column))
            .ok_or_else(|| ParseError::MissingColumn {
                column: column.to_string(),
            })
    };

    let id_idx = index(&columns.id)?;
    let name_idx = index(&columns.name)?;
    let label_idx = columns.label.as_deref().map(index).transpose()?;
    let x_idx = index(&columns.x)?;
    let y_idx = index(&columns.y)?;
    let catchment_idx = columns.catchment.as_deref().map(index).transpose()?;

    let mut entries = Vec::new();
    for result in reader.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                log::trace!("  skipping malformed row: {e}");
                continue;
            }
        };

        let field = |idx: usize| record.get(idx).filter(|v| !v.is_empty());
        let Some(id) = field(id_idx).map(normalize_id) else {
            log::trace!("  skipping row without id: {record:?}");
            continue;
        };

        let projected = field(x_idx)
            .and_then(parse_number)
            .zip(field(y_idx).and_then(parse_number));

        entries.push(ListingEntry {
            name: field(name_idx).unwrap_or(&id).to_string(),
            label: label_idx.and_then(field).map(str::to_string),
            projected,
            catchment_km2: catchment_idx.and_then(field).and_then(parse_number),
            id,
        });
    }

    Ok(entries)
}

/// Listings sometimes export integer ids as `211912.0`.
fn normalize_id(raw: &str) -> String {
    raw.strip_suffix(".0").unwrap_or(raw).to_string()
}

fn parse_number(field: &str) -> Option<f64> {
    field
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: &str = "hzbnr01;mstnam02;gew03;mpua04;egarea05;xrkko08;yhkko09\n\
        211912;Graz;Mur;;6988,0;534101;213402\n\
        ;Nameless;Mur;;;1;2\n\
        212001.0;Leoben;;;;;\n";

    #[test]
    fn parses_surface_listing() {
        let entries = parse_listing(SURFACE, &ListingColumns::surface_water()).unwrap();
        assert_eq!(entries.len(), 2);

        let graz = &entries[0];
        assert_eq!(graz.id, "211912");
        assert_eq!(graz.label.as_deref(), Some("Mur"));
        assert_eq!(graz.projected, Some((534_101.0, 213_402.0)));
        assert!((graz.catchment_km2.unwrap() - 6988.0).abs() < f64::EPSILON);

        let leoben = &entries[1];
        assert_eq!(leoben.id, "212001");
        assert_eq!(leoben.label, None);
        assert_eq!(leoben.projected, None);
    }

    #[test]
    fn missing_configured_column_is_an_error() {
        let err = parse_listing(SURFACE, &ListingColumns::groundwater()).unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn { ref column } if column == "gwgeb03"));

        let columns = ListingColumns {
            label: None,
            ..ListingColumns::groundwater()
        };
        let err = parse_listing(SURFACE, &columns).unwrap_err();
        assert!(matches!(err, ParseError::MissingColumn { ref column } if column == "xrkko09"));
    }

    #[test]
    fn strips_byte_order_mark() {
        let text = "\u{feff}hzbnr01;mstnam02;gwgeb03;xrkko09;yhkko10\n300111;Brunnen 1;Leibnitzer Feld;540000;180000\n";
        let entries = parse_listing(text, &ListingColumns::groundwater()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].label.as_deref(), Some("Leibnitzer Feld"));
    }
}
