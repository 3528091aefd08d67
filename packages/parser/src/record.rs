//! Single-station record files.
//!
//! ```text
//! Messstelle:;Graz
//! HZB-Nummer:;211912
//! Gewässer:;Mur
//! Einzugsgebiet:;6988,0
//! Rechtswert-Hochwert:;534101 - 213402
//! Werte:
//! 01.01.1966 00:00:00;85,300
//! 02.01.1966 00:00:00;Lücke
//! ```

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use drought_risk_station_models::{Observation, VariableKind};
use regex::Regex;
use serde::Deserialize;

use crate::{ParseError, read_text};

/// Leading `dd.mm.yyyy` of a data row. Any time-of-day is ignored.
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*([0-9]{1,2})\.([0-9]{1,2})\.([0-9]{4})").expect("valid regex")
});

/// Projected `x - y` pair on the `Rechtswert` header line.
static PROJECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9][0-9.,]*)[ \t]*-[ \t]*([0-9][0-9.,]*)").expect("valid regex")
});

/// Options controlling how a record file is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Line prefix that marks the start of the data block.
    pub sentinel: String,
    /// Rows containing any of these (case-insensitive) are gaps.
    pub gap_markers: Vec<String>,
    pub delimiter: char,
    /// Drop negative readings (discharge, precipitation, sediment).
    pub reject_negative: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            sentinel: "Werte:".to_string(),
            gap_markers: vec!["Lücke".to_string(), "LÃ¼cke".to_string()],
            delimiter: ';',
            reject_negative: false,
        }
    }
}

impl ParseOptions {
    /// Default options with negative rejection set for `kind`.
    #[must_use]
    pub fn for_kind(kind: VariableKind) -> Self {
        Self {
            reject_negative: kind.is_non_negative(),
            ..Self::default()
        }
    }

    fn is_gap(&self, line: &str) -> bool {
        let lower = line.to_lowercase();
        self.gap_markers
            .iter()
            .any(|marker| lower.contains(&marker.to_lowercase()))
    }

    fn second_field<'a>(&self, line: &'a str) -> Option<&'a str> {
        line.split(self.delimiter)
            .nth(1)
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Station metadata found above the data block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordHeader {
    pub name: Option<String>,
    pub station_id: Option<String>,
    pub watercourse: Option<String>,
    pub catchment_km2: Option<f64>,
    /// Projected `(x, y)` in the provider's reference system.
    pub projected: Option<(f64, f64)>,
}

/// A parsed record file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRecord {
    pub header: RecordHeader,
    /// Observations in date order; duplicates keep file order.
    pub observations: Vec<Observation>,
}

/// Reads and parses a record file.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read. Content problems
/// never produce an error.
pub fn read_record(path: &Path, options: &ParseOptions) -> Result<ParsedRecord, ParseError> {
    let text = read_text(path)?;
    let record = parse_record(&text, options);
    log::debug!(
        "{}: {} observations",
        path.display(),
        record.observations.len()
    );
    Ok(record)
}

/// Parses header metadata and observations from record text.
#[must_use]
pub fn parse_record(text: &str, options: &ParseOptions) -> ParsedRecord {
    let lines: Vec<&str> = text.lines().collect();
    let (header_end, data_start) = locate_data(&lines, options);

    let header = parse_header(&lines[..header_end], options);
    let observations = parse_rows(&lines[data_start..], options);

    ParsedRecord {
        header,
        observations,
    }
}

/// Returns `(end of header, first data line)`.
///
/// Without a sentinel the data starts at the first dated line; without
/// either, there is no data.
fn locate_data(lines: &[&str], options: &ParseOptions) -> (usize, usize) {
    if let Some(i) = lines
        .iter()
        .position(|l| l.trim_start().starts_with(&options.sentinel))
    {
        return (i, i + 1);
    }
    lines
        .iter()
        .position(|l| DATE_RE.is_match(l))
        .map_or((lines.len(), lines.len()), |i| (i, i))
}

fn parse_header(lines: &[&str], options: &ParseOptions) -> RecordHeader {
    let mut header = RecordHeader::default();

    for line in lines {
        let Some(value) = options.second_field(line) else {
            continue;
        };
        if line.starts_with("Messstelle:") {
            header.name = Some(value.to_string());
        } else if line.starts_with("HZB-Nummer:") {
            header.station_id = Some(value.to_string());
        } else if line.contains("sser:") {
            header.watercourse = Some(value.to_string());
        } else if line.contains("Einzugsgebiet") {
            header.catchment_km2 = parse_decimal(value);
        } else if line.contains("Rechtswert") {
            header.projected = PROJECTED_RE.captures(value).and_then(|caps| {
                Some((parse_decimal(&caps[1])?, parse_decimal(&caps[2])?))
            });
        }
    }

    header
}

fn parse_rows(lines: &[&str], options: &ParseOptions) -> Vec<Observation> {
    let mut observations = Vec::new();
    let mut skipped = 0_usize;

    for line in lines {
        if line.trim().is_empty() || options.is_gap(line) {
            continue;
        }
        match parse_row(line, options) {
            Some(obs) => observations.push(obs),
            None => {
                skipped += 1;
                log::trace!("  skipping malformed row: {line}");
            }
        }
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} malformed rows");
    }

    observations.sort_by_key(|o| o.date);
    observations
}

fn parse_row(line: &str, options: &ParseOptions) -> Option<Observation> {
    let mut fields = line.split(options.delimiter);
    let date = parse_date(fields.next()?)?;
    let value = parse_decimal(fields.next()?)?;
    if options.reject_negative && value < 0.0 {
        return None;
    }
    Some(Observation::new(date, value))
}

fn parse_date(field: &str) -> Option<NaiveDate> {
    let caps = DATE_RE.captures(field)?;
    let day = caps[1].parse().ok()?;
    let month = caps[2].parse().ok()?;
    let year = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Parses a decimal-comma number, ignoring units and stray characters.
fn parse_decimal(field: &str) -> Option<f64> {
    let cleaned: String = field
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_observations(text: &str, options: &ParseOptions) -> Vec<Observation> {
        parse_record(text, options).observations
    }

    const RECORD: &str = "Messstelle:;Graz\n\
        HZB-Nummer:;211912\n\
        Gewässer:;Mur\n\
        Einzugsgebiet:;6988,0\n\
        Rechtswert-Hochwert:;534101 - 213402\n\
        Werte:\n\
        03.01.1966 00:00:00;87,100\n\
        01.01.1966 00:00:00;85,300\n\
        02.01.1966 00:00:00;Lücke\n\
        garbage line\n\
        \n\
        04.01.1966 00:00:00;-1,0\n\
        05.01.1966 00:00:00;  90,5 m³/s\n";

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_header_fields() {
        let record = parse_record(RECORD, &ParseOptions::default());
        let header = record.header;
        assert_eq!(header.name.as_deref(), Some("Graz"));
        assert_eq!(header.station_id.as_deref(), Some("211912"));
        assert_eq!(header.watercourse.as_deref(), Some("Mur"));
        assert!((header.catchment_km2.unwrap() - 6988.0).abs() < f64::EPSILON);
        let (x, y) = header.projected.unwrap();
        assert!((x - 534_101.0).abs() < f64::EPSILON);
        assert!((y - 213_402.0).abs() < f64::EPSILON);
    }

    #[test]
    fn skips_gaps_and_malformed_rows_and_sorts() {
        let obs = parse_observations(RECORD, &ParseOptions::default());
        let dates: Vec<NaiveDate> = obs.iter().map(|o| o.date).collect();
        assert_eq!(
            dates,
            vec![day(1966, 1, 1), day(1966, 1, 3), day(1966, 1, 4), day(1966, 1, 5)]
        );
        assert!((obs[0].value - 85.3).abs() < 1e-9);
        assert!((obs[3].value - 90.5).abs() < 1e-9);
    }

    #[test]
    fn rejects_negatives_for_non_negative_kinds() {
        let obs = parse_observations(RECORD, &ParseOptions::for_kind(VariableKind::Discharge));
        assert!(obs.iter().all(|o| o.value >= 0.0));
        assert_eq!(obs.len(), 3);
    }

    #[test]
    fn falls_back_to_first_dated_line_without_sentinel() {
        let text = "Messstelle:;Wels\n01.02.2001;412,5\n02.02.2001;413,0\n";
        let record = parse_record(text, &ParseOptions::default());
        assert_eq!(record.header.name.as_deref(), Some("Wels"));
        assert_eq!(record.observations.len(), 2);
    }

    #[test]
    fn mis_decoded_gap_marker_is_skipped() {
        let text = "Werte:\n01.01.2000 00:00:00;LÃ¼cke\n02.01.2000 00:00:00;1,0\n";
        let obs = parse_observations(text, &ParseOptions::default());
        assert_eq!(obs.len(), 1);
    }

    #[test]
    fn nothing_parseable_yields_empty() {
        assert!(parse_observations("just\nsome\ntext", &ParseOptions::default()).is_empty());
        assert!(parse_observations("", &ParseOptions::default()).is_empty());
    }

    #[test]
    fn keeps_file_order_for_duplicate_dates() {
        let text = "Werte:\n01.01.2000;2,0\n01.01.2000;1,0\n";
        let obs = parse_observations(text, &ParseOptions::default());
        assert_eq!(obs.len(), 2);
        assert!((obs[0].value - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_calendar_date_is_skipped() {
        let text = "Werte:\n31.02.2000;2,0\n01.03.2000;1,0\n";
        assert_eq!(parse_observations(text, &ParseOptions::default()).len(), 1);
    }
}
