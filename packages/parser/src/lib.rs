#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Readers for raw hydrological station data.
//!
//! Two input shapes are supported:
//!
//! - **Record files** ([`record`]): one station per file, a block of
//!   `Key:;value` header lines, a `Werte:` sentinel, then
//!   `dd.mm.yyyy HH:MM:SS;value` rows with decimal commas. Parsing never
//!   fails on content; malformed rows are skipped.
//! - **Station listings** ([`listing`]): semicolon-delimited tables that
//!   carry station identity, labels and projected coordinates.
//!
//! Files are usually Latin-1 encoded; [`decode_text`] accepts either
//! UTF-8 or Latin-1 bytes.

pub mod listing;
pub mod record;

pub use listing::{ListingColumns, ListingEntry, parse_listing, read_listing};
pub use record::{ParseOptions, ParsedRecord, RecordHeader, parse_record, read_record};

/// Errors that can occur while reading station inputs.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Filesystem I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The listing table could not be read at all.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A configured listing column is not present in the header row.
    #[error("Listing is missing column '{column}'")]
    MissingColumn { column: String },
}

/// Decodes file bytes as UTF-8, falling back to Latin-1.
///
/// Latin-1 maps every byte to the code point of the same value, so the
/// fallback cannot fail.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    std::str::from_utf8(bytes).map_or_else(
        |_| bytes.iter().map(|&b| char::from(b)).collect(),
        str::to_string,
    )
}

/// Reads a file and decodes it with [`decode_text`].
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read.
pub fn read_text(path: &std::path::Path) -> Result<String, ParseError> {
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(decode_text(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_latin1_fallback() {
        let bytes = b"Gew\xe4sser:;Mur";
        assert_eq!(decode_text(bytes), "Gewässer:;Mur");
    }

    #[test]
    fn decodes_utf8_unchanged() {
        assert_eq!(decode_text("Lücke".as_bytes()), "Lücke");
    }
}
