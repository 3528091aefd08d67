#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Persisted station and region collections.
//!
//! A collection is a JSON array of objects keyed by one string field.
//! Every pipeline stage owns a [`FieldGroup`]: a fixed set of top-level
//! fields it is allowed to write. [`Collection::merge`] removes the
//! group's fields from each updated record and writes the new values,
//! leaving every other field untouched, so merging the same input twice
//! yields the same document.
//!
//! Saving goes through a sibling `.tmp` file and a rename, and object keys
//! are always written in sorted order.

pub mod annotate;
pub mod groups;

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

pub use annotate::{annotate_geojson, load_geojson, station_features};
pub use groups::{FieldGroup, InsertPolicy};

/// Errors that can occur while loading, merging or saving collections.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A required upstream file does not exist.
    #[error("Required input {path} does not exist; run the producing stage first")]
    MissingInput { path: String },

    /// A file is not valid JSON.
    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    /// A document does not have the expected structure.
    #[error("Invalid collection {path}: {reason}")]
    Invalid { path: String, reason: String },

    /// Two records share a key.
    #[error("Duplicate key '{key}' in {path}")]
    DuplicateKey { path: String, key: String },

    /// Records could not be converted to or from typed values.
    #[error("Conversion error: {0}")]
    Convert(#[from] serde_json::Error),
}

/// Outcome counts of [`Collection::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub updated: usize,
    pub inserted: usize,
    /// Keys not in the collection that the group may not insert.
    pub unknown: Vec<String>,
}

/// An ordered, key-unique list of JSON objects.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    key_field: String,
    records: Vec<Map<String, Value>>,
}

impl Collection {
    #[must_use]
    pub fn new(key_field: &str) -> Self {
        Self {
            key_field: key_field.to_string(),
            records: Vec::new(),
        }
    }

    /// Loads a collection that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingInput`] if `path` does not exist, or an
    /// error if it cannot be read or fails validation.
    pub fn load(path: &Path, key_field: &str) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::MissingInput {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
        let collection = Self::from_value(value, key_field, &path.display().to_string())?;
        log::debug!("Loaded {} records from {}", collection.len(), path.display());
        Ok(collection)
    }

    /// Loads a collection, or starts an empty one if `path` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or fails
    /// validation.
    pub fn load_or_empty(path: &Path, key_field: &str) -> Result<Self, StoreError> {
        if path.exists() {
            Self::load(path, key_field)
        } else {
            log::info!("{} does not exist yet, starting empty", path.display());
            Ok(Self::new(key_field))
        }
    }

    /// Validates a parsed document: an array of objects, each with a
    /// unique string key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] or [`StoreError::DuplicateKey`].
    pub fn from_value(value: Value, key_field: &str, source: &str) -> Result<Self, StoreError> {
        let invalid = |reason: String| StoreError::Invalid {
            path: source.to_string(),
            reason,
        };

        let Value::Array(items) = value else {
            return Err(invalid("expected a JSON array".to_string()));
        };

        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            let Value::Object(record) = item else {
                return Err(invalid(format!("element {i} is not an object")));
            };
            let Some(key) = record.get(key_field).and_then(Value::as_str) else {
                return Err(invalid(format!(
                    "element {i} has no string '{key_field}' field"
                )));
            };
            if !seen.insert(key.to_string()) {
                return Err(StoreError::DuplicateKey {
                    path: source.to_string(),
                    key: key.to_string(),
                });
            }
            records.push(record);
        }

        Ok(Self {
            key_field: key_field.to_string(),
            records,
        })
    }

    #[must_use]
    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn records(&self) -> &[Map<String, Value>] {
        &self.records
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Map<String, Value>> {
        self.position(key).map(|i| &self.records[i])
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|r| r.get(&self.key_field).and_then(Value::as_str) == Some(key))
    }

    /// Converts every record to `T`, ignoring fields `T` does not know.
    ///
    /// # Errors
    ///
    /// Returns an error if a record does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        self.records
            .iter()
            .map(|r| serde_json::from_value(Value::Object(r.clone())).map_err(StoreError::from))
            .collect()
    }

    /// Writes `group`'s fields of each item into the matching record.
    ///
    /// Fields the item omits are removed from the record, so a cleared
    /// optional value does not linger. Records without a matching item
    /// are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if an item does not serialize to an object with a
    /// string key.
    pub fn merge<T: Serialize>(
        &mut self,
        group: &FieldGroup,
        items: &[T],
    ) -> Result<MergeSummary, StoreError> {
        let mut summary = MergeSummary::default();

        for item in items {
            let Value::Object(mut fields) = serde_json::to_value(item)? else {
                return Err(StoreError::Invalid {
                    path: group.name.to_string(),
                    reason: "merge item is not an object".to_string(),
                });
            };
            let Some(key) = fields
                .get(&self.key_field)
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                return Err(StoreError::Invalid {
                    path: group.name.to_string(),
                    reason: format!("merge item has no string '{}' field", self.key_field),
                });
            };

            let record = if let Some(i) = self.position(&key) {
                summary.updated += 1;
                &mut self.records[i]
            } else if group.insert == InsertPolicy::Insert {
                summary.inserted += 1;
                let mut record = Map::new();
                record.insert(self.key_field.clone(), Value::from(key));
                self.records.push(record);
                let last = self.records.len() - 1;
                &mut self.records[last]
            } else {
                summary.unknown.push(key);
                continue;
            };

            for &field in group.fields {
                if field == self.key_field {
                    continue;
                }
                record.remove(field);
                if let Some(value) = fields.remove(field) {
                    record.insert(field.to_string(), value);
                }
            }
        }

        log::info!(
            "Merged {} group: {} updated, {} inserted, {} unknown",
            group.name,
            summary.updated,
            summary.inserted,
            summary.unknown.len()
        );
        if !summary.unknown.is_empty() {
            log::warn!(
                "{} group cannot insert new records; skipped keys: {}",
                group.name,
                summary.unknown.join(", ")
            );
        }
        Ok(summary)
    }

    /// Drops records whose key is not in `keys` and returns the dropped
    /// keys in collection order.
    ///
    /// Only the stage that owns a collection's identity group calls this.
    pub fn retain_keys(&mut self, keys: &BTreeSet<String>) -> Vec<String> {
        let mut dropped = Vec::new();
        let key_field = &self.key_field;
        self.records.retain(|record| {
            let key = record.get(key_field).and_then(Value::as_str).unwrap_or_default();
            if keys.contains(key) {
                true
            } else {
                dropped.push(key.to_string());
                false
            }
        });

        if !dropped.is_empty() {
            log::warn!(
                "Dropped {} records no longer in the input: {}",
                dropped.len(),
                dropped.join(", ")
            );
        }
        dropped
    }

    /// Pretty-printed JSON with sorted object keys.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_pretty_string(&self) -> Result<String, StoreError> {
        let array = Value::Array(self.records.iter().cloned().map(Value::Object).collect());
        Ok(serde_json::to_string_pretty(&array)?)
    }

    /// Atomically writes the collection to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_atomic(path, &self.to_pretty_string()?)?;
        log::info!("Wrote {} records to {}", self.len(), path.display());
        Ok(())
    }
}

/// Writes `contents` to a sibling `.tmp` file and renames it over `path`.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if any filesystem step fails.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    std::fs::write(&tmp, contents).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
