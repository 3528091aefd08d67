//! Field ownership of each pipeline stage.

/// Whether a group may create records that do not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPolicy {
    Insert,
    UpdateOnly,
}

/// A named set of top-level record fields written by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGroup {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub insert: InsertPolicy,
}

/// Station registration: identity and metadata.
pub const STATION_IDENTITY: FieldGroup = FieldGroup {
    name: "station identity",
    fields: &["id", "name", "kind", "label", "catchment_km2"],
    insert: InsertPolicy::Insert,
};

/// Coordinate registration and correction.
pub const STATION_LOCATION: FieldGroup = FieldGroup {
    name: "station location",
    fields: &["location", "location_excluded"],
    insert: InsertPolicy::UpdateOnly,
};

/// Trend estimation.
pub const STATION_TREND: FieldGroup = FieldGroup {
    name: "station trend",
    fields: &["trend"],
    insert: InsertPolicy::UpdateOnly,
};

/// Region loading from boundaries.
pub const REGION_IDENTITY: FieldGroup = FieldGroup {
    name: "region identity",
    fields: &["key", "name", "latitude", "longitude"],
    insert: InsertPolicy::Insert,
};

/// Spatial aggregation.
pub const REGION_SUMMARIES: FieldGroup = FieldGroup {
    name: "region summaries",
    fields: &["summaries"],
    insert: InsertPolicy::UpdateOnly,
};

/// Risk composition.
pub const REGION_RISK: FieldGroup = FieldGroup {
    name: "region risk",
    fields: &["risk"],
    insert: InsertPolicy::UpdateOnly,
};
