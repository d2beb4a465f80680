#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical incident types shared across the blotter workspace.
//!
//! Every upstream table (dispatch log, daily bulletin, jail roster,
//! corrections registry, sex-offender registry) is read as an open
//! [`SourceRecord`] and projected into either a [`CanonicalIncident`] (the
//! combined activity feed) or a [`CorrelatedResult`] (the cross-source
//! person search).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// A raw upstream row. Field names, casing and value types vary per table.
pub type SourceRecord = serde_json::Map<String, serde_json::Value>;

/// Which upstream feed a canonical incident originated from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceType {
    /// Computer-aided dispatch call
    Dispatch,
    /// Custodial arrest from the daily bulletin
    Arrest,
    /// Crime report entry from the daily bulletin
    Crime,
    /// Traffic citation
    TrafficCitation,
    /// Traffic accident report
    TrafficAccident,
    /// Probation/parole case
    Probation,
    /// Jail booking
    Jail,
    /// Sex-offender registration
    SexOffender,
}

impl SourceType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Dispatch,
            Self::Arrest,
            Self::Crime,
            Self::TrafficCitation,
            Self::TrafficAccident,
            Self::Probation,
            Self::Jail,
            Self::SexOffender,
        ]
    }
}

/// Type tag stamped on a [`CorrelatedResult`].
///
/// Serialized as the short codes the bulletin itself uses (`AR`, `LW`,
/// `TC`, `TA`) plus the registry-specific kinds.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum CorrelatedType {
    /// Dispatch call
    #[serde(rename = "CAD")]
    #[strum(serialize = "CAD")]
    Dispatch,
    /// Arrest
    #[serde(rename = "AR")]
    #[strum(serialize = "AR")]
    Arrest,
    /// Crime report
    #[serde(rename = "LW")]
    #[strum(serialize = "LW")]
    Crime,
    /// Traffic citation
    #[serde(rename = "TC")]
    #[strum(serialize = "TC")]
    TrafficCitation,
    /// Traffic accident
    #[serde(rename = "TA")]
    #[strum(serialize = "TA")]
    TrafficAccident,
    /// Jail booking
    #[serde(rename = "JAIL")]
    #[strum(serialize = "JAIL")]
    Jail,
    /// Supervised on probation
    #[serde(rename = "PROBATION")]
    #[strum(serialize = "PROBATION")]
    Probation,
    /// Supervised on parole
    #[serde(rename = "PAROLE")]
    #[strum(serialize = "PAROLE")]
    Parole,
    /// Sex-offender registrant
    #[serde(rename = "SEX_OFFENDER")]
    #[strum(serialize = "SEX_OFFENDER")]
    SexOffender,
    /// Department of Corrections case record without a known supervision kind
    #[serde(rename = "DOC")]
    #[strum(serialize = "DOC")]
    Doc,
}

impl From<SourceType> for CorrelatedType {
    fn from(source_type: SourceType) -> Self {
        match source_type {
            SourceType::Dispatch => Self::Dispatch,
            SourceType::Arrest => Self::Arrest,
            SourceType::Crime => Self::Crime,
            SourceType::TrafficCitation => Self::TrafficCitation,
            SourceType::TrafficAccident => Self::TrafficAccident,
            SourceType::Probation => Self::Probation,
            SourceType::Jail => Self::Jail,
            SourceType::SexOffender => Self::SexOffender,
        }
    }
}

/// A WGS84 position in signed decimal degrees.
///
/// Latitude and longitude only ever travel together, so a record either has
/// a full coordinate or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, positive north.
    pub latitude: f64,
    /// Longitude in degrees, positive east.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate without validation.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Returns `true` if both components are finite and within the valid
    /// degree ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// A source row normalized into the common feed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalIncident {
    /// Identifier of the source definition that produced this row.
    pub source_id: String,
    /// Provenance tag.
    pub source_type: SourceType,
    /// When the event happened, if the row carried a parseable timestamp.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Nature/charge text.
    pub title: String,
    /// Free-text address.
    pub location: Option<String>,
    /// Resolved position. Serialized as top-level `latitude`/`longitude`;
    /// both are omitted when the position is unresolved.
    #[serde(flatten)]
    pub coordinate: Option<Coordinate>,
    /// The originating upstream row.
    pub raw: SourceRecord,
}

impl CanonicalIncident {
    /// Latitude of the resolved coordinate, if any.
    #[must_use]
    pub fn latitude(&self) -> Option<f64> {
        self.coordinate.map(|c| c.latitude)
    }

    /// Longitude of the resolved coordinate, if any.
    #[must_use]
    pub fn longitude(&self) -> Option<f64> {
        self.coordinate.map(|c| c.longitude)
    }
}

/// One upstream row matched by a person search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedResult {
    /// Source-specific record identifier, when the row has one.
    pub id: Option<String>,
    /// Type tag.
    #[serde(rename = "type")]
    pub result_type: CorrelatedType,
    /// Identifier of the source definition that produced this row.
    pub source_id: String,
    /// Display name of the person.
    pub name: String,
    /// Event/booking/registration date.
    pub date: Option<DateTime<Utc>>,
    /// Charge, offense or tier text.
    pub details: Option<String>,
    /// Free-text address.
    pub location: Option<String>,
    /// Resolved position. Serialized as top-level `latitude`/`longitude`;
    /// both are omitted when the position is unresolved.
    #[serde(flatten)]
    pub coordinate: Option<Coordinate>,
    /// The originating upstream row.
    pub raw: SourceRecord,
}

/// Looks up a field by name, falling back to an ASCII case-insensitive match.
#[must_use]
pub fn field<'a>(record: &'a SourceRecord, name: &str) -> Option<&'a serde_json::Value> {
    record.get(name).or_else(|| {
        record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

/// Reads a field as trimmed, non-empty text. Numbers and booleans are
/// rendered with their JSON representation.
#[must_use]
pub fn field_text(record: &SourceRecord, name: &str) -> Option<String> {
    let text = match field(record, name)? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() { None } else { Some(text) }
}

/// Reads a field as a float, accepting JSON numbers and numeric strings.
#[must_use]
pub fn field_f64(record: &SourceRecord, name: &str) -> Option<f64> {
    match field(record, name)? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Returns the first non-empty text value among `names`.
#[must_use]
pub fn first_text(record: &SourceRecord, names: &[String]) -> Option<String> {
    names.iter().find_map(|name| field_text(record, name))
}

/// Joins the non-empty text values of `names` with `separator`.
#[must_use]
pub fn join_text(record: &SourceRecord, names: &[String], separator: &str) -> Option<String> {
    let parts: Vec<String> = names
        .iter()
        .filter_map(|name| field_text(record, name))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(separator))
    }
}
