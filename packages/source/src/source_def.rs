//! Config-driven upstream table definition.
//!
//! [`SourceDefinition`] captures everything unique about one upstream
//! table: where it lives, which column orders it in time, which columns
//! carry the title/location/person fields, and (for the corrections
//! registry) the secondary table that enriches its rows. A single generic
//! implementation turns any of them into queries and canonical rows.

use blotter_incident_models::{
    CanonicalIncident, Coordinate, CorrelatedResult, CorrelatedType, SourceRecord, SourceType,
    field, field_text, first_text, join_text,
};
use blotter_sql::{CompareOp, Filter, OrderBy, SelectQuery, SqlError};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::parsing::parse_timestamp;

const fn default_limit() -> u32 {
    100
}

// ── Top-level source definition ──────────────────────────────────────────

/// A complete, config-driven upstream table definition.
///
/// Loaded from TOML files at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SourceDefinition {
    /// Unique identifier (e.g., `"arrests"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Provenance tag stamped on every row.
    pub source_type: SourceType,
    /// Upstream table, optionally schema-qualified (`dbo.cadHandler`).
    pub table: String,
    /// Column holding the event time; rows are read newest-first by it.
    pub time_column: String,
    /// Predicate fixed for this source, in filter syntax. Several sources
    /// share a table and are told apart by it (e.g. `[key] = 'AR'`).
    #[serde(default)]
    pub scope: Option<String>,
    /// Whether this source contributes to the combined incident feed.
    #[serde(default)]
    pub feed: bool,
    /// Row limit when a caller does not give one.
    #[serde(default = "default_limit")]
    pub default_limit: u32,
    /// Field name mappings for normalization.
    pub fields: FieldMapping,
    /// Person columns, for sources the correlator searches by name.
    #[serde(default)]
    pub person: Option<PersonMapping>,
}

// ── Field mapping ────────────────────────────────────────────────────────

/// Fallback chains for the common columns. The first non-empty field wins.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldMapping {
    /// Record identifier.
    pub id: Vec<String>,
    /// Nature/charge text.
    pub title: Vec<String>,
    /// Free-text address.
    #[serde(default)]
    pub location: Vec<String>,
}

/// How a source names people.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PersonMapping {
    /// First-name column.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Last-name column.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Single full-name column, for tables without split names.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Display-name fallback chain.
    #[serde(default)]
    pub display_name: Vec<String>,
    /// Columns joined with spaces when no display-name field is set.
    #[serde(default)]
    pub name_parts: Vec<String>,
    /// Columns joined into the result's details text.
    #[serde(default)]
    pub details: Vec<String>,
    /// Column holding a case number that keys [`PersonMapping::detail`].
    #[serde(default)]
    pub case_number: Option<String>,
    /// Secondary table enriching each row.
    #[serde(default)]
    pub detail: Option<DetailTable>,
}

/// A secondary table joined client-side on a case number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DetailTable {
    /// Table name.
    pub table: String,
    /// Column matching [`PersonMapping::case_number`].
    pub key: String,
    /// Columns aggregated into the result's details text.
    #[serde(default)]
    pub details: Vec<String>,
    /// Address columns.
    #[serde(default)]
    pub location: Vec<String>,
    /// Column naming the supervision kind (probation, parole, ...).
    #[serde(default)]
    pub kind_field: Option<String>,
}

impl PersonMapping {
    /// The person's display name for `record`.
    #[must_use]
    pub fn display_name(&self, record: &SourceRecord) -> Option<String> {
        first_text(record, &self.display_name)
            .or_else(|| join_text(record, &self.name_parts, " "))
            .or_else(|| {
                self.full_name
                    .as_deref()
                    .and_then(|name| field_text(record, name))
            })
            .or_else(|| {
                let split: Vec<String> = self
                    .first_name
                    .iter()
                    .chain(self.last_name.iter())
                    .cloned()
                    .collect();
                join_text(record, &split, " ")
            })
    }

    /// Whether names are split across first/last columns.
    #[must_use]
    pub const fn has_split_name(&self) -> bool {
        self.first_name.is_some() && self.last_name.is_some()
    }
}

/// Supervision kind named by a detail row, mapped onto a result tag.
/// Anything not recognizably probation or parole is a plain corrections
/// record.
#[must_use]
pub fn supervision_kind(text: Option<&str>) -> CorrelatedType {
    let Some(text) = text else {
        return CorrelatedType::Doc;
    };
    let lower = text.to_lowercase();
    if lower.contains("parole") {
        CorrelatedType::Parole
    } else if lower.contains("probation") {
        CorrelatedType::Probation
    } else {
        CorrelatedType::Doc
    }
}

// ── Query building ───────────────────────────────────────────────────────

impl SourceDefinition {
    /// The fixed [`SourceDefinition::scope`] predicate, parsed.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidFilter`] if the configured scope does not
    /// parse.
    pub fn scope_filter(&self) -> Result<Option<Filter>, SqlError> {
        self.scope.as_deref().map(Filter::parse).transpose()
    }

    /// `SELECT * FROM <table> [WHERE <scope>] ORDER BY <time> DESC`, with
    /// the default row limit.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::InvalidFilter`] if the configured scope does not
    /// parse.
    pub fn base_query(&self) -> Result<SelectQuery, SqlError> {
        Ok(SelectQuery::table(&self.table)
            .filter_opt(self.scope_filter()?)
            .order_by(OrderBy::desc(&self.time_column))
            .top(Some(self.default_limit)))
    }

    /// Restricts [`SourceDefinition::time_column`] to whole days: from the
    /// start of `from` up to the end of `to`, both inclusive.
    #[must_use]
    pub fn date_range_filter(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Option<Filter> {
        let lower = from.map(|day| {
            Filter::compare(
                &self.time_column,
                CompareOp::GtEq,
                day.format("%Y-%m-%d").to_string(),
            )
        });
        let upper = to.map(|day| match day.checked_add_days(Days::new(1)) {
            Some(next) => Filter::compare(
                &self.time_column,
                CompareOp::Lt,
                next.format("%Y-%m-%d").to_string(),
            ),
            None => Filter::compare(
                &self.time_column,
                CompareOp::LtEq,
                day.format("%Y-%m-%d").to_string(),
            ),
        });

        match (lower, upper) {
            (None, None) => None,
            (lower, upper) => Some(Filter::and(lower.into_iter().chain(upper))),
        }
    }

    // ── Row normalization ────────────────────────────────────────────────

    /// When the row's event happened.
    #[must_use]
    pub fn occurred_at(&self, record: &SourceRecord) -> Option<DateTime<Utc>> {
        let parsed = field(record, &self.time_column).and_then(parse_timestamp);
        if parsed.is_none() && field_text(record, &self.time_column).is_some() {
            log::trace!(
                "{}: unparseable {} value {:?}",
                self.id,
                self.time_column,
                field(record, &self.time_column)
            );
        }
        parsed
    }

    /// Record identifier.
    #[must_use]
    pub fn record_id(&self, record: &SourceRecord) -> Option<String> {
        first_text(record, &self.fields.id)
    }

    /// Nature/charge text, empty when the row has none.
    #[must_use]
    pub fn title(&self, record: &SourceRecord) -> String {
        first_text(record, &self.fields.title).unwrap_or_default()
    }

    /// Free-text address.
    #[must_use]
    pub fn location(&self, record: &SourceRecord) -> Option<String> {
        first_text(record, &self.fields.location)
    }

    /// Projects `record` into the combined feed shape.
    #[must_use]
    pub fn to_incident(
        &self,
        record: SourceRecord,
        coordinate: Option<Coordinate>,
    ) -> CanonicalIncident {
        CanonicalIncident {
            source_id: self.id.clone(),
            source_type: self.source_type,
            occurred_at: self.occurred_at(&record),
            title: self.title(&record),
            location: self.location(&record),
            coordinate,
            raw: record,
        }
    }

    /// Projects `record` into a person-search result tagged with this
    /// source's type.
    #[must_use]
    pub fn to_correlated(
        &self,
        record: SourceRecord,
        coordinate: Option<Coordinate>,
    ) -> CorrelatedResult {
        let (name, details) = self.person.as_ref().map_or_else(
            || (String::new(), None),
            |person| {
                (
                    person.display_name(&record).unwrap_or_default(),
                    join_text(&record, &person.details, "; "),
                )
            },
        );

        CorrelatedResult {
            id: self.record_id(&record),
            result_type: CorrelatedType::from(self.source_type),
            source_id: self.id.clone(),
            name,
            date: self.occurred_at(&record),
            details: details.or_else(|| first_text(&record, &self.fields.title)),
            location: self.location(&record),
            coordinate,
            raw: record,
        }
    }
}

/// Parses a single TOML source definition.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or missing required fields.
pub fn parse_source_toml(toml_str: &str) -> Result<SourceDefinition, toml::de::Error> {
    toml::de::from_str(toml_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: serde_json::Value) -> SourceRecord {
        value.as_object().cloned().unwrap()
    }

    fn arrests() -> SourceDefinition {
        parse_source_toml(include_str!("../sources/arrests.toml")).unwrap()
    }

    #[test]
    fn base_query_applies_scope_and_order() {
        let sql = arrests().base_query().unwrap().top(Some(5)).to_sql().unwrap();
        assert_eq!(
            sql,
            "SELECT TOP 5 * FROM [dbo].[DailyBulletinArrests] WHERE [key] = 'AR' ORDER BY [event_time] DESC"
        );
    }

    #[test]
    fn date_range_covers_whole_days() {
        let def = arrests();
        let filter = def
            .date_range_filter(
                NaiveDate::from_ymd_opt(2024, 1, 1),
                NaiveDate::from_ymd_opt(2024, 1, 2),
            )
            .unwrap();
        assert_eq!(
            filter.to_sql().unwrap(),
            "[event_time] >= '2024-01-01' AND [event_time] < '2024-01-03'"
        );
        assert!(def.date_range_filter(None, None).is_none());
    }

    #[test]
    fn to_incident_reads_mapped_fields() {
        let row = record(serde_json::json!({
            "id": 7,
            "key": "AR",
            "event_time": "2024-01-01 10:00:00",
            "charge": "PETIT LARCENY",
            "location": "100 MAIN ST",
        }));
        let incident = arrests().to_incident(row, Some(Coordinate::new(42.1, -75.9)));

        assert_eq!(incident.source_id, "arrests");
        assert_eq!(incident.source_type, SourceType::Arrest);
        assert_eq!(incident.title, "PETIT LARCENY");
        assert_eq!(incident.location.as_deref(), Some("100 MAIN ST"));
        assert_eq!(
            incident.occurred_at.unwrap().to_string(),
            "2024-01-01 10:00:00 UTC"
        );
        assert_eq!(incident.latitude(), Some(42.1));
    }

    #[test]
    fn to_correlated_builds_display_name() {
        let row = record(serde_json::json!({
            "id": "9",
            "firstname": "JOHN",
            "middlename": "Q",
            "lastname": "SMITH",
            "charge": "DWI",
        }));
        let result = arrests().to_correlated(row, None);

        assert_eq!(result.name, "JOHN Q SMITH");
        assert_eq!(result.result_type, CorrelatedType::Arrest);
        assert_eq!(result.details.as_deref(), Some("DWI"));
        assert_eq!(result.id.as_deref(), Some("9"));
    }

    #[test]
    fn display_name_prefers_explicit_field() {
        let person = arrests().person.unwrap();
        let row = record(serde_json::json!({"name": "SMITH, JOHN", "firstname": "JOHN"}));
        assert_eq!(person.display_name(&row).as_deref(), Some("SMITH, JOHN"));
        assert!(person.has_split_name());
    }

    #[test]
    fn supervision_kind_mapping() {
        assert_eq!(supervision_kind(Some("Active Parole")), CorrelatedType::Parole);
        assert_eq!(supervision_kind(Some("PROBATION")), CorrelatedType::Probation);
        assert_eq!(supervision_kind(Some("Discharged")), CorrelatedType::Doc);
        assert_eq!(supervision_kind(None), CorrelatedType::Doc);
    }
}
