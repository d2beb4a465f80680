#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the blotter gateway.
//!
//! Every successful response is wrapped in [`ApiResponse`] (`{data, meta}`);
//! failures are an [`ApiError`] body. Query parameter names are camelCase to
//! match what the UI already sends.

use std::collections::BTreeMap;

use blotter_incident_models::Coordinate;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Envelope ────────────────────────────────────────────────────────

/// Successful response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Payload.
    pub data: T,
    /// Paging and partial-failure details, when the endpoint has any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ApiMeta>,
}

impl<T> ApiResponse<T> {
    /// Wraps `data` with no metadata.
    pub const fn new(data: T) -> Self {
        Self { data, meta: None }
    }

    /// Wraps `data` with `meta`.
    pub const fn with_meta(data: T, meta: ApiMeta) -> Self {
        Self {
            data,
            meta: Some(meta),
        }
    }
}

/// Response metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMeta {
    /// Whether another page follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    /// Effective page number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Effective page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    /// Sources that could not be read; their rows are missing.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_sources: Vec<String>,
}

/// Error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
}

// ── Passthrough ─────────────────────────────────────────────────────

/// Query parameters for `GET /api/schema`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaParams {
    /// Table name.
    pub table: String,
}

/// Query parameters for `GET /api/query`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableQueryParams {
    /// Table name.
    pub table: String,
    /// Comma-separated column names. All columns when absent.
    pub columns: Option<String>,
    /// Row limit, capped upstream-side at 1000.
    pub limit: Option<u32>,
    /// Filter expression.
    pub filters: Option<String>,
    /// Comma-separated `column [ASC|DESC]` list.
    pub order_by: Option<String>,
}

impl TableQueryParams {
    /// The requested columns, trimmed, blanks dropped.
    #[must_use]
    pub fn column_list(&self) -> Vec<String> {
        split_list(self.columns.as_deref())
    }
}

/// Body of `POST /api/query`: a bare JSON string or `{"sql": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SqlBody {
    /// `"SELECT ..."`
    Text(String),
    /// `{"sql": "SELECT ..."}`
    Wrapped {
        /// The statement.
        sql: String,
    },
}

impl SqlBody {
    /// The statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        match self {
            Self::Text(sql) | Self::Wrapped { sql } => sql,
        }
    }
}

/// Query parameters for `GET /api/geocode`.
#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeParams {
    /// Free-text address.
    pub q: Option<String>,
}

// ── Aggregation ─────────────────────────────────────────────────────

/// Query parameters for `GET /api/incidents`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentQueryParams {
    /// Dispatch row limit.
    pub cad_limit: Option<u32>,
    /// Arrest row limit.
    pub arrest_limit: Option<u32>,
    /// Crime (LW) row limit.
    pub crime_limit: Option<u32>,
    /// Traffic citation row limit.
    pub citation_limit: Option<u32>,
    /// Traffic accident row limit.
    pub accident_limit: Option<u32>,
    /// Limit for every source without its own.
    pub limit: Option<u32>,
    /// First day to include (`YYYY-MM-DD`).
    pub date_from: Option<NaiveDate>,
    /// Last day to include (`YYYY-MM-DD`).
    pub date_to: Option<NaiveDate>,
    /// Filter expression applied to every source.
    pub filters: Option<String>,
    /// Radius around the center, in kilometres.
    pub distance_km: Option<f64>,
    /// Center latitude.
    pub center_lat: Option<f64>,
    /// Center longitude.
    pub center_lng: Option<f64>,
}

impl IncidentQueryParams {
    /// Per-source limits keyed by source id.
    #[must_use]
    pub fn source_limits(&self) -> BTreeMap<String, u32> {
        [
            ("dispatch", self.cad_limit),
            ("arrests", self.arrest_limit),
            ("crime", self.crime_limit),
            ("traffic_citations", self.citation_limit),
            ("traffic_accidents", self.accident_limit),
        ]
        .into_iter()
        .filter_map(|(id, limit)| limit.map(|l| (id.to_string(), l)))
        .collect()
    }

    /// Center and radius, when all three are given.
    #[must_use]
    pub fn radius(&self) -> Option<(Coordinate, f64)> {
        radius(self.center_lat, self.center_lng, self.distance_km)
    }
}

/// Query parameters for `GET /api/proximity`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityQueryParams {
    /// Center address.
    pub address: Option<String>,
    /// Days back to search.
    pub days: Option<u32>,
    /// Substring of the call nature.
    pub nature: Option<String>,
    /// Radius in feet.
    pub distance: Option<f64>,
}

// ── Correlation ─────────────────────────────────────────────────────

/// Query parameters for `GET /api/search360` and `GET /api/searchP2C`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryParams {
    /// Name to search for.
    #[serde(alias = "name")]
    pub q: Option<String>,
    /// 1-based page.
    pub page: Option<u32>,
    /// Rows per page.
    pub page_size: Option<u32>,
    /// Radius around the center, in kilometres.
    pub distance_km: Option<f64>,
    /// Center latitude.
    pub center_lat: Option<f64>,
    /// Center longitude.
    pub center_lng: Option<f64>,
}

impl SearchQueryParams {
    /// Center and radius, when all three are given.
    #[must_use]
    pub fn radius(&self) -> Option<(Coordinate, f64)> {
        radius(self.center_lat, self.center_lng, self.distance_km)
    }
}

/// Query parameters for `GET /api/offender`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffenderQueryParams {
    /// Offender number.
    pub number: Option<String>,
    /// First name, used with `last` when no number is given.
    pub first: Option<String>,
    /// Last name.
    pub last: Option<String>,
}

/// Query parameters for `GET /api/records/{source}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordsQueryParams {
    /// 1-based page.
    pub page: Option<u32>,
    /// Rows per page.
    pub page_size: Option<u32>,
}

fn radius(lat: Option<f64>, lng: Option<f64>, km: Option<f64>) -> Option<(Coordinate, f64)> {
    Some((Coordinate::new(lat?, lng?), km?))
}

fn split_list(text: Option<&str>) -> Vec<String> {
    text.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
