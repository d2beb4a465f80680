#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Access to the upstream tabular data store.
//!
//! The store exposes three read-only endpoints (table list, column schema
//! and a `SELECT`-only query surface). [`UpstreamStore`] abstracts over
//! them so the aggregation layer can be driven by an in-memory fake in
//! tests; [`http::HttpUpstream`] is the real implementation and
//! [`client::SourceQueryClient`] wraps either one with statement building,
//! validation and a per-call deadline.

pub mod client;
pub mod http;

pub use client::SourceQueryClient;
pub use http::HttpUpstream;

use std::time::Duration;

use async_trait::async_trait;
use blotter_incident_models::SourceRecord;
use blotter_sql::SqlError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One column as reported by `GET /schema`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Upstream type name (e.g. `varchar`, `datetime`).
    #[serde(rename = "type", default)]
    pub column_type: String,
    /// Whether the UI may hide this column by default.
    #[serde(default)]
    pub skippable: bool,
}

/// Errors talking to the upstream store.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The statement was rejected locally and never dispatched.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// The store answered with an error status, or could not be reached.
    #[error("Upstream query failed (status {status:?}): {message}")]
    QueryFailed {
        /// HTTP status from the store, when one was received.
        status: Option<u16>,
        /// Upstream error text or transport error description.
        message: String,
    },

    /// The call did not complete within the configured deadline.
    #[error("Upstream call timed out after {millis}ms")]
    Timeout {
        /// The deadline that elapsed, in milliseconds.
        millis: u64,
    },

    /// The store answered 2xx with a body that is not the expected shape.
    #[error("Malformed upstream response: {message}")]
    Decode {
        /// Description of the problem.
        message: String,
    },
}

impl UpstreamError {
    /// A [`Self::Timeout`] for the given deadline.
    #[must_use]
    pub fn timeout(deadline: Duration) -> Self {
        Self::Timeout {
            millis: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// HTTP status reported by the store, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::QueryFailed { status, .. } => *status,
            _ => None,
        }
    }

    /// Returns `true` for errors raised before anything was sent.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Sql(_))
    }
}

/// The upstream store's read surface.
#[async_trait]
pub trait UpstreamStore: Send + Sync {
    /// Lists available table names.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] if the store cannot be reached or answers
    /// with an error.
    async fn list_tables(&self) -> Result<Vec<String>, UpstreamError>;

    /// Describes the columns of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] if the store cannot be reached or answers
    /// with an error.
    async fn schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>, UpstreamError>;

    /// Runs a `SELECT` statement and returns its rows.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] if the statement is rejected, the store
    /// cannot be reached, or it answers with an error.
    async fn query(&self, sql: &str) -> Result<Vec<SourceRecord>, UpstreamError>;
}
