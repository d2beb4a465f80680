//! HTTP implementation of [`UpstreamStore`].
//!
//! ```text
//! GET  {base}/tables             -> ["dbo.cadHandler", ...]
//! GET  {base}/schema?table=name  -> [{"name", "type", "skippable"}, ...]
//! POST {base}/query  "SELECT .." -> {"data": [{..}, ..]}
//! ```
//!
//! Every endpoint may answer with either a bare array or a `{"data": [...]}`
//! envelope.

use std::time::Duration;

use async_trait::async_trait;
use blotter_incident_models::SourceRecord;
use blotter_sql::assert_select_only;

use crate::{ColumnDescriptor, UpstreamError, UpstreamStore};

/// Maximum length of an upstream error body carried into an error message.
const ERROR_BODY_LEN: usize = 500;

/// Upstream store reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Creates a client for the store at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::QueryFailed`] if the HTTP client cannot be
    /// constructed (e.g. the TLS backend fails to initialize).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::QueryFailed {
                status: None,
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
        })
    }

    /// The store's base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn transport_error(&self, e: &reqwest::Error) -> UpstreamError {
        if e.is_timeout() {
            UpstreamError::timeout(self.timeout)
        } else {
            UpstreamError::QueryFailed {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<serde_json::Value, UpstreamError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if !status.is_success() {
            let message = if text.len() > ERROR_BODY_LEN {
                let mut end = ERROR_BODY_LEN;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                format!("{}...", &text[..end])
            } else if text.is_empty() {
                status.to_string()
            } else {
                text
            };
            log::warn!("Upstream returned HTTP {status}: {message}");
            return Err(UpstreamError::QueryFailed {
                status: Some(status.as_u16()),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| UpstreamError::Decode {
            message: format!("invalid JSON: {e}"),
        })
    }
}

/// Unwraps a `{"data": [...]}` envelope, or returns a bare array as-is.
fn data_array(body: serde_json::Value) -> Result<Vec<serde_json::Value>, UpstreamError> {
    match body {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(items)) => Ok(items),
            _ => Err(UpstreamError::Decode {
                message: "response object has no data array".to_string(),
            }),
        },
        _ => Err(UpstreamError::Decode {
            message: "response is neither an array nor a data envelope".to_string(),
        }),
    }
}

/// Parses query rows. Every row must be a JSON object.
pub(crate) fn parse_rows(body: serde_json::Value) -> Result<Vec<SourceRecord>, UpstreamError> {
    data_array(body)?
        .into_iter()
        .map(|row| match row {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(UpstreamError::Decode {
                message: format!("row is not an object: {other}"),
            }),
        })
        .collect()
}

/// Parses the table list. Entries are either names or objects carrying a
/// `name`/`TABLE_NAME` field.
pub(crate) fn parse_tables(body: serde_json::Value) -> Result<Vec<String>, UpstreamError> {
    Ok(data_array(body)?
        .into_iter()
        .filter_map(|entry| match entry {
            serde_json::Value::String(name) => Some(name),
            serde_json::Value::Object(map) => ["name", "TABLE_NAME", "table"]
                .iter()
                .find_map(|key| map.get(*key).and_then(|v| v.as_str()).map(String::from)),
            _ => None,
        })
        .collect())
}

pub(crate) fn parse_schema(body: serde_json::Value) -> Result<Vec<ColumnDescriptor>, UpstreamError> {
    data_array(body)?
        .into_iter()
        .map(|column| {
            serde_json::from_value(column).map_err(|e| UpstreamError::Decode {
                message: format!("invalid column descriptor: {e}"),
            })
        })
        .collect()
}

#[async_trait]
impl UpstreamStore for HttpUpstream {
    async fn list_tables(&self) -> Result<Vec<String>, UpstreamError> {
        let body = self
            .send(self.client.get(format!("{}/tables", self.base_url)))
            .await?;
        parse_tables(body)
    }

    async fn schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>, UpstreamError> {
        let body = self
            .send(
                self.client
                    .get(format!("{}/schema", self.base_url))
                    .query(&[("table", table)]),
            )
            .await?;
        parse_schema(body)
    }

    async fn query(&self, sql: &str) -> Result<Vec<SourceRecord>, UpstreamError> {
        assert_select_only(sql)?;
        let body = self
            .send(self.client.post(format!("{}/query", self.base_url)).json(&sql))
            .await?;
        let rows = parse_rows(body)?;
        log::debug!("Upstream returned {} rows", rows.len());
        Ok(rows)
    }
}
