//! Paged listing of a single source.

use blotter_incident_models::SourceRecord;
use blotter_sql::{OrderBy, SelectQuery};
use serde::Serialize;

use crate::feed::Orchestrator;
use crate::{AggregateError, clamp_page};

/// One page of raw rows from a source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    /// Source id.
    pub source_id: String,
    /// Rows, newest first.
    pub records: Vec<SourceRecord>,
    /// Effective page number.
    pub page: u32,
    /// Effective page size.
    pub page_size: u32,
    /// Whether a full page came back, so another may follow.
    pub has_more: bool,
}

impl Orchestrator {
    /// Lists `source_id` newest first, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::UnknownSource`] for an unconfigured id, or
    /// any upstream error.
    pub async fn list_records(
        &self,
        source_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<RecordPage, AggregateError> {
        let source = self.source(source_id)?;
        let (page, page_size) = clamp_page(page, page_size);
        let offset = u64::from(page - 1) * u64::from(page_size);

        let query = SelectQuery::table(&source.table)
            .filter_opt(source.scope_filter()?)
            .order_by(OrderBy::desc(&source.time_column))
            .page(offset, page_size);

        let records = self.client.select(&query).await?;
        let has_more = records.len() >= usize::try_from(page_size).unwrap_or(usize::MAX);

        Ok(RecordPage {
            source_id: source.id.clone(),
            records,
            page,
            page_size,
            has_more,
        })
    }
}
