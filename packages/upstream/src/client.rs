//! Source Query Client.
//!
//! Builds source-specific `SELECT` statements, validates them, and
//! dispatches them to an [`UpstreamStore`] under a per-call deadline. There
//! is no retry: a failed call propagates to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use blotter_incident_models::SourceRecord;
use blotter_sql::{Filter, OrderBy, SelectQuery, assert_select_only, quote_identifier};

use crate::{ColumnDescriptor, UpstreamError, UpstreamStore};

/// Default per-call deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Validating, deadline-enforcing front end to an [`UpstreamStore`].
#[derive(Clone)]
pub struct SourceQueryClient {
    store: Arc<dyn UpstreamStore>,
    timeout: Duration,
}

impl std::fmt::Debug for SourceQueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceQueryClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl SourceQueryClient {
    /// Wraps `store` with the given per-call deadline.
    #[must_use]
    pub fn new(store: Arc<dyn UpstreamStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    async fn with_deadline<T>(
        &self,
        call: impl Future<Output = Result<T, UpstreamError>> + Send,
    ) -> Result<T, UpstreamError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| UpstreamError::timeout(self.timeout))?
    }

    /// Builds and runs `SELECT TOP <limit> <columns|*> FROM <table> [WHERE
    /// <filter>] [ORDER BY <order_by>]`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Sql`] for a bad identifier or filter (no
    /// network call is made), otherwise any error from the store.
    pub async fn query(
        &self,
        table: &str,
        columns: &[String],
        filter: Option<&Filter>,
        order_by: &[OrderBy],
        limit: Option<u32>,
    ) -> Result<Vec<SourceRecord>, UpstreamError> {
        let select = order_by.iter().cloned().fold(
            SelectQuery::table(table)
                .columns(columns.iter().cloned())
                .filter_opt(filter.cloned())
                .top(limit),
            SelectQuery::order_by,
        );
        self.select(&select).await
    }

    /// Renders and runs a prepared [`SelectQuery`].
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Sql`] if the query fails to render,
    /// otherwise any error from the store.
    pub async fn select(&self, query: &SelectQuery) -> Result<Vec<SourceRecord>, UpstreamError> {
        let sql = query.to_sql()?;
        self.raw(&sql).await
    }

    /// Runs a caller-supplied statement after the `SELECT`-only check.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Sql`] for a non-`SELECT` statement,
    /// [`UpstreamError::Timeout`] if the deadline elapses, otherwise any
    /// error from the store.
    pub async fn raw(&self, sql: &str) -> Result<Vec<SourceRecord>, UpstreamError> {
        assert_select_only(sql)?;
        log::debug!("Dispatching upstream query: {sql}");
        self.with_deadline(self.store.query(sql)).await
    }

    /// Lists the store's tables.
    ///
    /// # Errors
    ///
    /// Returns any error from the store, or [`UpstreamError::Timeout`].
    pub async fn list_tables(&self) -> Result<Vec<String>, UpstreamError> {
        self.with_deadline(self.store.list_tables()).await
    }

    /// Describes `table`'s columns. The name is validated first.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Sql`] for a bad table name, otherwise any
    /// error from the store.
    pub async fn schema(&self, table: &str) -> Result<Vec<ColumnDescriptor>, UpstreamError> {
        quote_identifier(table)?;
        self.with_deadline(self.store.schema(table)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use blotter_sql::SqlError;

    use super::*;

    #[derive(Default)]
    struct RecordingStore {
        statements: Mutex<Vec<String>>,
        delay: Option<Duration>,
    }

    impl RecordingStore {
        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpstreamStore for RecordingStore {
        async fn list_tables(&self) -> Result<Vec<String>, UpstreamError> {
            Ok(vec!["dbo.cadHandler".to_string()])
        }

        async fn schema(&self, _table: &str) -> Result<Vec<ColumnDescriptor>, UpstreamError> {
            Ok(Vec::new())
        }

        async fn query(&self, sql: &str) -> Result<Vec<SourceRecord>, UpstreamError> {
            self.statements.lock().unwrap().push(sql.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let row = serde_json::json!({"id": 1});
            Ok(vec![row.as_object().cloned().unwrap()])
        }
    }

    fn client(store: &Arc<RecordingStore>, timeout: Duration) -> SourceQueryClient {
        SourceQueryClient::new(store.clone(), timeout)
    }

    #[tokio::test]
    async fn query_renders_and_dispatches_statement() {
        let store = Arc::new(RecordingStore::default());
        let rows = client(&store, DEFAULT_TIMEOUT)
            .query(
                "dbo.cadHandler",
                &["starttime".to_string(), "nature".to_string()],
                Some(&Filter::equals("agency", "PD")),
                &[OrderBy::desc("starttime")],
                Some(2),
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            store.statements(),
            vec![
                "SELECT TOP 2 [starttime], [nature] FROM [dbo].[cadHandler] \
                 WHERE [agency] = 'PD' ORDER BY [starttime] DESC"
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn invalid_identifier_never_reaches_the_store() {
        let store = Arc::new(RecordingStore::default());
        let result = client(&store, DEFAULT_TIMEOUT)
            .query("cadHandler; DROP TABLE x", &[], None, &[], None)
            .await;

        assert!(matches!(
            result,
            Err(UpstreamError::Sql(SqlError::InvalidIdentifier { .. }))
        ));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn raw_rejects_non_select() {
        let store = Arc::new(RecordingStore::default());
        let result = client(&store, DEFAULT_TIMEOUT)
            .raw("  update dbo.cadHandler set nature = 'x'")
            .await;

        assert!(matches!(
            result,
            Err(UpstreamError::Sql(SqlError::RejectedStatement))
        ));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn slow_store_surfaces_timeout() {
        let store = Arc::new(RecordingStore {
            delay: Some(Duration::from_secs(5)),
            ..RecordingStore::default()
        });
        let result = client(&store, Duration::from_millis(20))
            .raw("SELECT 1")
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout { millis: 20 }));
        assert_eq!(err.to_string(), "Upstream call timed out after 20ms");
    }

    #[tokio::test]
    async fn schema_validates_table_name() {
        let store = Arc::new(RecordingStore::default());
        let client = client(&store, DEFAULT_TIMEOUT);
        assert!(client.schema("dbo.cadHandler").await.is_ok());
        assert!(matches!(
            client.schema("x'--").await,
            Err(UpstreamError::Sql(SqlError::InvalidIdentifier { .. }))
        ));
    }
}
