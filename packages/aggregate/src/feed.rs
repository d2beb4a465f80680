//! Combined incident feed.

use std::collections::BTreeMap;

use blotter_geocoder::CachedGeocoder;
use blotter_incident_models::{CanonicalIncident, SourceRecord};
use blotter_resolver::CoordinateResolver;
use blotter_source::SourceDefinition;
use blotter_spatial::RadiusFilter;
use blotter_sql::{Filter, SqlError};
use blotter_upstream::SourceQueryClient;
use chrono::NaiveDate;
use futures::future::join_all;
use serde::Serialize;

use crate::{AggregateError, partition_outcomes};

/// Parameters for [`Orchestrator::get_incidents`].
#[derive(Debug, Clone, Default)]
pub struct IncidentOptions {
    /// Row limits keyed by source id.
    pub limits: BTreeMap<String, u32>,
    /// Limit for sources without an entry in `limits`. Falls back to each
    /// source's configured default.
    pub default_limit: Option<u32>,
    /// First day to include.
    pub date_from: Option<NaiveDate>,
    /// Last day to include.
    pub date_to: Option<NaiveDate>,
    /// Extra predicate applied to every source.
    pub filter: Option<Filter>,
    /// Keeps only incidents within this radius. Incidents without a
    /// coordinate are dropped when set.
    pub radius: Option<RadiusFilter>,
}

/// Merged feed plus the ids of sources that could not be read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentFeed {
    /// Incidents, grouped by source in configuration order, each source
    /// newest first.
    pub incidents: Vec<CanonicalIncident>,
    /// Sources whose query failed.
    pub failed_sources: Vec<String>,
}

/// Runs the feed, proximity and listing flows over the configured sources.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pub(crate) client: SourceQueryClient,
    pub(crate) resolver: CoordinateResolver,
    pub(crate) sources: Vec<SourceDefinition>,
    pub(crate) geocoder: Option<CachedGeocoder>,
    pub(crate) locality: String,
}

impl Orchestrator {
    /// Creates an orchestrator over `sources`.
    #[must_use]
    pub fn new(
        client: SourceQueryClient,
        resolver: CoordinateResolver,
        sources: Vec<SourceDefinition>,
    ) -> Self {
        Self {
            client,
            resolver,
            sources,
            geocoder: None,
            locality: String::new(),
        }
    }

    /// Enables the proximity search, geocoding center addresses with
    /// `locality` appended.
    #[must_use]
    pub fn with_geocoder(mut self, geocoder: CachedGeocoder, locality: &str) -> Self {
        self.geocoder = Some(geocoder);
        self.locality = locality.to_string();
        self
    }

    /// The configured sources.
    #[must_use]
    pub fn sources(&self) -> &[SourceDefinition] {
        &self.sources
    }

    /// The query client.
    #[must_use]
    pub const fn client(&self) -> &SourceQueryClient {
        &self.client
    }

    pub(crate) fn source(&self, id: &str) -> Result<&SourceDefinition, AggregateError> {
        self.sources
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| AggregateError::UnknownSource { id: id.to_string() })
    }

    fn feed_query(
        source: &SourceDefinition,
        options: &IncidentOptions,
    ) -> Result<String, SqlError> {
        let limit = options
            .limits
            .get(&source.id)
            .copied()
            .or(options.default_limit)
            .unwrap_or(source.default_limit);

        source
            .base_query()?
            .top(Some(limit))
            .filter_opt(source.date_range_filter(options.date_from, options.date_to))
            .filter_opt(options.filter.clone())
            .to_sql()
    }

    /// Resolves coordinates for `rows` concurrently and projects them.
    pub(crate) async fn to_incidents(
        &self,
        source: &SourceDefinition,
        rows: Vec<SourceRecord>,
    ) -> Vec<CanonicalIncident> {
        join_all(rows.into_iter().map(|row| async move {
            let coordinate = self.resolver.resolve(&row).await;
            source.to_incident(row, coordinate)
        }))
        .await
    }

    /// Reads every feed source and merges the rows.
    ///
    /// All statements are built before anything is sent, so a bad filter
    /// fails the request without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::Sql`] if a query cannot be built, or the
    /// first [`AggregateError::Upstream`] error if every source failed.
    pub async fn get_incidents(
        &self,
        options: &IncidentOptions,
    ) -> Result<IncidentFeed, AggregateError> {
        let queries = self
            .sources
            .iter()
            .filter(|s| s.feed)
            .map(|source| Ok((source, Self::feed_query(source, options)?)))
            .collect::<Result<Vec<_>, SqlError>>()?;

        let outcomes = join_all(queries.iter().map(|(source, sql)| async move {
            let outcome = match self.client.raw(sql).await {
                Ok(rows) => {
                    log::debug!("{}: {} rows", source.id, rows.len());
                    Ok(self.to_incidents(source, rows).await)
                }
                Err(e) => Err(AggregateError::from(e)),
            };
            (source.id.clone(), outcome)
        }))
        .await;

        let (mut incidents, failed_sources) = partition_outcomes(outcomes)?;

        if let Some(radius) = &options.radius {
            incidents.retain(|incident| radius.admits(incident.coordinate));
        }

        Ok(IncidentFeed {
            incidents,
            failed_sources,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use blotter_incident_models::{Coordinate, SourceType};

    use super::*;
    use crate::test_support::{FakeStore, TableProvider, orchestrator, record};

    fn dispatch_row() -> SourceRecord {
        record(serde_json::json!({
            "id": 1,
            "starttime": "2024-01-01 10:00:00",
            "nature": "TRAFFIC STOP",
            "geox": 500000,
            "geoy": 4649776,
        }))
    }

    fn arrest_row(id: u32) -> SourceRecord {
        record(serde_json::json!({
            "id": id,
            "key": "AR",
            "event_time": format!("2024-01-01 0{}:00:00", id % 10),
            "charge": "PETIT LARCENY",
            "location": "100 MAIN ST",
        }))
    }

    #[tokio::test]
    async fn dispatch_row_with_projected_coordinates() {
        let store = Arc::new(FakeStore::new().rows("[dbo].[cadHandler]", vec![dispatch_row()]));
        let orchestrator = orchestrator(&store, Arc::new(TableProvider::default()));

        let options = IncidentOptions {
            limits: BTreeMap::from([("dispatch".to_string(), 2)]),
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1),
            date_to: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..IncidentOptions::default()
        };
        let feed = orchestrator.get_incidents(&options).await.unwrap();

        assert_eq!(feed.incidents.len(), 1);
        let incident = &feed.incidents[0];
        assert_eq!(incident.source_type, SourceType::Dispatch);
        assert!((incident.latitude().unwrap() - 42.0).abs() < 1e-3);
        assert!(feed.failed_sources.is_empty());

        let cad_sql = store
            .statements()
            .into_iter()
            .find(|s| s.contains("cadHandler"))
            .unwrap();
        assert_eq!(
            cad_sql,
            "SELECT TOP 2 * FROM [dbo].[cadHandler] WHERE [starttime] >= '2024-01-01' \
             AND [starttime] < '2024-01-03' ORDER BY [starttime] DESC"
        );
    }

    #[tokio::test]
    async fn failed_source_contributes_nothing() {
        let store = Arc::new(
            FakeStore::new()
                .failing("[dbo].[cadHandler]", 500)
                .rows("[key] = 'AR'", vec![arrest_row(1), arrest_row(2)]),
        );
        let provider = Arc::new(
            TableProvider::default()
                .with("100 MAIN ST, Binghamton, NY", Coordinate::new(42.1, -75.9)),
        );
        let orchestrator = orchestrator(&store, provider.clone());

        let feed = orchestrator
            .get_incidents(&IncidentOptions::default())
            .await
            .unwrap();

        assert_eq!(feed.failed_sources, vec!["dispatch".to_string()]);
        assert_eq!(feed.incidents.len(), 2);
        assert!(
            feed.incidents
                .iter()
                .all(|i| i.source_type == SourceType::Arrest && i.coordinate.is_some())
        );
        // Both rows share an address: one external lookup.
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn every_source_failing_is_an_error() {
        let store = Arc::new(FakeStore::new().failing("SELECT", 503));
        let orchestrator = orchestrator(&store, Arc::new(TableProvider::default()));

        let err = orchestrator
            .get_incidents(&IncidentOptions::default())
            .await
            .unwrap_err();
        match err {
            AggregateError::Upstream(e) => assert_eq!(e.status(), Some(503)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn bad_filter_fails_before_any_call() {
        let store = Arc::new(FakeStore::new());
        let orchestrator = orchestrator(&store, Arc::new(TableProvider::default()));

        let options = IncidentOptions {
            filter: Some(Filter::equals("nature; DROP", "x")),
            ..IncidentOptions::default()
        };
        let err = orchestrator.get_incidents(&options).await.unwrap_err();

        assert!(err.is_validation());
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn radius_drops_far_and_unplaced_incidents() {
        let far = record(serde_json::json!({
            "id": 2, "starttime": "2024-01-01 11:00:00", "nature": "ALARM",
            "lat": 40.7, "lon": -74.0,
        }));
        let unplaced = record(serde_json::json!({
            "id": 3, "starttime": "2024-01-01 12:00:00", "nature": "ALARM",
        }));
        let store = Arc::new(
            FakeStore::new().rows("[dbo].[cadHandler]", vec![dispatch_row(), far, unplaced]),
        );
        let orchestrator = orchestrator(&store, Arc::new(TableProvider::default()));

        let options = IncidentOptions {
            radius: RadiusFilter::new(Coordinate::new(42.0, -75.0), 5.0),
            ..IncidentOptions::default()
        };
        let feed = orchestrator.get_incidents(&options).await.unwrap();

        assert_eq!(feed.incidents.len(), 1);
        assert_eq!(feed.incidents[0].raw["id"], 1);
    }

    #[tokio::test]
    async fn per_source_limits_and_shared_filter() {
        let store = Arc::new(FakeStore::new());
        let orchestrator = orchestrator(&store, Arc::new(TableProvider::default()));

        let options = IncidentOptions {
            limits: BTreeMap::from([("arrests".to_string(), 5)]),
            default_limit: Some(7),
            filter: Some(Filter::contains("charge", "DWI")),
            ..IncidentOptions::default()
        };
        orchestrator.get_incidents(&options).await.unwrap();

        let statements = store.statements();
        assert_eq!(statements.len(), 5);
        assert!(statements.iter().any(|s| s.starts_with("SELECT TOP 5 ") && s.contains("'AR'")));
        assert!(statements.iter().any(|s| s.starts_with("SELECT TOP 7 ") && s.contains("'LW'")));
        assert!(statements.iter().all(|s| s.contains("[charge] LIKE '%DWI%'")));
    }
}
