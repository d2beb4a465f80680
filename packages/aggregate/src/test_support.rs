//! In-memory fakes for the upstream store and geocoder.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use blotter_geocoder::{CachedGeocoder, GeocodeError, GeocodeProvider, MemoryGeocodeCache};
use blotter_incident_models::{Coordinate, SourceRecord};
use blotter_resolver::{CoordinateResolver, ResolverConfig};
use blotter_source::all_sources;
use blotter_upstream::{ColumnDescriptor, SourceQueryClient, UpstreamError, UpstreamStore};

use crate::{Correlator, Orchestrator};

pub fn record(value: serde_json::Value) -> SourceRecord {
    value.as_object().cloned().unwrap()
}

enum Response {
    Rows(Vec<SourceRecord>),
    Fail(u16),
}

/// Answers each statement with the rows of the first rule whose needle it
/// contains, honoring `TOP n` and `OFFSET/FETCH`. Unmatched statements get
/// no rows.
#[derive(Default)]
pub struct FakeStore {
    rules: Vec<(String, Response)>,
    statements: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, needle: &str, rows: Vec<SourceRecord>) -> Self {
        self.rules.push((needle.to_string(), Response::Rows(rows)));
        self
    }

    pub fn failing(mut self, needle: &str, status: u16) -> Self {
        self.rules.push((needle.to_string(), Response::Fail(status)));
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }
}

fn number_after(sql: &str, marker: &str) -> Option<usize> {
    let start = sql.find(marker)? + marker.len();
    sql[start..].split_whitespace().next()?.parse().ok()
}

#[async_trait]
impl UpstreamStore for FakeStore {
    async fn list_tables(&self) -> Result<Vec<String>, UpstreamError> {
        Ok(vec!["cadHandler".to_string(), "DailyBulletinArrests".to_string()])
    }

    async fn schema(&self, _table: &str) -> Result<Vec<ColumnDescriptor>, UpstreamError> {
        Ok(Vec::new())
    }

    async fn query(&self, sql: &str) -> Result<Vec<SourceRecord>, UpstreamError> {
        self.statements.lock().unwrap().push(sql.to_string());

        let Some((_, response)) = self.rules.iter().find(|(needle, _)| sql.contains(needle))
        else {
            return Ok(Vec::new());
        };

        match response {
            Response::Fail(status) => Err(UpstreamError::QueryFailed {
                status: Some(*status),
                message: "fake failure".to_string(),
            }),
            Response::Rows(rows) => {
                let skip = number_after(sql, " OFFSET ").unwrap_or(0);
                let take = number_after(sql, "SELECT TOP ")
                    .or_else(|| number_after(sql, " FETCH NEXT "))
                    .unwrap_or(usize::MAX);
                Ok(rows.iter().skip(skip).take(take).cloned().collect())
            }
        }
    }
}

/// Resolves addresses from a fixed table and counts calls.
#[derive(Default)]
pub struct TableProvider {
    pub known: HashMap<String, Coordinate>,
    pub calls: AtomicUsize,
}

impl TableProvider {
    pub fn with(mut self, query: &str, coordinate: Coordinate) -> Self {
        self.known.insert(query.to_lowercase(), coordinate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodeProvider for TableProvider {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.known.get(&query.to_lowercase()).copied())
    }
}

pub const LOCALITY: &str = "Binghamton, NY";

pub fn geocoder(provider: Arc<TableProvider>) -> CachedGeocoder {
    CachedGeocoder::new(
        provider,
        Arc::new(MemoryGeocodeCache::new(Duration::from_secs(3600))),
    )
}

fn client(store: &Arc<FakeStore>) -> SourceQueryClient {
    SourceQueryClient::new(store.clone(), Duration::from_secs(5))
}

fn resolver(geocoder: &CachedGeocoder) -> CoordinateResolver {
    CoordinateResolver::from_config(
        &ResolverConfig {
            locality: LOCALITY.to_string(),
            ..ResolverConfig::default()
        },
        Some(geocoder.clone()),
    )
}

pub fn orchestrator(store: &Arc<FakeStore>, provider: Arc<TableProvider>) -> Orchestrator {
    let geocoder = geocoder(provider);
    Orchestrator::new(client(store), resolver(&geocoder), all_sources())
        .with_geocoder(geocoder, LOCALITY)
}

pub fn correlator(store: &Arc<FakeStore>) -> Correlator {
    let geocoder = geocoder(Arc::new(TableProvider::default()));
    Correlator::new(client(store), resolver(&geocoder), all_sources())
}
