#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-record coordinate resolution.
//!
//! A [`CoordinateResolver`] holds an ordered list of
//! [`CoordinateStrategy`] implementations and returns the first position
//! any of them produces:
//!
//! 1. [`direct::DirectCoordinates`]: latitude/longitude columns.
//! 2. [`projected::ProjectedCoordinates`]: UTM easting/northing columns.
//! 3. [`address::AddressGeocode`]: free-text location through the geocode
//!    cache.
//!
//! A record none of them can place resolves to `None` and is kept without
//! coordinates.

pub mod address;
pub mod direct;
pub mod projected;

use std::sync::Arc;

use async_trait::async_trait;
use blotter_geocoder::CachedGeocoder;
use blotter_incident_models::{Coordinate, SourceRecord};
use blotter_spatial::UtmZone;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use address::AddressGeocode;
pub use direct::DirectCoordinates;
pub use projected::ProjectedCoordinates;

/// One way of placing a record on the map.
#[async_trait]
pub trait CoordinateStrategy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns a position for `record`, or `None` to fall through to the
    /// next strategy. Never fails.
    async fn try_resolve(&self, record: &SourceRecord) -> Option<Coordinate>;
}

/// Strategy identifiers accepted in configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// [`DirectCoordinates`]
    Direct,
    /// [`ProjectedCoordinates`]
    Projected,
    /// [`AddressGeocode`]
    Address,
}

/// Resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Strategies in priority order.
    pub strategies: Vec<StrategyKind>,
    /// Zone used to convert projected coordinates.
    pub utm: UtmZone,
    /// Suffix appended to addresses that lack it (e.g. `"Binghamton, NY"`).
    pub locality: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            strategies: vec![
                StrategyKind::Direct,
                StrategyKind::Projected,
                StrategyKind::Address,
            ],
            utm: UtmZone::default(),
            locality: String::new(),
        }
    }
}

/// Ordered list of strategies, tried until one succeeds.
#[derive(Clone)]
pub struct CoordinateResolver {
    strategies: Vec<Arc<dyn CoordinateStrategy>>,
}

impl std::fmt::Debug for CoordinateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinateResolver")
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl CoordinateResolver {
    /// Creates a resolver over explicit strategies.
    #[must_use]
    pub fn new(strategies: Vec<Arc<dyn CoordinateStrategy>>) -> Self {
        Self { strategies }
    }

    /// Builds the strategy list named by `config`. The address strategy is
    /// skipped when no geocoder is available.
    #[must_use]
    pub fn from_config(config: &ResolverConfig, geocoder: Option<CachedGeocoder>) -> Self {
        let strategies = config
            .strategies
            .iter()
            .filter_map(|kind| -> Option<Arc<dyn CoordinateStrategy>> {
                match kind {
                    StrategyKind::Direct => Some(Arc::new(DirectCoordinates)),
                    StrategyKind::Projected => Some(Arc::new(ProjectedCoordinates::new(config.utm))),
                    StrategyKind::Address => {
                        if let Some(geocoder) = &geocoder {
                            Some(Arc::new(AddressGeocode::new(
                                geocoder.clone(),
                                &config.locality,
                            )))
                        } else {
                            log::warn!("Address strategy configured without a geocoder, skipping");
                            None
                        }
                    }
                }
            })
            .collect();

        Self::new(strategies)
    }

    /// Names of the configured strategies, in order.
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Resolves `record`, short-circuiting at the first strategy that
    /// yields a position.
    pub async fn resolve(&self, record: &SourceRecord) -> Option<Coordinate> {
        for strategy in &self.strategies {
            if let Some(coordinate) = strategy.try_resolve(record).await {
                log::trace!("Resolved record via {}", strategy.name());
                return Some(coordinate);
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use blotter_geocoder::{
        CachedGeocoder, GeocodeError, GeocodeProvider, MemoryGeocodeCache,
    };
    use blotter_incident_models::{Coordinate, SourceRecord};

    /// Resolves every query to the same point and counts calls.
    #[derive(Default)]
    pub struct FixedProvider {
        pub calls: AtomicUsize,
    }

    impl FixedProvider {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub const FIXED: Coordinate = Coordinate::new(42.0987, -75.918);

    #[async_trait]
    impl GeocodeProvider for FixedProvider {
        async fn geocode(&self, _query: &str) -> Result<Option<Coordinate>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(FIXED))
        }
    }

    pub fn geocoder(provider: &Arc<FixedProvider>) -> CachedGeocoder {
        CachedGeocoder::new(
            provider.clone(),
            Arc::new(MemoryGeocodeCache::new(Duration::from_secs(3600))),
        )
    }

    pub fn record(value: serde_json::Value) -> SourceRecord {
        value.as_object().cloned().unwrap()
    }
}
