//! Cache-first geocoding with in-flight deduplication.

use std::collections::HashMap;
use std::sync::Arc;

use blotter_incident_models::Coordinate;
use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;

use crate::address::cache_key;
use crate::cache::{CachedValue, GeocodeCache};
use crate::GeocodeProvider;

type InFlight = Shared<BoxFuture<'static, Option<Coordinate>>>;

/// Looks queries up in a [`GeocodeCache`], falling back to a
/// [`GeocodeProvider`] on a miss.
///
/// Concurrent misses for the same key share one provider call. Found and
/// not-found outcomes are cached; provider errors are logged and yield
/// `None` without being cached, so the next lookup retries.
#[derive(Clone)]
pub struct CachedGeocoder {
    provider: Arc<dyn GeocodeProvider>,
    cache: Arc<dyn GeocodeCache>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl std::fmt::Debug for CachedGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedGeocoder").finish_non_exhaustive()
    }
}

impl CachedGeocoder {
    /// Creates a geocoder over `provider` and `cache`.
    #[must_use]
    pub fn new(provider: Arc<dyn GeocodeProvider>, cache: Arc<dyn GeocodeCache>) -> Self {
        Self {
            provider,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<dyn GeocodeCache> {
        &self.cache
    }

    /// Resolves an already-normalized query.
    pub async fn lookup(&self, query: &str) -> Option<Coordinate> {
        let key = cache_key(query);
        if key.is_empty() {
            return None;
        }

        if let Some(hit) = self.cache.get(&key).await {
            log::trace!("Geocode cache hit for {key:?}");
            return hit.coordinate();
        }

        let flight = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(&key) {
                log::trace!("Joining in-flight geocode for {key:?}");
                existing.clone()
            } else {
                // A flight for this key may have landed between the miss and
                // taking the lock.
                if let Some(hit) = self.cache.get(&key).await {
                    return hit.coordinate();
                }
                let flight = fetch(
                    self.provider.clone(),
                    self.cache.clone(),
                    self.in_flight.clone(),
                    key.clone(),
                    query.trim().to_string(),
                )
                .boxed()
                .shared();
                in_flight.insert(key, flight.clone());
                flight
            }
        };

        flight.await
    }
}

async fn fetch(
    provider: Arc<dyn GeocodeProvider>,
    cache: Arc<dyn GeocodeCache>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
    key: String,
    query: String,
) -> Option<Coordinate> {
    let result = match provider.geocode(&query).await {
        Ok(found) => {
            cache.set(&key, CachedValue::from(found)).await;
            found
        }
        Err(e) => {
            log::warn!("Geocode lookup failed for {query:?}: {e}");
            None
        }
    };

    in_flight.lock().await.remove(&key);
    result
}
