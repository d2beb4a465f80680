#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Address geocoding for upstream records.
//!
//! Free-text locations are cleaned by [`address::normalize_location`], then
//! looked up through [`lookup::CachedGeocoder`]: a TTL cache
//! ([`cache::MemoryGeocodeCache`]) in front of an external
//! [`GeocodeProvider`] (Nominatim by default, configured from the TOML
//! files under `services/`). Both found and not-found outcomes are cached;
//! provider failures are not.
//!
//! The geocoder is the only piece of process-wide mutable state. It is
//! built once at startup and passed down explicitly.

pub mod address;
pub mod cache;
pub mod lookup;
pub mod nominatim;
pub mod service_registry;

pub use address::{cache_key, normalize_location};
pub use cache::{
    CachedValue, Clock, GeocodeCache, ManualClock, MemoryGeocodeCache, SystemClock, spawn_sweeper,
};
pub use lookup::CachedGeocoder;
pub use nominatim::NominatimProvider;

use async_trait::async_trait;
use blotter_incident_models::Coordinate;
use thiserror::Error;

/// Errors from geocoding operations.
///
/// These never reach API callers: a failed lookup is logged and treated as
/// "no coordinate".
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// The provider answered with a non-success status.
    #[error("Geocoder returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The request did not complete in time.
    #[error("Geocode request timed out after {millis}ms")]
    Timeout {
        /// The elapsed deadline, in milliseconds.
        millis: u64,
    },
}

/// An external address-to-coordinate service.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Resolves a free-form query to its top match. `Ok(None)` means the
    /// service answered but found nothing.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError`] if the service cannot be reached, rate
    /// limits the request, or answers with something unparseable.
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError>;
}
