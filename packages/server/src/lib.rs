#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web gateway for blotter.
//!
//! Exposes the upstream store's table/schema/query surface behind the
//! identifier and statement guards, plus the aggregated incident feed,
//! proximity search, cross-source person search, offender and reoffender
//! lookups and paged record listing. Every route lives under `/api`.

pub mod config;
pub mod error;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use blotter_aggregate::{Correlator, ExactMatch, NameMatchPolicy, Orchestrator, SubstringMatch};
use blotter_geocoder::service_registry::{GeocodingService, default_service};
use blotter_geocoder::{
    CachedGeocoder, GeocodeCache, MemoryGeocodeCache, NominatimProvider, spawn_sweeper,
};
use blotter_resolver::CoordinateResolver;
use blotter_source::all_sources;
use blotter_upstream::{HttpUpstream, SourceQueryClient};

pub use config::{ConfigError, MatchPolicy, ServerConfig};
pub use error::GatewayError;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Guarded upstream client, used directly by the passthrough routes.
    pub client: SourceQueryClient,
    /// Cached geocoder, shared with the resolver.
    pub geocoder: CachedGeocoder,
    /// Feed, proximity and record listing.
    pub orchestrator: Orchestrator,
    /// Person search and offender lookup.
    pub correlator: Correlator,
    /// Suffix appended to addresses before geocoding.
    pub locality: String,
}

impl AppState {
    /// Wires the core services over an existing client and geocoder.
    #[must_use]
    pub fn new(client: SourceQueryClient, geocoder: CachedGeocoder, config: &ServerConfig) -> Self {
        let sources = all_sources();
        let locality = config.resolver.locality.clone();
        let resolver = CoordinateResolver::from_config(&config.resolver, Some(geocoder.clone()));
        log::debug!("Coordinate strategies: {:?}", resolver.strategy_names());

        let policy: Arc<dyn NameMatchPolicy> = match config.correlation.policy {
            MatchPolicy::Substring => Arc::new(SubstringMatch),
            MatchPolicy::Exact => Arc::new(ExactMatch),
        };

        let orchestrator = Orchestrator::new(client.clone(), resolver.clone(), sources.clone())
            .with_geocoder(geocoder.clone(), &locality);
        let correlator = Correlator::new(client.clone(), resolver, sources)
            .with_policy(policy)
            .with_fetch_cap(config.correlation.fetch_cap);

        Self {
            client,
            geocoder,
            orchestrator,
            correlator,
            locality,
        }
    }

    /// Builds the HTTP upstream client and Nominatim geocoder described by
    /// `config` and `service`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if either HTTP client cannot be built.
    pub fn from_config(
        config: &ServerConfig,
        service: &GeocodingService,
    ) -> Result<Self, ConfigError> {
        let timeout = config.upstream.timeout();
        let store = HttpUpstream::new(&config.upstream.base_url, timeout)?;
        let client = SourceQueryClient::new(Arc::new(store), timeout);

        let provider = NominatimProvider::from_service(service, None)?;
        let cache: Arc<dyn GeocodeCache> = Arc::new(MemoryGeocodeCache::new(service.cache.ttl()));
        let geocoder = CachedGeocoder::new(Arc::new(provider), cache);

        Ok(Self::new(client, geocoder, config))
    }
}

/// The embedded default geocoding service with `config`'s overrides.
///
/// # Errors
///
/// Returns [`ConfigError::NoGeocodingService`] if no embedded service is
/// enabled.
pub fn geocoding_service(config: &ServerConfig) -> Result<GeocodingService, ConfigError> {
    let service = default_service().ok_or(ConfigError::NoGeocodingService)?;
    Ok(config.geocoder.apply(service))
}

/// Registers every `/api` route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/tables", web::get().to(handlers::tables))
            .route("/schema", web::get().to(handlers::schema))
            .route("/query", web::get().to(handlers::query_table))
            .route("/query", web::post().to(handlers::query_raw))
            .route("/geocode", web::get().to(handlers::geocode))
            .route("/incidents", web::get().to(handlers::incidents))
            .route("/proximity", web::get().to(handlers::proximity))
            .route("/search360", web::get().to(handlers::search))
            .route("/searchP2C", web::get().to(handlers::search))
            .route("/offender", web::get().to(handlers::offender))
            .route("/reoffenders", web::get().to(handlers::reoffenders))
            .route("/records/{source}", web::get().to(handlers::records)),
    );
}

/// Starts the gateway.
///
/// Loads configuration, builds the upstream client and geocoder, starts the
/// geocode cache sweeper and serves until shut down. The caller provides
/// the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if configuration is invalid, the HTTP
/// server fails to bind, or it encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::load().map_err(std::io::Error::other)?;
    let service = geocoding_service(&config).map_err(std::io::Error::other)?;

    log::info!(
        "Upstream {} (timeout {}s), geocoder {} ({})",
        config.upstream.base_url,
        config.upstream.timeout_secs,
        service.name,
        service.base_url()
    );
    let state = AppState::from_config(&config, &service).map_err(std::io::Error::other)?;

    let sweeper = spawn_sweeper(state.geocoder.cache().clone(), service.cache.sweep_interval());
    let state = web::Data::new(state);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    let result = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await;

    sweeper.abort();
    result
}
