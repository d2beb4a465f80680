//! Gateway configuration.
//!
//! Loaded from the TOML file named by `BLOTTER_CONFIG` (optional), then
//! overridden by environment variables.

use std::path::PathBuf;
use std::time::Duration;

use blotter_geocoder::service_registry::{GeocodingService, ProviderConfig};
use blotter_resolver::ResolverConfig;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "BLOTTER_CONFIG";

/// Errors loading configuration or building the services it describes.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Path from `BLOTTER_CONFIG`.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`].
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An override variable could not be parsed.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// A setting is out of range.
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting {
        /// Dotted setting name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// No enabled geocoding service is embedded.
    #[error("No geocoding service is enabled")]
    NoGeocodingService,

    /// The geocoder HTTP client could not be built.
    #[error(transparent)]
    Geocoder(#[from] blotter_geocoder::GeocodeError),

    /// The upstream HTTP client could not be built.
    #[error(transparent)]
    Upstream(#[from] blotter_upstream::UpstreamError),
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind_addr: String,
    /// Listen port.
    pub port: u16,
    /// Upstream data store.
    pub upstream: UpstreamSettings,
    /// External geocoder and its cache.
    pub geocoder: GeocoderSettings,
    /// Coordinate resolution.
    pub resolver: ResolverConfig,
    /// Person search.
    pub correlation: CorrelationSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 8080,
            upstream: UpstreamSettings::default(),
            geocoder: GeocoderSettings::default(),
            resolver: ResolverConfig {
                locality: "Binghamton, NY".to_string(),
                ..ResolverConfig::default()
            },
            correlation: CorrelationSettings::default(),
        }
    }
}

/// `[upstream]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    /// Store base URL.
    pub base_url: String,
    /// Per-call deadline in seconds.
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl UpstreamSettings {
    /// Per-call deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[geocoder]`. Unset fields keep the embedded service's values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
    /// Search endpoint.
    pub base_url: Option<String>,
    /// `User-Agent` header.
    pub user_agent: Option<String>,
    /// Minimum delay between external requests, in milliseconds.
    pub rate_limit_ms: Option<u64>,
    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Cache entry lifetime in seconds.
    pub cache_ttl_secs: Option<u64>,
    /// Cache sweep interval in seconds.
    pub sweep_interval_secs: Option<u64>,
}

impl GeocoderSettings {
    /// Applies these overrides to an embedded service definition.
    #[must_use]
    pub fn apply(&self, mut service: GeocodingService) -> GeocodingService {
        match &mut service.provider {
            ProviderConfig::Nominatim {
                base_url,
                user_agent,
                rate_limit_ms,
                timeout_secs,
            } => {
                if let Some(url) = &self.base_url {
                    base_url.clone_from(url);
                }
                if let Some(agent) = &self.user_agent {
                    user_agent.clone_from(agent);
                }
                if let Some(ms) = self.rate_limit_ms {
                    *rate_limit_ms = ms;
                }
                if let Some(secs) = self.timeout_secs {
                    *timeout_secs = secs;
                }
            }
        }
        if let Some(ttl) = self.cache_ttl_secs {
            service.cache.ttl_secs = ttl;
        }
        if let Some(sweep) = self.sweep_interval_secs {
            service.cache.sweep_interval_secs = sweep.max(1);
        }
        service
    }
}

/// Name-matching rule for person search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Substring match on each name token.
    #[default]
    Substring,
    /// Exact match on each name token.
    Exact,
}

/// `[correlation]`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Name-matching rule.
    pub policy: MatchPolicy,
    /// Most rows requested from one source per search.
    pub fetch_cap: u32,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            fetch_cap: blotter_sql::select::MAX_ROWS,
        }
    }
}

impl ServerConfig {
    /// Loads the file named by `BLOTTER_CONFIG`, if any, then applies
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                log::info!("Loading config from {}", path.display());
                let text = std::fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Io { path, source })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parses a config file body.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown values, or
    /// [`ConfigError::InvalidSetting`] for a zero timeout.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "upstream.timeout_secs",
                reason: "must be at least 1",
            });
        }
        if self.geocoder.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidSetting {
                field: "geocoder.timeout_secs",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Applies `BIND_ADDR`, `PORT`, `BLOTTER_UPSTREAM_URL`,
    /// `BLOTTER_GEOCODER_URL` and `BLOTTER_LOCALITY` from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if `PORT` is not a port number.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(addr) = lookup("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidEnv {
                    name: "PORT",
                    value: port,
                })?;
        }
        if let Some(url) = lookup("BLOTTER_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(url) = lookup("BLOTTER_GEOCODER_URL") {
            self.geocoder.base_url = Some(url);
        }
        if let Some(locality) = lookup("BLOTTER_LOCALITY") {
            self.resolver.locality = locality;
        }
        Ok(())
    }
}
