//! Nominatim / OpenStreetMap geocoder client.
//!
//! The public instance allows **1 request per second**; the provider
//! serializes its requests and waits out the configured minimum interval
//! before each one.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use std::time::{Duration, Instant};

use async_trait::async_trait;
use blotter_incident_models::Coordinate;
use tokio::sync::Mutex;

use crate::service_registry::{GeocodingService, ProviderConfig};
use crate::{GeocodeError, GeocodeProvider};

/// Free-form Nominatim search with client-side rate limiting.
#[derive(Debug)]
pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
    min_interval: Duration,
    timeout: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimProvider {
    /// Creates a provider for the search endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        user_agent: &str,
        min_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            min_interval,
            timeout,
            last_request: Mutex::new(None),
        })
    }

    /// Creates a provider from an embedded service configuration, with an
    /// optional base URL override.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn from_service(
        service: &GeocodingService,
        base_url_override: Option<&str>,
    ) -> Result<Self, GeocodeError> {
        match &service.provider {
            ProviderConfig::Nominatim {
                base_url,
                user_agent,
                rate_limit_ms,
                timeout_secs,
            } => Self::new(
                base_url_override.unwrap_or(base_url),
                user_agent,
                Duration::from_millis(*rate_limit_ms),
                Duration::from_secs(*timeout_secs),
            ),
        }
    }

    /// Holds the request slot, sleeping until the minimum interval since the
    /// previous request has passed.
    async fn throttle(&self) -> tokio::sync::MutexGuard<'_, Option<Instant>> {
        let last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        last
    }
}

#[async_trait]
impl GeocodeProvider for NominatimProvider {
    async fn geocode(&self, query: &str) -> Result<Option<Coordinate>, GeocodeError> {
        let mut slot = self.throttle().await;

        let result = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("limit", "1"),
                ("addressdetails", "0"),
            ])
            .send()
            .await;

        *slot = Some(Instant::now());
        drop(slot);

        let resp = result.map_err(|e| {
            if e.is_timeout() {
                GeocodeError::Timeout {
                    millis: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                }
            } else {
                GeocodeError::Http(e)
            }
        })?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(GeocodeError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(GeocodeError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        let found = parse_response(&body)?;
        log::debug!("Geocoded {query:?} => {found:?}");
        Ok(found)
    }
}

fn coordinate_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Parses a Nominatim JSON response. An empty array means "not found".
fn parse_response(body: &serde_json::Value) -> Result<Option<Coordinate>, GeocodeError> {
    let results = body.as_array().ok_or_else(|| GeocodeError::Parse {
        message: "Nominatim response is not an array".to_string(),
    })?;

    let Some(first) = results.first() else {
        return Ok(None);
    };

    let lat = coordinate_value(&first["lat"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lat in Nominatim response".to_string(),
    })?;

    let lon = coordinate_value(&first["lon"]).ok_or_else(|| GeocodeError::Parse {
        message: "Missing lon in Nominatim response".to_string(),
    })?;

    let coordinate = Coordinate::new(lat, lon);
    if !coordinate.is_valid() {
        return Err(GeocodeError::Parse {
            message: format!("Nominatim returned out-of-range coordinate ({lat}, {lon})"),
        });
    }

    Ok(Some(coordinate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_result() {
        let body = serde_json::json!([{
            "lat": "42.0987",
            "lon": "-75.9180",
            "display_name": "Court Street, Binghamton, Broome County, New York, USA"
        }]);
        let result = parse_response(&body).unwrap().unwrap();
        assert!((result.latitude - 42.0987).abs() < 1e-4);
        assert!((result.longitude - -75.9180).abs() < 1e-4);
    }

    #[test]
    fn parses_numeric_coordinates() {
        let body = serde_json::json!([{"lat": 42.1, "lon": -75.9}]);
        assert!(parse_response(&body).unwrap().is_some());
    }

    #[test]
    fn parses_nominatim_empty() {
        let body = serde_json::json!([]);
        assert!(parse_response(&body).unwrap().is_none());
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(parse_response(&serde_json::json!({"error": "x"})).is_err());
        assert!(parse_response(&serde_json::json!([{"lat": "abc", "lon": "1"}])).is_err());
        assert!(parse_response(&serde_json::json!([{"lat": "99", "lon": "1"}])).is_err());
    }

    #[test]
    fn builds_from_embedded_service() {
        let service = crate::service_registry::default_service().unwrap();
        let provider =
            NominatimProvider::from_service(&service, Some("http://localhost:8080/search")).unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080/search");
        assert_eq!(provider.min_interval, Duration::from_secs(1));
    }
}
