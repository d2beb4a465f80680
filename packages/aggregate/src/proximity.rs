//! Dispatch calls near an address.

use blotter_geocoder::normalize_location;
use blotter_incident_models::{CanonicalIncident, Coordinate, SourceType};
use blotter_spatial::{RadiusFilter, feet_to_km, km_to_feet};
use blotter_sql::{CompareOp, Filter};
use chrono::{TimeDelta, Utc};
use serde::Serialize;

use crate::feed::Orchestrator;
use crate::AggregateError;

/// Parameters for [`Orchestrator::proximity`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProximityOptions {
    /// Center address, free text.
    pub address: String,
    /// How many days back to look.
    pub days: u32,
    /// Case-insensitive substring of the call nature.
    pub nature: Option<String>,
    /// Search radius in feet.
    pub distance_ft: f64,
}

impl ProximityOptions {
    /// Defaults: 7 days, 1000 feet, any nature.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            days: 7,
            nature: None,
            distance_ft: 1000.0,
        }
    }
}

/// One incident and how far it is from the center.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityMatch {
    /// The incident.
    #[serde(flatten)]
    pub incident: CanonicalIncident,
    /// Distance from the center in feet.
    pub distance_ft: f64,
}

/// Result of a proximity search.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityResult {
    /// Geocoded center.
    pub center: Coordinate,
    /// Matches, nearest first.
    pub matches: Vec<ProximityMatch>,
}

impl Orchestrator {
    async fn geocode_center(&self, address: &str) -> Result<Coordinate, AggregateError> {
        let not_found = || AggregateError::AddressNotFound {
            address: address.to_string(),
        };
        let geocoder = self.geocoder.as_ref().ok_or_else(not_found)?;
        let query = normalize_location(address, &self.locality).ok_or_else(not_found)?;
        geocoder.lookup(&query).await.ok_or_else(not_found)
    }

    /// Finds recent dispatch calls within `distance_ft` of `address`.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::InvalidParameter`] for a negative or
    /// non-finite distance or a look-back window before the earliest
    /// representable date, [`AggregateError::AddressNotFound`] if the
    /// address cannot be geocoded, [`AggregateError::UnknownSource`] if no dispatch source is
    /// configured, or any upstream error.
    pub async fn proximity(
        &self,
        options: &ProximityOptions,
    ) -> Result<ProximityResult, AggregateError> {
        let dispatch = self
            .sources
            .iter()
            .find(|s| s.source_type == SourceType::Dispatch)
            .ok_or_else(|| AggregateError::UnknownSource {
                id: SourceType::Dispatch.to_string(),
            })?;

        if !options.distance_ft.is_finite() || options.distance_ft < 0.0 {
            return Err(AggregateError::InvalidParameter {
                name: "distance",
                reason: format!("{} is not a non-negative number of feet", options.distance_ft),
            });
        }
        let since = TimeDelta::try_days(i64::from(options.days))
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .ok_or_else(|| AggregateError::InvalidParameter {
                name: "days",
                reason: format!("{} days back is out of range", options.days),
            })?;

        let center = self.geocode_center(&options.address).await?;
        let radius = RadiusFilter::new(center, feet_to_km(options.distance_ft)).ok_or_else(|| {
            AggregateError::AddressNotFound {
                address: options.address.clone(),
            }
        })?;
        let nature = options
            .nature
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .and_then(|n| {
                dispatch
                    .fields
                    .title
                    .first()
                    .map(|column| Filter::contains(column, n))
            });

        let query = dispatch
            .base_query()?
            .top(Some(blotter_sql::select::MAX_ROWS))
            .filter(Filter::compare(
                &dispatch.time_column,
                CompareOp::GtEq,
                since.format("%Y-%m-%d %H:%M:%S").to_string(),
            ))
            .filter_opt(nature);

        let rows = self.client.select(&query).await?;
        let incidents = self.to_incidents(dispatch, rows).await;

        let mut matches: Vec<ProximityMatch> = incidents
            .into_iter()
            .filter_map(|incident| {
                let distance_km = radius.distance_km(incident.coordinate?);
                (distance_km <= radius.radius_km).then(|| ProximityMatch {
                    incident,
                    distance_ft: km_to_feet(distance_km),
                })
            })
            .collect();
        matches.sort_by(|a, b| a.distance_ft.total_cmp(&b.distance_ft));

        log::debug!(
            "Proximity {:?}: {} matches within {} ft",
            options.address,
            matches.len(),
            options.distance_ft
        );

        Ok(ProximityResult { center, matches })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::{FakeStore, TableProvider, orchestrator, record};

    const CENTER: Coordinate = Coordinate::new(42.0987, -75.918);

    fn provider() -> Arc<TableProvider> {
        Arc::new(TableProvider::default().with("25 Court St, Binghamton, NY", CENTER))
    }

    fn call(id: u32, lat: f64, lon: f64) -> blotter_incident_models::SourceRecord {
        record(serde_json::json!({
            "id": id,
            "starttime": "2024-01-01 10:00:00",
            "nature": "LARCENY",
            "lat": lat,
            "lon": lon,
        }))
    }

    #[tokio::test]
    async fn keeps_nearby_calls_nearest_first() {
        let store = Arc::new(FakeStore::new().rows(
            "[dbo].[cadHandler]",
            vec![
                // ~550 ft north
                call(1, 42.1002, -75.918),
                // ~110 ft north
                call(2, 42.0990, -75.918),
                // ~1.1 km north
                call(3, 42.1087, -75.918),
            ],
        ));
        let orchestrator = orchestrator(&store, provider());

        let mut options = ProximityOptions::new("25 Court St");
        options.nature = Some("larceny".to_string());
        let result = orchestrator.proximity(&options).await.unwrap();

        assert_eq!(result.center, CENTER);
        let ids: Vec<_> = result
            .matches
            .iter()
            .map(|m| m.incident.raw["id"].clone())
            .collect();
        assert_eq!(ids, vec![serde_json::json!(2), serde_json::json!(1)]);
        assert!(result.matches[0].distance_ft < result.matches[1].distance_ft);
        assert!(result.matches[1].distance_ft <= 1000.0);

        let sql = &store.statements()[0];
        assert!(sql.contains("[starttime] >= '"));
        assert!(sql.contains("[nature] LIKE '%larceny%'"));
    }

    #[tokio::test]
    async fn unknown_address_is_an_error() {
        let store = Arc::new(FakeStore::new());
        let orchestrator = orchestrator(&store, provider());

        let err = orchestrator
            .proximity(&ProximityOptions::new("1 Nowhere Rd"))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::AddressNotFound { .. }));
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn blank_address_is_an_error() {
        let store = Arc::new(FakeStore::new());
        let orchestrator = orchestrator(&store, provider());

        let err = orchestrator
            .proximity(&ProximityOptions::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AggregateError::AddressNotFound { .. }));
    }

    #[tokio::test]
    async fn rejects_bad_distance_before_geocoding() {
        let store = Arc::new(FakeStore::new());
        let orchestrator = orchestrator(&store, provider());

        for distance_ft in [f64::NAN, f64::INFINITY, -1.0] {
            let mut options = ProximityOptions::new("25 Court St");
            options.distance_ft = distance_ft;
            let err = orchestrator.proximity(&options).await.unwrap_err();
            assert!(
                matches!(err, AggregateError::InvalidParameter { name: "distance", .. }),
                "{distance_ft}: {err:?}"
            );
            assert!(err.is_validation());
        }
        assert!(store.statements().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_window_is_rejected() {
        let store = Arc::new(FakeStore::new());
        let orchestrator = orchestrator(&store, provider());

        let mut options = ProximityOptions::new("25 Court St");
        options.days = u32::MAX;
        let err = orchestrator.proximity(&options).await.unwrap_err();

        assert!(matches!(err, AggregateError::InvalidParameter { name: "days", .. }));
        assert!(store.statements().is_empty());
    }
}
