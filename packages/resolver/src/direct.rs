//! Latitude/longitude columns already present on the row.

use async_trait::async_trait;
use blotter_incident_models::{Coordinate, SourceRecord, field_f64};

use crate::CoordinateStrategy;

/// Column pairs tried in order. Lookups are case-insensitive.
const COLUMN_PAIRS: &[(&str, &str)] = &[
    ("lat", "lon"),
    ("lat", "lng"),
    ("latitude", "longitude"),
    ("LocationLat", "LocationLong"),
];

/// Reads WGS84 degrees straight off the record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectCoordinates;

/// In range, finite, and not the `(0, 0)` placeholder some tables use for
/// "unknown".
pub(crate) fn usable(coordinate: Coordinate) -> bool {
    coordinate.is_valid() && coordinate != Coordinate::new(0.0, 0.0)
}

#[async_trait]
impl CoordinateStrategy for DirectCoordinates {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn try_resolve(&self, record: &SourceRecord) -> Option<Coordinate> {
        COLUMN_PAIRS.iter().find_map(|(lat, lon)| {
            let coordinate = Coordinate::new(field_f64(record, lat)?, field_f64(record, lon)?);
            usable(coordinate).then_some(coordinate)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[tokio::test]
    async fn reads_string_and_numeric_columns() {
        let row = record(serde_json::json!({"lat": "42.1", "lon": -75.9}));
        assert_eq!(
            DirectCoordinates.try_resolve(&row).await,
            Some(Coordinate::new(42.1, -75.9))
        );
    }

    #[tokio::test]
    async fn reads_alternate_column_names() {
        let row = record(serde_json::json!({"LOCATIONLAT": "42.2", "LocationLong": "-75.8"}));
        assert_eq!(
            DirectCoordinates.try_resolve(&row).await,
            Some(Coordinate::new(42.2, -75.8))
        );

        let row = record(serde_json::json!({"Latitude": 42.3, "Longitude": -75.7}));
        assert!(DirectCoordinates.try_resolve(&row).await.is_some());
    }

    #[tokio::test]
    async fn rejects_partial_garbage_and_placeholder_values() {
        for row in [
            serde_json::json!({"lat": "42.1"}),
            serde_json::json!({"lat": "abc", "lon": "-75.9"}),
            serde_json::json!({"lat": "0", "lon": "0"}),
            serde_json::json!({"lat": "142.1", "lon": "-75.9"}),
            serde_json::json!({"lat": "NaN", "lon": "-75.9"}),
        ] {
            assert!(DirectCoordinates.try_resolve(&record(row)).await.is_none());
        }
    }

    #[tokio::test]
    async fn skips_bad_pair_for_a_later_good_one() {
        let row = record(serde_json::json!({
            "lat": "", "lon": "",
            "LocationLat": "42.1", "LocationLong": "-75.9"
        }));
        assert_eq!(
            DirectCoordinates.try_resolve(&row).await,
            Some(Coordinate::new(42.1, -75.9))
        );
    }
}
