//! UTM easting/northing columns (the dispatch log's `geox`/`geoy`).

use async_trait::async_trait;
use blotter_incident_models::{Coordinate, SourceRecord, field_f64};
use blotter_spatial::{UtmZone, utm_to_lat_lon};

use crate::CoordinateStrategy;
use crate::direct::usable;

/// `(x, y)` column pairs tried in order. Lookups are case-insensitive.
const COLUMN_PAIRS: &[(&str, &str)] = &[("geox", "geoy"), ("easting", "northing")];

/// Converts projected meters to degrees in a fixed zone.
///
/// Some upstream rows carry degrees in the projected columns instead of
/// meters (x = longitude, y = latitude). A pair that already fits the degree
/// ranges is taken as-is.
#[derive(Debug, Clone, Copy)]
pub struct ProjectedCoordinates {
    zone: UtmZone,
}

impl ProjectedCoordinates {
    /// Creates a strategy converting in `zone`.
    #[must_use]
    pub const fn new(zone: UtmZone) -> Self {
        Self { zone }
    }

    fn convert(&self, x: f64, y: f64) -> Option<Coordinate> {
        let as_degrees = Coordinate::new(y, x);
        if as_degrees.is_valid() {
            return usable(as_degrees).then_some(as_degrees);
        }

        match utm_to_lat_lon(x, y, self.zone) {
            Ok(coordinate) => usable(coordinate).then_some(coordinate),
            Err(e) => {
                log::debug!("Unusable projected coordinate ({x}, {y}): {e}");
                None
            }
        }
    }
}

impl Default for ProjectedCoordinates {
    fn default() -> Self {
        Self::new(UtmZone::default())
    }
}

#[async_trait]
impl CoordinateStrategy for ProjectedCoordinates {
    fn name(&self) -> &'static str {
        "projected"
    }

    async fn try_resolve(&self, record: &SourceRecord) -> Option<Coordinate> {
        COLUMN_PAIRS
            .iter()
            .find_map(|(x, y)| self.convert(field_f64(record, x)?, field_f64(record, y)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    #[tokio::test]
    async fn converts_zone_18_meters() {
        let row = record(serde_json::json!({"GEOX": "423000", "GEOY": "4663000"}));
        let c = ProjectedCoordinates::default().try_resolve(&row).await.unwrap();
        assert!((c.latitude - 42.115_32).abs() < 1e-4);
        assert!((c.longitude - -75.931_43).abs() < 1e-4);
    }

    #[tokio::test]
    async fn degree_pairs_pass_through() {
        let row = record(serde_json::json!({"geox": -75.91, "geoy": 42.1}));
        assert_eq!(
            ProjectedCoordinates::default().try_resolve(&row).await,
            Some(Coordinate::new(42.1, -75.91))
        );
    }

    #[tokio::test]
    async fn zero_and_garbage_are_rejected() {
        let strategy = ProjectedCoordinates::default();
        for row in [
            serde_json::json!({"geox": 0, "geoy": 0}),
            serde_json::json!({"geox": "x", "geoy": "4663000"}),
            serde_json::json!({"geox": "423000"}),
            serde_json::json!({"geox": -1.0e12, "geoy": 4_663_000}),
        ] {
            assert!(strategy.try_resolve(&record(row)).await.is_none());
        }
    }

    #[tokio::test]
    async fn zone_is_configurable() {
        let row = record(serde_json::json!({"geox": 500000, "geoy": 4649776}));
        let c = ProjectedCoordinates::new(UtmZone::north(17))
            .try_resolve(&row)
            .await
            .unwrap();
        assert!((c.longitude - -81.0).abs() < 1e-9);
    }
}
