//! Free-text addresses through the geocode cache.

use async_trait::async_trait;
use blotter_geocoder::{CachedGeocoder, normalize_location};
use blotter_incident_models::{Coordinate, SourceRecord, field_text};

use crate::CoordinateStrategy;

/// Address columns tried in order.
const ADDRESS_FIELDS: &[&str] = &["location", "address", "LocationAddress", "address_line_1"];

/// Geocodes the record's location text.
#[derive(Debug, Clone)]
pub struct AddressGeocode {
    geocoder: CachedGeocoder,
    locality: String,
}

impl AddressGeocode {
    /// Creates a strategy that suffixes addresses with `locality` before
    /// looking them up.
    #[must_use]
    pub fn new(geocoder: CachedGeocoder, locality: &str) -> Self {
        Self {
            geocoder,
            locality: locality.to_string(),
        }
    }

    /// The address text for `record`, with its `city` column appended when
    /// the address does not already name it.
    fn address_text(record: &SourceRecord) -> Option<String> {
        let address = ADDRESS_FIELDS
            .iter()
            .find_map(|name| field_text(record, name))?;

        match field_text(record, "city") {
            Some(city) if !address.to_lowercase().contains(&city.to_lowercase()) => {
                Some(format!("{address}, {city}"))
            }
            _ => Some(address),
        }
    }
}

#[async_trait]
impl CoordinateStrategy for AddressGeocode {
    fn name(&self) -> &'static str {
        "address"
    }

    async fn try_resolve(&self, record: &SourceRecord) -> Option<Coordinate> {
        let raw = Self::address_text(record)?;
        let query = normalize_location(&raw, &self.locality)?;
        self.geocoder.lookup(&query).await
    }
}
