//! Great-circle distance filter.

use blotter_incident_models::Coordinate;
use geo::Point;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const FEET_PER_KM: f64 = 3_280.839_895;

/// Converts a coordinate to a `geo` point (`x` = longitude, `y` = latitude).
#[must_use]
pub fn to_point(coordinate: Coordinate) -> Point<f64> {
    Point::new(coordinate.longitude, coordinate.latitude)
}

/// Haversine great-circle distance between two points, in kilometers.
#[must_use]
pub fn haversine_km(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let d_lat = lat2 - lat1;
    let d_lon = (b.x() - a.x()).to_radians();

    let h = (lat1.cos() * lat2.cos()).mul_add(
        (d_lon / 2.0).sin().powi(2),
        (d_lat / 2.0).sin().powi(2),
    );

    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// `true` iff `point` is at most `radius_km` from `center`. The boundary is
/// inclusive.
#[must_use]
pub fn within_radius(center: Point<f64>, radius_km: f64, point: Point<f64>) -> bool {
    haversine_km(center, point) <= radius_km
}

/// Kilometers to feet.
#[must_use]
pub fn km_to_feet(km: f64) -> f64 {
    km * FEET_PER_KM
}

/// Feet to kilometers.
#[must_use]
pub fn feet_to_km(feet: f64) -> f64 {
    feet / FEET_PER_KM
}

/// An active center + radius restriction.
///
/// Callers hold an `Option<RadiusFilter>`; `None` means no restriction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    /// Center of the search circle.
    pub center: Coordinate,
    /// Radius in kilometers.
    pub radius_km: f64,
}

impl RadiusFilter {
    /// Creates a filter, or `None` if the center is not a valid coordinate
    /// or the radius is negative or not finite.
    #[must_use]
    pub fn new(center: Coordinate, radius_km: f64) -> Option<Self> {
        (center.is_valid() && radius_km.is_finite() && radius_km >= 0.0)
            .then_some(Self { center, radius_km })
    }

    /// Distance from the center to `coordinate`, in kilometers.
    #[must_use]
    pub fn distance_km(&self, coordinate: Coordinate) -> f64 {
        haversine_km(to_point(self.center), to_point(coordinate))
    }

    /// Whether a record at `coordinate` passes. Records without a
    /// coordinate never pass an active filter.
    #[must_use]
    pub fn admits(&self, coordinate: Option<Coordinate>) -> bool {
        coordinate.is_some_and(|c| {
            within_radius(to_point(self.center), self.radius_km, to_point(c))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_longitude_at_equator() {
        let d = haversine_km(Point::new(0.0, 0.0), Point::new(1.0, 0.0));
        assert!((d - 111.194_926_644_558_73).abs() < 1e-9, "{d}");
    }

    #[test]
    fn zero_distance_to_self() {
        let p = Point::new(-75.9, 42.1);
        assert!(haversine_km(p, p).abs() < f64::EPSILON);
    }

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = haversine_km(Point::new(0.0, 0.0), Point::new(180.0, 0.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn boundary_distance_is_included() {
        let center = Point::new(-75.91, 42.10);
        let point = Point::new(-75.80, 42.20);
        let exact = haversine_km(center, point);
        assert!(within_radius(center, exact, point));
        assert!(!within_radius(center, exact - 1e-6, point));
    }

    #[test]
    fn radius_filter_excludes_missing_coordinates() {
        let filter = RadiusFilter::new(Coordinate::new(42.1, -75.9), 5.0).unwrap();
        assert!(filter.admits(Some(Coordinate::new(42.11, -75.91))));
        assert!(!filter.admits(Some(Coordinate::new(43.0, -75.9))));
        assert!(!filter.admits(None));
    }

    #[test]
    fn radius_filter_rejects_bad_parameters() {
        assert!(RadiusFilter::new(Coordinate::new(42.1, -75.9), -1.0).is_none());
        assert!(RadiusFilter::new(Coordinate::new(42.1, -75.9), f64::NAN).is_none());
        assert!(RadiusFilter::new(Coordinate::new(95.0, -75.9), 1.0).is_none());
    }

    #[test]
    fn feet_round_trip() {
        assert!((km_to_feet(1.0) - 3_280.839_895).abs() < 1e-9);
        assert!((feet_to_km(km_to_feet(2.5)) - 2.5).abs() < 1e-12);
    }
}
