#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Coordinate math: projected (UTM) to geographic conversion and
//! great-circle distance filtering.
//!
//! Everything here is a pure function over `f64` degrees and meters.

pub mod distance;
pub mod utm;

pub use distance::{
    EARTH_RADIUS_KM, RadiusFilter, feet_to_km, haversine_km, km_to_feet, to_point, within_radius,
};
pub use utm::{Hemisphere, ProjectionError, UtmZone, utm_to_lat_lon};
