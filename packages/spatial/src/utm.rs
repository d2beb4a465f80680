//! Inverse transverse-Mercator projection on the WGS84 ellipsoid.
//!
//! Closed-form series (Snyder, *Map Projections: A Working Manual*, eqs.
//! 3-26 and 8-12 to 8-25) accurate to well under a meter inside a zone.

use blotter_incident_models::Coordinate;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// WGS84 semi-major axis in meters.
const SEMI_MAJOR_AXIS: f64 = 6_378_137.0;
/// WGS84 flattening.
const FLATTENING: f64 = 1.0 / 298.257_223_563;
/// UTM central-meridian scale factor.
const SCALE_FACTOR: f64 = 0.9996;
const FALSE_EASTING: f64 = 500_000.0;
/// Applied to southern-hemisphere northings.
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Errors converting a projected coordinate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// Easting or northing is NaN or infinite.
    #[error("Non-finite projected coordinate ({easting}, {northing})")]
    NonFinite {
        /// Easting in meters.
        easting: f64,
        /// Northing in meters.
        northing: f64,
    },

    /// The zone number is outside 1..=60.
    #[error("Invalid UTM zone {zone}")]
    InvalidZone {
        /// The offending zone number.
        zone: u8,
    },

    /// The conversion produced a position outside the valid degree ranges.
    #[error("Projected coordinate ({easting}, {northing}) is outside the zone")]
    OutOfRange {
        /// Easting in meters.
        easting: f64,
        /// Northing in meters.
        northing: f64,
    },
}

/// Hemisphere of a UTM zone.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Hemisphere {
    /// Northern hemisphere.
    #[default]
    #[serde(alias = "N", alias = "n")]
    #[strum(serialize = "north", serialize = "n")]
    North,
    /// Southern hemisphere (10,000 km false northing).
    #[serde(alias = "S", alias = "s")]
    #[strum(serialize = "south", serialize = "s")]
    South,
}

/// A UTM zone: number 1..=60 plus hemisphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtmZone {
    /// Zone number.
    pub zone: u8,
    /// Hemisphere.
    pub hemisphere: Hemisphere,
}

impl Default for UtmZone {
    /// Zone 18N (New York / Pennsylvania).
    fn default() -> Self {
        Self::north(18)
    }
}

impl UtmZone {
    /// A northern-hemisphere zone.
    #[must_use]
    pub const fn north(zone: u8) -> Self {
        Self {
            zone,
            hemisphere: Hemisphere::North,
        }
    }

    /// A southern-hemisphere zone.
    #[must_use]
    pub const fn south(zone: u8) -> Self {
        Self {
            zone,
            hemisphere: Hemisphere::South,
        }
    }

    /// Longitude of the zone's central meridian, in degrees.
    #[must_use]
    pub fn central_meridian(self) -> f64 {
        f64::from(self.zone).mul_add(6.0, -183.0)
    }
}

/// Converts a UTM easting/northing (meters) to WGS84 latitude/longitude.
///
/// Deterministic: the same inputs always produce the same output.
///
/// # Errors
///
/// Returns [`ProjectionError`] for non-finite input, a zone outside
/// 1..=60, or a result outside the valid degree ranges.
#[allow(clippy::many_single_char_names, clippy::similar_names)]
pub fn utm_to_lat_lon(easting: f64, northing: f64, zone: UtmZone) -> Result<Coordinate, ProjectionError> {
    if !easting.is_finite() || !northing.is_finite() {
        return Err(ProjectionError::NonFinite { easting, northing });
    }
    if !(1..=60).contains(&zone.zone) {
        return Err(ProjectionError::InvalidZone { zone: zone.zone });
    }

    let a = SEMI_MAJOR_AXIS;
    let e2 = FLATTENING * (2.0 - FLATTENING);
    let ep2 = e2 / (1.0 - e2);
    let k0 = SCALE_FACTOR;

    let x = easting - FALSE_EASTING;
    let y = match zone.hemisphere {
        Hemisphere::North => northing,
        Hemisphere::South => northing - FALSE_NORTHING_SOUTH,
    };

    // Footpoint latitude from the meridional arc.
    let m = y / k0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));
    let sqrt_1_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();
    let w = 1.0 - e2 * sin_phi1 * sin_phi1;

    let n1 = a / w.sqrt();
    let t1 = tan_phi1 * tan_phi1;
    let c1 = ep2 * cos_phi1 * cos_phi1;
    let r1 = a * (1.0 - e2) / w.powf(1.5);
    let d = x / (n1 * k0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2)
                    - 252.0 * ep2
                    - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
            * d.powi(5)
            / 120.0)
        / cos_phi1;

    let coordinate = Coordinate::new(lat.to_degrees(), zone.central_meridian() + lon.to_degrees());

    if coordinate.is_valid() {
        Ok(coordinate)
    } else {
        Err(ProjectionError::OutOfRange { easting, northing })
    }
}
