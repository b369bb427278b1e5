//! Great-circle helpers on a spherical Earth.
//!
//! - Latitude: degrees north (-90 to 90)
//! - Longitude: degrees east (-180 to 180)
//! - Bearing: degrees true (0 to 360, 0 = north, 90 = east)
//! - Distance: metres

// ============================================================================
// Imports
// ============================================================================

use std::f64::consts::PI;

// ============================================================================
// Constants
// ============================================================================

/// Mean Earth radius in metres (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

const DEG_TO_RAD: f64 = PI / 180.0;
const RAD_TO_DEG: f64 = 180.0 / PI;

// ============================================================================
// Functions
// ============================================================================

/// Initial great-circle bearing from `from` to `to`.
///
/// Positions are `(latitude, longitude)` in degrees. Returns a value in
/// `[0, 360)`; identical points yield `0`.
///
/// # Example
///
/// ```ignore
/// let bearing = bearing_degrees((0.0, 0.0), (0.0, 1.0));
/// assert!((bearing - 90.0).abs() < 0.1);
/// ```
#[must_use]
pub fn bearing_degrees(from: (f64, f64), to: (f64, f64)) -> f32 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let y = delta_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * delta_lon.cos();

    let bearing = (y.atan2(x) * RAD_TO_DEG).rem_euclid(360.0) as f32;

    // f32 rounding can land exactly on 360.
    if bearing >= 360.0 { 0.0 } else { bearing }
}

/// Haversine distance between two positions, in metres.
#[must_use]
pub fn distance_m(from: (f64, f64), to: (f64, f64)) -> f64 {
    let (lat1, lon1) = from;
    let (lat2, lon2) = to;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lat = (lat2 - lat1) * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// Point reached by travelling `distance_m` from `from` along `bearing`.
#[must_use]
pub fn destination(from: (f64, f64), bearing: f64, distance_m: f64) -> (f64, f64) {
    let (lat1, lon1) = from;
    let lat1_rad = lat1 * DEG_TO_RAD;
    let lon1_rad = lon1 * DEG_TO_RAD;
    let bearing_rad = bearing * DEG_TO_RAD;
    let angular = distance_m / EARTH_RADIUS_M;

    let lat2_rad = (lat1_rad.sin() * angular.cos()
        + lat1_rad.cos() * angular.sin() * bearing_rad.cos())
    .asin();
    let lon2_rad = lon1_rad
        + (bearing_rad.sin() * angular.sin() * lat1_rad.cos())
            .atan2(angular.cos() - lat1_rad.sin() * lat2_rad.sin());

    (lat2_rad * RAD_TO_DEG, lon2_rad * RAD_TO_DEG)
}

// ============================================================================
// Tests
// ============================================================================
