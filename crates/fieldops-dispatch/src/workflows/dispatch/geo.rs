//! Spherical-earth helpers used by candidate selection.

use serde::{Deserialize, Serialize};

/// Mean earth radius used for every radius conversion in the engine.
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("coordinates out of range: lat={lat}, lng={lng}")]
pub struct InvalidCoordinates {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinates> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if valid {
            Ok(Self { lat, lng })
        } else {
            Err(InvalidCoordinates { lat, lng })
        }
    }

    /// Central angle between two points (haversine), in radians.
    pub fn angular_distance(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * a.sqrt().min(1.0).asin()
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        self.angular_distance(other) * EARTH_RADIUS_M
    }

    /// Inclusive radius check: a point exactly on the boundary is inside.
    pub fn within(&self, other: &GeoPoint, radius_m: f64) -> bool {
        self.distance_m(other) <= radius_m
    }
}

/// Converts a radius in meters into the angular radius on the engine's sphere.
pub fn radius_in_radians(radius_m: f64) -> f64 {
    radius_m / EARTH_RADIUS_M
}
