//! Default geodesic distance: great-circle (haversine) over `"lat,lon"`
//!
//! Coordinates are decimal degrees separated by a comma, e.g.
//! `"40.2338,-111.6585"`. Distances are in meters.

use crate::proximity::Distance;
use crate::types::Coordinate;

/// Mean Earth radius (IUGG), meters
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Parse `"lat,lon"`. Rejects out-of-range or non-finite values.
    pub fn parse(coords: &str) -> Option<Self> {
        let (lat, lon) = coords.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;

        if !lat.is_finite() || !lon.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return None;
        }

        Some(Self { lat, lon })
    }

    /// Great-circle distance in meters
    pub fn haversine(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
    }
}

/// [`Distance`] in meters between `"lat,lon"` coordinates
#[derive(Debug, Clone, Copy, Default)]
pub struct Haversine;

impl Distance for Haversine {
    fn distance(&self, a: &Coordinate, b: &Coordinate) -> f64 {
        match (GeoPoint::parse(a.as_str()), GeoPoint::parse(b.as_str())) {
            (Some(a), Some(b)) => a.haversine(&b),
            _ => f64::INFINITY,
        }
    }
}
