//! Coordinate and distance primitives shared by the population providers.

use serde::{Deserialize, Serialize};

use crate::error::ImpactError;

pub const KM_PER_DEGREE_LAT: f64 = 111.32;
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this cosine the longitude span is computed as if at the equator.
const MIN_COS_LATITUDE: f64 = 1e-9;

/// Latitude/longitude in degrees. Longitude is kept within [-180, 180].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Validated point: finite coordinates, latitude within [-90, 90].
    /// Longitude is wrapped rather than rejected.
    pub fn new(lat: f64, lng: f64) -> Result<Self, ImpactError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(ImpactError::InvalidQuery(format!(
                "coordinates must be finite, got ({lat}, {lng})"
            )));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ImpactError::InvalidQuery(format!(
                "latitude {lat} out of range [-90, 90]"
            )));
        }
        Ok(Self {
            lat,
            lng: wrap_longitude(lng),
        })
    }

    /// Point from provider data; `None` unless it would pass [`GeoPoint::new`].
    pub fn checked(lat: f64, lng: f64) -> Option<Self> {
        Self::new(lat, lng).ok()
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_distance_km(self, other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// Copy with every edge rounded to four decimals, as sent in query strings.
    pub fn rounded(&self) -> Self {
        let r = |v: f64| (v * 10_000.0).round() / 10_000.0;
        Self {
            north: r(self.north),
            south: r(self.south),
            east: r(self.east),
            west: r(self.west),
        }
    }
}

pub fn km_to_degrees_latitude(km: f64) -> f64 {
    km / KM_PER_DEGREE_LAT
}

pub fn km_to_degrees_longitude(km: f64, at_latitude_deg: f64) -> f64 {
    let cos = at_latitude_deg.to_radians().cos();
    let denom = if cos.abs() < MIN_COS_LATITUDE {
        KM_PER_DEGREE_LAT
    } else {
        KM_PER_DEGREE_LAT * cos
    };
    km / denom
}

/// Wraps any finite longitude into [-180, 180].
pub fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 {
        180.0
    } else {
        wrapped
    }
}

pub fn bounding_box(center: &GeoPoint, radius_km: f64) -> BoundingBox {
    let radius_km = radius_km.max(0.0);
    let d_lat = km_to_degrees_latitude(radius_km);
    let d_lng = km_to_degrees_longitude(radius_km, center.lat);

    let north = (center.lat + d_lat).clamp(-90.0, 90.0);
    let south = (center.lat - d_lat).clamp(-90.0, 90.0);

    // A span reaching all the way round covers every longitude.
    let (east, west) = if d_lng >= 180.0 {
        (180.0, -180.0)
    } else {
        (
            wrap_longitude(center.lng + d_lng),
            wrap_longitude(center.lng - d_lng),
        )
    };

    BoundingBox {
        north,
        south,
        east,
        west,
    }
}

pub fn haversine_distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let s = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * s.sqrt().clamp(0.0, 1.0).asin()
}
