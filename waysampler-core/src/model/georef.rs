//! Projection between geodetic coordinates and world space.
//!
//! The renderer owns the authoritative georeference; the pipeline only needs
//! the [`Georeference`] contract, so tests and headless runs can supply
//! their own projection.

use serde::{Deserialize, Serialize};

use super::WorldPos;

/// Mean earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Longitude/latitude in degrees plus ellipsoidal height in meters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
    pub height: f64,
}

impl GeoPoint {
    pub const fn new(lon: f64, lat: f64, height: f64) -> Self {
        Self { lon, lat, height }
    }
}

/// Geodetic <-> world projection collaborator
pub trait Georeference: Send + Sync {
    fn to_world(&self, point: GeoPoint) -> WorldPos;

    fn to_geodetic(&self, position: WorldPos) -> GeoPoint;

    /// Height assigned to map nodes, which carry no elevation of their own
    fn origin_height(&self) -> f64;
}

/// Equirectangular projection around an origin, good enough for city-sized
/// areas. World units are `units_per_meter` per meter (100 for centimeters).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalTangentPlane {
    pub origin: GeoPoint,
    pub units_per_meter: f64,
}

impl LocalTangentPlane {
    pub fn new(origin: GeoPoint, units_per_meter: f64) -> Self {
        Self {
            origin,
            units_per_meter,
        }
    }

    fn meters_per_degree_lon(&self) -> f64 {
        EARTH_RADIUS_M.to_radians() * self.origin.lat.to_radians().cos()
    }

    fn meters_per_degree_lat() -> f64 {
        EARTH_RADIUS_M.to_radians()
    }
}

impl Georeference for LocalTangentPlane {
    fn to_world(&self, point: GeoPoint) -> WorldPos {
        WorldPos::new(
            (point.lon - self.origin.lon) * self.meters_per_degree_lon() * self.units_per_meter,
            (point.lat - self.origin.lat) * Self::meters_per_degree_lat() * self.units_per_meter,
            (point.height - self.origin.height) * self.units_per_meter,
        )
    }

    fn to_geodetic(&self, position: WorldPos) -> GeoPoint {
        let meters_per_lon = self.meters_per_degree_lon();
        let lon = if meters_per_lon.abs() <= f64::EPSILON {
            self.origin.lon
        } else {
            self.origin.lon + position.x / self.units_per_meter / meters_per_lon
        };
        GeoPoint {
            lon,
            lat: self.origin.lat
                + position.y / self.units_per_meter / Self::meters_per_degree_lat(),
            height: self.origin.height + position.z / self.units_per_meter,
        }
    }

    fn origin_height(&self) -> f64 {
        self.origin.height
    }
}

/// Treats longitude/latitude as already projected planar coordinates,
/// scaled by `scale`. Used for pre-projected datasets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarGeoreference {
    pub scale: f64,
}

impl Default for PlanarGeoreference {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl Georeference for PlanarGeoreference {
    fn to_world(&self, point: GeoPoint) -> WorldPos {
        WorldPos::new(
            point.lon * self.scale,
            point.lat * self.scale,
            point.height * self.scale,
        )
    }

    fn to_geodetic(&self, position: WorldPos) -> GeoPoint {
        GeoPoint::new(
            position.x / self.scale,
            position.y / self.scale,
            position.z / self.scale,
        )
    }

    fn origin_height(&self) -> f64 {
        0.0
    }
}
