//! Image file naming.
//!
//! Conventional names encode the sample pose so a dataset can be indexed
//! without its metadata log:
//!
//! `@{east}@{north}@{zone}@{band}@{lat}@{lon}@{pano}@{tile}@{heading}@{pitch}@{roll}@{height}@{timestamp}@{note}@.jpg`
//!
//! The panorama id, tile and timestamp fields are left empty for rendered
//! samples.

use std::path::Path;

use super::Sample;
use crate::{Error, WayId, model::WorldPos};

const WGS84_A: f64 = 6_378_137.0;
const WGS84_E2: f64 = 0.006_694_379_990_14;
const UTM_K0: f64 = 0.9996;
const LATITUDE_BANDS: &[u8] = b"CDEFGHJKLMNPQRSTUVWX";

/// Position in the Universal Transverse Mercator grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UtmCoordinate {
    pub easting: f64,
    pub northing: f64,
    pub zone: u8,
    pub band: char,
}

/// Converts a WGS84 latitude/longitude (degrees) to UTM.
///
/// Latitudes outside the UTM range (-80..=84) get the band letter `Z`.
pub fn lat_lon_to_utm(lat: f64, lon: f64) -> UtmCoordinate {
    let lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
    let zone = utm_zone(lat, lon);
    let central_meridian = f64::from(zone - 1) * 6.0 - 180.0 + 3.0;

    let e2 = WGS84_E2;
    let e4 = e2 * e2;
    let e6 = e4 * e2;
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let tan_phi = phi.tan();

    let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = cos_phi * (lon - central_meridian).to_radians();

    let m = WGS84_A
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

    let easting = UTM_K0
        * n
        * (a + (1.0 - t + c) * a.powi(3) / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a.powi(5) / 120.0)
        + 500_000.0;

    let mut northing = UTM_K0
        * (m + n
            * tan_phi
            * (a * a / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a.powi(4) / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a.powi(6) / 720.0));
    if lat < 0.0 {
        northing += 10_000_000.0;
    }

    UtmCoordinate {
        easting,
        northing,
        zone,
        band: latitude_band(lat),
    }
}

fn utm_zone(lat: f64, lon: f64) -> u8 {
    let mut zone = (((lon + 180.0) / 6.0).floor() as i32 + 1).clamp(1, 60);

    // Southwest Norway
    if (56.0..64.0).contains(&lat) && (3.0..12.0).contains(&lon) {
        zone = 32;
    }
    // Svalbard
    if (72.0..84.0).contains(&lat) {
        zone = match lon {
            l if (0.0..9.0).contains(&l) => 31,
            l if (9.0..21.0).contains(&l) => 33,
            l if (21.0..33.0).contains(&l) => 35,
            l if (33.0..42.0).contains(&l) => 37,
            _ => zone,
        };
    }
    zone as u8
}

fn latitude_band(lat: f64) -> char {
    if !(-80.0..=84.0).contains(&lat) {
        return 'Z';
    }
    let index = (((lat + 80.0) / 8.0).floor() as usize).min(LATITUDE_BANDS.len() - 1);
    char::from(LATITUDE_BANDS[index])
}

/// Conventional image name derived from the sample's final pose
pub fn utm_image_name(sample: &Sample) -> String {
    let utm = lat_lon_to_utm(sample.lat, sample.lon);
    format!(
        "@{:.2}@{:.2}@{}@{}@{:.5}@{:.5}@@@{:.2}@{:.2}@{:.2}@{:.2}@@art_prob_{:.4}@.jpg",
        utm.easting,
        utm.northing,
        utm.zone,
        utm.band,
        sample.lat,
        sample.lon,
        sample.heading_angle,
        sample.pitch,
        sample.roll,
        sample.altitude,
        sample.artifact_probability
    )
}

/// Name derived from a walker location and way, stable across runs
/// because it uses the unadjusted candidate location (millimeter-rounded).
pub fn location_image_name(location: WorldPos, way: WayId) -> String {
    format!(
        "{}-{}-{}-{}.jpg",
        (location.x * 1000.0).round() as i64,
        (location.y * 1000.0).round() as i64,
        (location.z * 1000.0).round() as i64,
        way
    )
}

/// Pose fields recovered from a conventional image name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageNamePose {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    pub pitch: f64,
    pub roll: f64,
    pub altitude: f64,
}

/// Parses a conventional image name (with or without directory and
/// extension).
///
/// # Errors
///
/// Returns [`Error::InvalidData`] if the name has too few fields or a pose
/// field is not a number.
pub fn parse_image_name(name: &str) -> Result<ImageNamePose, Error> {
    let path = Path::new(name);
    let base = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);
    let base = base.strip_suffix(".jpg").unwrap_or(base);
    let parts = base.split('@').collect::<Vec<_>>();
    if parts.len() < 13 {
        return Err(Error::InvalidData(format!(
            "image name '{name}' has {} fields, expected at least 13",
            parts.len()
        )));
    }

    let field = |index: usize, label: &str| -> Result<f64, Error> {
        parts[index].trim().parse::<f64>().map_err(|e| {
            Error::InvalidData(format!("image name '{name}': invalid {label}: {e}"))
        })
    };

    Ok(ImageNamePose {
        lat: field(5, "latitude")?,
        lon: field(6, "longitude")?,
        heading: field(9, "heading")?,
        pitch: field(10, "pitch")?,
        roll: field(11, "roll")?,
        altitude: field(12, "height")?,
    })
}
