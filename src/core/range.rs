//! Radius to key-range estimation.
//!
//! A radius query is approximated by an axis-aligned lat/lon box whose two
//! corners are encoded as the lower and upper proximity keys. Geohash keys
//! interleave longitude and latitude bits in a Z-order curve, so every point
//! inside the box has a key between the two corner keys. The key range is a
//! superset of the box, and the box is a superset of the disk.
//!
//! The approximation breaks down in two places:
//! - near the poles, where `cos(latitude)` tends to zero and the longitude
//!   delta blows up. The delta is capped at 180 degrees, and a box that
//!   reaches a pole spans every longitude, which is correct but pulls in a
//!   wide band of keys;
//! - across the antimeridian, where the box would need two key ranges. The
//!   box is clamped to [-180, 180] instead and the far side is not covered.

use crate::core::geocode::{encode, validate_coordinate, GeoError, SHARE_KEY_PRECISION};
use crate::models::{BoundingBox, Coordinate, RangeBounds};

/// Kilometers per degree of latitude used for box sizing
pub const KM_PER_DEGREE: f64 = 111.32;

/// Widening applied to both deltas so the disk stays inside the box on a
/// 6371 km sphere, where a degree is slightly shorter than `KM_PER_DEGREE`
const COVERAGE_MARGIN: f64 = 1.01;

fn validate_radius(radius_km: f64) -> Result<(), GeoError> {
    if radius_km.is_finite() && radius_km > 0.0 {
        Ok(())
    } else {
        Err(GeoError::InvalidRadius(radius_km))
    }
}

/// Calculate a bounding box around a center point
///
/// 1 degree latitude is about 111.32 km; 1 degree longitude is about
/// 111.32 km * cos(latitude). The result is clamped to valid coordinates.
///
/// # Arguments
/// * `center` - Center of the search
/// * `radius_km` - Radius in kilometers
pub fn bounding_box(center: &Coordinate, radius_km: f64) -> Result<BoundingBox, GeoError> {
    validate_coordinate(center.latitude, center.longitude)?;
    validate_radius(radius_km)?;

    let lat_delta = radius_km / KM_PER_DEGREE * COVERAGE_MARGIN;
    let min_lat = center.latitude - lat_delta;
    let max_lat = center.latitude + lat_delta;

    // A disk that reaches a pole covers every longitude
    let lon_delta = if min_lat <= -90.0 || max_lat >= 90.0 {
        180.0
    } else {
        let cos_lat = center.latitude.to_radians().cos().abs();
        (radius_km / (KM_PER_DEGREE * cos_lat) * COVERAGE_MARGIN).min(180.0)
    };

    let raw_min_lon = center.longitude - lon_delta;
    let raw_max_lon = center.longitude + lon_delta;
    let spans_all_longitudes = lon_delta >= 180.0;

    let (min_lon, max_lon) = if spans_all_longitudes {
        (-180.0, 180.0)
    } else {
        (raw_min_lon.max(-180.0), raw_max_lon.min(180.0))
    };

    Ok(BoundingBox {
        min_lat: min_lat.max(-90.0),
        max_lat: max_lat.min(90.0),
        min_lon,
        max_lon,
        crosses_antimeridian: !spans_all_longitudes
            && (raw_min_lon < -180.0 || raw_max_lon > 180.0),
    })
}

/// Compute the lower/upper key bounds covering a radius around `center`
pub fn key_range(center: &Coordinate, radius_km: f64) -> Result<RangeBounds, GeoError> {
    let bbox = bounding_box(center, radius_km)?;

    if bbox.crosses_antimeridian {
        tracing::warn!(
            latitude = center.latitude,
            longitude = center.longitude,
            radius_km,
            "Search box crosses the antimeridian; shares on the far side are not covered"
        );
    }

    Ok(RangeBounds {
        lower: encode(bbox.min_lat, bbox.min_lon, SHARE_KEY_PRECISION)?,
        upper: encode(bbox.max_lat, bbox.max_lon, SHARE_KEY_PRECISION)?,
    })
}
