use crate::models::Coordinate;
use thiserror::Error;

/// Key length used for every stored share (cells of roughly 4.8m x 4.8m)
pub const SHARE_KEY_PRECISION: usize = 9;

/// Longest key the encoder produces
pub const MAX_PRECISION: usize = 12;

/// Geohash base-32 alphabet, in ascending byte order
const ALPHABET: &str = "0123456789bcdefghjkmnpqrstuvwxyz";

/// Errors raised by the pure geo functions on malformed input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("Invalid proximity key: {0:?}")]
    InvalidKey(String),

    #[error("Invalid precision {0}: must be between 1 and {MAX_PRECISION}")]
    InvalidPrecision(usize),

    #[error("Invalid radius {0}: must be a positive finite number of kilometers")]
    InvalidRadius(f64),
}

/// Reject NaN, infinite and out-of-range coordinates
///
/// Coordinates are never clamped: a reading outside [-90, 90] x [-180, 180]
/// is a caller bug and fails with `InvalidCoordinate`.
pub fn validate_coordinate(latitude: f64, longitude: f64) -> Result<(), GeoError> {
    if (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude) {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate { latitude, longitude })
    }
}

/// Encode a coordinate into a proximity key of the given length
///
/// Deterministic: equal inputs always yield equal keys.
pub fn encode(latitude: f64, longitude: f64, precision: usize) -> Result<String, GeoError> {
    validate_coordinate(latitude, longitude)?;

    if precision == 0 || precision > MAX_PRECISION {
        return Err(GeoError::InvalidPrecision(precision));
    }

    geohash::encode(geohash::Coord { x: longitude, y: latitude }, precision)
        .map_err(|_| GeoError::InvalidCoordinate { latitude, longitude })
}

/// Decode a key to the center of its cell
pub fn decode(key: &str) -> Result<Coordinate, GeoError> {
    decode_with_error(key).map(|(center, _, _)| center)
}

/// Decode a key to the center of its cell plus the cell half-extents
///
/// Returns `(center, latitude_error, longitude_error)` in degrees.
pub fn decode_with_error(key: &str) -> Result<(Coordinate, f64, f64), GeoError> {
    validate_key(key)?;

    let (center, lon_err, lat_err) =
        geohash::decode(key).map_err(|_| GeoError::InvalidKey(key.to_string()))?;

    Ok((
        Coordinate {
            latitude: center.y,
            longitude: center.x,
        },
        lat_err,
        lon_err,
    ))
}

/// Check a key's length and alphabet without decoding it
pub fn validate_key(key: &str) -> Result<(), GeoError> {
    let well_formed = !key.is_empty()
        && key.len() <= MAX_PRECISION
        && key.chars().all(|c| ALPHABET.contains(c));

    if well_formed {
        Ok(())
    } else {
        Err(GeoError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_value() {
        // Well-known reference key for this point
        let key = encode(42.6, -5.6, 5).unwrap();
        assert_eq!(key, "ezs42");
    }

    #[test]
    fn test_encode_is_deterministic() {
        let a = encode(37.5665, 126.9780, SHARE_KEY_PRECISION).unwrap();
        let b = encode(37.5665, 126.9780, SHARE_KEY_PRECISION).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), SHARE_KEY_PRECISION);
        assert!(a.starts_with("wydm"));
    }

    #[test]
    fn test_encode_rejects_invalid_input() {
        assert!(matches!(encode(91.0, 0.0, 9), Err(GeoError::InvalidCoordinate { .. })));
        assert!(matches!(encode(0.0, -180.5, 9), Err(GeoError::InvalidCoordinate { .. })));
        assert!(matches!(encode(f64::NAN, 0.0, 9), Err(GeoError::InvalidCoordinate { .. })));
        assert!(matches!(encode(0.0, f64::INFINITY, 9), Err(GeoError::InvalidCoordinate { .. })));
        assert_eq!(encode(0.0, 0.0, 0), Err(GeoError::InvalidPrecision(0)));
        assert_eq!(encode(0.0, 0.0, 13), Err(GeoError::InvalidPrecision(13)));
    }

    #[test]
    fn test_encode_accepts_extremes() {
        assert!(encode(90.0, 180.0, 9).is_ok());
        assert!(encode(-90.0, -180.0, 9).is_ok());
    }

    #[test]
    fn test_decode_lands_in_cell() {
        let (center, lat_err, lon_err) = decode_with_error("ezs42").unwrap();
        assert!((center.latitude - 42.6).abs() <= lat_err);
        assert!((center.longitude - -5.6).abs() <= lon_err);
    }

    #[test]
    fn test_decode_rejects_malformed_keys() {
        assert!(matches!(decode(""), Err(GeoError::InvalidKey(_))));
        assert!(matches!(decode("ezs4a"), Err(GeoError::InvalidKey(_))));
        assert!(matches!(decode("EZS42"), Err(GeoError::InvalidKey(_))));
        assert!(matches!(decode("0123456789bcd"), Err(GeoError::InvalidKey(_))));
    }

    #[test]
    fn test_alphabet_is_sorted() {
        let bytes = ALPHABET.as_bytes();
        assert!(bytes.windows(2).all(|w| w[0] < w[1]));
    }
}
