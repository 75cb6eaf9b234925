// Core algorithm exports
pub mod distance;
pub mod geocode;
pub mod range;

pub use distance::{distance_km, haversine_distance, within_radius, EARTH_RADIUS_KM};
pub use geocode::{decode, decode_with_error, encode, GeoError, SHARE_KEY_PRECISION};
pub use range::{bounding_box, key_range};
