use crate::core::geocode::{self, GeoError, SHARE_KEY_PRECISION};
use serde::{Deserialize, Serialize};

/// A point on the globe in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Build a validated coordinate
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        geocode::validate_coordinate(latitude, longitude)?;
        Ok(Self { latitude, longitude })
    }
}

/// A coordinate together with its proximity key
///
/// The key is always derived from the coordinate; there is no way to build
/// or deserialize a `Location` with an independently supplied key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Coordinate")]
pub struct Location {
    latitude: f64,
    longitude: f64,
    geohash: String,
}

impl Location {
    pub fn from_coordinate(coordinate: Coordinate) -> Result<Self, GeoError> {
        let geohash = geocode::encode(coordinate.latitude, coordinate.longitude, SHARE_KEY_PRECISION)?;
        Ok(Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            geohash,
        })
    }

    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        Self::from_coordinate(Coordinate { latitude, longitude })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn geohash(&self) -> &str {
        &self.geohash
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

impl TryFrom<Coordinate> for Location {
    type Error = GeoError;

    fn try_from(coordinate: Coordinate) -> Result<Self, Self::Error> {
        Self::from_coordinate(coordinate)
    }
}

/// Snapshot of a streaming-service track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    /// All artist names joined with ", "
    pub artist: String,
    pub album: String,
    pub album_art: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    pub external_url: String,
}

/// What the user is listening to right now
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentlyPlaying {
    Playing(Track),
    NotPlaying,
}

impl CurrentlyPlaying {
    pub fn track(&self) -> Option<&Track> {
        match self {
            CurrentlyPlaying::Playing(track) => Some(track),
            CurrentlyPlaying::NotPlaying => None,
        }
    }
}

/// Wire shape of `CurrentlyPlaying`: `{isPlaying, track?}`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentlyPlayingWire {
    is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    track: Option<Track>,
}

impl Serialize for CurrentlyPlaying {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CurrentlyPlayingWire {
            is_playing: self.track().is_some(),
            track: self.track().cloned(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CurrentlyPlaying {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = CurrentlyPlayingWire::deserialize(deserializer)?;
        Ok(match (wire.is_playing, wire.track) {
            (true, Some(track)) => CurrentlyPlaying::Playing(track),
            _ => CurrentlyPlaying::NotPlaying,
        })
    }
}

/// A share as submitted, before the store assigns id and creation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShare {
    pub user_id: String,
    pub username: String,
    pub track: Track,
    pub location: Location,
    /// Client clock, epoch milliseconds
    pub timestamp: i64,
}

/// A persisted share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub track: Track,
    pub location: Location,
    pub timestamp: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl ShareRecord {
    pub fn from_new(id: String, share: NewShare, created_at: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            id,
            user_id: share.user_id,
            username: share.username,
            track: share.track,
            location: share.location,
            timestamp: share.timestamp,
            created_at,
        }
    }
}

/// Signed-in streaming-service user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_image: Option<String>,
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
    /// The unclamped box spilled over +/-180 degrees longitude
    pub crosses_antimeridian: bool,
}

/// Inclusive proximity-key range for a radius query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub lower: String,
    pub upper: String,
}

impl RangeBounds {
    /// Lexicographic `lower <= key <= upper`
    pub fn contains(&self, key: &str) -> bool {
        self.lower.as_str() <= key && key <= self.upper.as_str()
    }
}

/// Parameters of a store range query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeQuery {
    pub bounds: RangeBounds,
    pub limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_derives_key() {
        let location = Location::new(37.5665, 126.9780).unwrap();
        assert_eq!(
            location.geohash(),
            geocode::encode(37.5665, 126.9780, SHARE_KEY_PRECISION).unwrap()
        );
    }

    #[test]
    fn test_location_deserialize_ignores_supplied_key() {
        let json = r#"{"latitude": 37.5665, "longitude": 126.9780, "geohash": "000000000"}"#;
        let location: Location = serde_json::from_str(json).unwrap();
        assert_ne!(location.geohash(), "000000000");
        assert!(location.geohash().starts_with("wydm"));
    }

    #[test]
    fn test_location_deserialize_rejects_invalid() {
        let json = r#"{"latitude": 120.0, "longitude": 0.0}"#;
        assert!(serde_json::from_str::<Location>(json).is_err());
    }

    #[test]
    fn test_location_serializes_key() {
        let location = Location::new(0.0, 0.0).unwrap();
        let value = serde_json::to_value(&location).unwrap();
        assert_eq!(value["geohash"], "s00000000");
    }

    #[test]
    fn test_currently_playing_wire_format() {
        let idle = serde_json::to_value(CurrentlyPlaying::NotPlaying).unwrap();
        assert_eq!(idle, serde_json::json!({ "isPlaying": false }));

        let json = r#"{"isPlaying": true, "track": {"id": "t1", "name": "Song", "artist": "Artist",
            "album": "Album", "albumArt": "url", "externalUrl": "url"}}"#;
        let playing: CurrentlyPlaying = serde_json::from_str(json).unwrap();
        assert_eq!(playing.track().map(|t| t.id.as_str()), Some("t1"));

        let paused: CurrentlyPlaying = serde_json::from_str(r#"{"isPlaying": false}"#).unwrap();
        assert_eq!(paused, CurrentlyPlaying::NotPlaying);
    }

    #[test]
    fn test_range_bounds_contains_is_inclusive() {
        let bounds = RangeBounds {
            lower: "wydm0".to_string(),
            upper: "wydmz".to_string(),
        };
        assert!(bounds.contains("wydm0"));
        assert!(bounds.contains("wydmz"));
        assert!(bounds.contains("wydm9qyc8"));
        assert!(!bounds.contains("wydk"));
        assert!(!bounds.contains("wydn0"));
    }
}
