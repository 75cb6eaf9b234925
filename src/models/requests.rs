use crate::models::domain::Track;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to publish a share with an explicit track
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateShareRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub username: String,
    pub track: Track,
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    /// Client clock in epoch millis; the server clock is used when absent
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Request to publish whatever the caller is playing right now
///
/// Without a position the server's own location source is used.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShareNowPlayingRequest {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(default)]
    pub latitude: Option<f64>,
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(default)]
    pub longitude: Option<f64>,
}

/// Query string for nearby lookups
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NearbyQuery {
    #[validate(range(min = -90.0, max = 90.0))]
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    #[serde(alias = "longitude")]
    pub lon: f64,
    #[validate(range(exclusive_min = 0.0))]
    #[serde(alias = "radius_km", rename = "radiusKm", default)]
    pub radius_km: Option<f64>,
}

/// Query string for the now-playing lookup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NowPlayingQuery {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearby_query_validation() {
        let ok = NearbyQuery { lat: 37.5, lon: 127.0, radius_km: Some(5.0) };
        assert!(ok.validate().is_ok());

        let bad_lat = NearbyQuery { lat: 91.0, lon: 127.0, radius_km: None };
        assert!(bad_lat.validate().is_err());

        let bad_radius = NearbyQuery { lat: 37.5, lon: 127.0, radius_km: Some(0.0) };
        assert!(bad_radius.validate().is_err());
    }

    #[test]
    fn test_create_share_request_parses_camel_case() {
        let json = r#"{
            "userId": "u1",
            "username": "listener",
            "track": {"id": "t1", "name": "Song", "artist": "Artist", "album": "Album",
                      "albumArt": "url", "externalUrl": "url"},
            "latitude": 37.5665,
            "longitude": 126.9780
        }"#;
        let req: CreateShareRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.user_id, "u1");
        assert_eq!(req.timestamp, None);
        assert!(req.validate().is_ok());
    }
}
