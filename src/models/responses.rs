use crate::models::domain::{ShareRecord, Track};
use serde::{Deserialize, Serialize};

/// Response for the create share endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateShareResponse {
    pub id: String,
}

/// Response for sharing the currently playing track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareNowPlayingResponse {
    pub id: String,
    pub track: Track,
}

/// A share annotated with its distance from the query center
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyShare {
    #[serde(flatten)]
    pub share: ShareRecord,
    pub distance_km: f64,
}

/// Response for the nearby endpoint and each live snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbySharesResponse {
    pub shares: Vec<NearbyShare>,
    pub radius_km: f64,
    pub total_results: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}
