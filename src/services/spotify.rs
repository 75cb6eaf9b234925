use crate::models::{CurrentlyPlaying, Track};
use crate::services::session::{AccessTokenProvider, AuthError};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Public Spotify Web API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

/// Errors that can occur when interacting with the Spotify Web API
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Unauthorized: access token rejected")]
    Unauthorized,

    #[error("API returned error: {0}")]
    ApiError(String),

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

/// Spotify Web API client
///
/// Only the "currently playing" endpoint is used. Tokens come from an
/// `AccessTokenProvider` on every call, so one client serves many sessions.
pub struct SpotifyClient {
    base_url: String,
    client: Client,
}

impl SpotifyClient {
    /// Create a new Spotify client
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, SpotifyError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { base_url, client })
    }

    /// Fetch what the token's owner is playing right now
    ///
    /// `204 No Content`, a payload without `item`, and `is_playing: false`
    /// all map to `NotPlaying`.
    pub async fn currently_playing(
        &self,
        tokens: &dyn AccessTokenProvider,
    ) -> Result<CurrentlyPlaying, SpotifyError> {
        let access_token = tokens.valid_access_token().await?;

        let url = format!(
            "{}/me/player/currently-playing",
            self.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => return Ok(CurrentlyPlaying::NotPlaying),
            StatusCode::UNAUTHORIZED => return Err(SpotifyError::Unauthorized),
            status if !status.is_success() => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unable to read body".to_string());
                tracing::error!("Spotify currently-playing failed: {} - {}", status, body);
                return Err(SpotifyError::ApiError(format!(
                    "Failed to get currently playing track: {}",
                    status
                )));
            }
            _ => {}
        }

        let payload: PlayerPayload = response
            .json()
            .await
            .map_err(|e| SpotifyError::InvalidResponse(format!("Failed to parse player state: {}", e)))?;

        Ok(payload.into_currently_playing())
    }
}

#[derive(Debug, Deserialize)]
struct PlayerPayload {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    item: Option<PlayerItem>,
}

#[derive(Debug, Deserialize)]
struct PlayerItem {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<NamedEntity>,
    album: PlayerAlbum,
    #[serde(default)]
    preview_url: Option<String>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlayerAlbum {
    name: String,
    #[serde(default)]
    images: Vec<ImageRef>,
}

#[derive(Debug, Deserialize)]
struct ImageRef {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

impl PlayerPayload {
    fn into_currently_playing(self) -> CurrentlyPlaying {
        match self.item {
            Some(item) if self.is_playing => CurrentlyPlaying::Playing(Track {
                id: item.id,
                name: item.name,
                artist: item
                    .artists
                    .iter()
                    .map(|artist| artist.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                album: item.album.name,
                album_art: item
                    .album
                    .images
                    .into_iter()
                    .next()
                    .map(|image| image.url)
                    .unwrap_or_default(),
                preview_url: item.preview_url,
                external_url: item.external_urls.spotify,
            }),
            _ => CurrentlyPlaying::NotPlaying,
        }
    }
}
