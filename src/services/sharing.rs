use crate::models::{CurrentlyPlaying, Location, NewShare, Track};
use crate::services::cache::{CacheKey, CacheManager};
use crate::services::location::{LiveLocationTracker, LocationError};
use crate::services::session::{AccessTokenProvider, Session};
use crate::services::share_index::{ShareIndex, ShareIndexError};
use crate::services::spotify::{SpotifyClient, SpotifyError};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

/// Errors from the "share what I'm playing" flow
#[derive(Debug, Error)]
pub enum SharingError {
    #[error("Nothing is playing right now")]
    NothingPlaying,

    #[error(transparent)]
    Spotify(#[from] SpotifyError),

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error(transparent)]
    Index(#[from] ShareIndexError),
}

/// A share that was just published
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedShare {
    pub id: String,
    pub track: Track,
    pub location: Location,
}

/// Publishes a listener's current track at their current location
#[derive(Clone)]
pub struct ShareComposer {
    index: ShareIndex,
    spotify: Arc<SpotifyClient>,
    cache: Option<Arc<CacheManager>>,
}

impl ShareComposer {
    pub fn new(index: ShareIndex, spotify: Arc<SpotifyClient>) -> Self {
        Self {
            index,
            spotify,
            cache: None,
        }
    }

    /// Cache now-playing lookups per user
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// What the token's owner is playing, served from cache while fresh
    ///
    /// Entries are keyed by the access token as well as `user_id`, so a
    /// cached answer only goes back to a caller holding the same token.
    pub async fn now_playing(
        &self,
        user_id: &str,
        tokens: &dyn AccessTokenProvider,
    ) -> Result<CurrentlyPlaying, SharingError> {
        let access_token = tokens
            .valid_access_token()
            .await
            .map_err(SpotifyError::from)?;
        let key = CacheKey::now_playing(user_id, &access_token);

        if let Some(cache) = &self.cache {
            if let Ok(cached) = cache.get::<CurrentlyPlaying>(&key).await {
                return Ok(cached);
            }
        }

        let playing = self.spotify.currently_playing(tokens).await?;

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.set(&key, &playing).await {
                tracing::warn!("Failed to cache now-playing for {}: {}", user_id, e);
            }
        }

        Ok(playing)
    }

    /// Share the signed-in user's current track at a fresh location fix
    pub async fn share_now(
        &self,
        session: &Session,
        tracker: &LiveLocationTracker,
    ) -> Result<ComposedShare, SharingError> {
        let user = session.user();
        let track = self.playing_track(&user.id, session).await?;
        let location = tracker.get_once().await?;

        self.publish(&user.id, &user.display_name, track, location)
            .await
    }

    /// Share the current track at a location the caller supplies
    pub async fn share_playing_at(
        &self,
        user_id: &str,
        username: &str,
        tokens: &dyn AccessTokenProvider,
        location: Location,
    ) -> Result<ComposedShare, SharingError> {
        let track = self.playing_track(user_id, tokens).await?;
        self.publish(user_id, username, track, location).await
    }

    async fn playing_track(
        &self,
        user_id: &str,
        tokens: &dyn AccessTokenProvider,
    ) -> Result<Track, SharingError> {
        match self.now_playing(user_id, tokens).await? {
            CurrentlyPlaying::Playing(track) => Ok(track),
            CurrentlyPlaying::NotPlaying => Err(SharingError::NothingPlaying),
        }
    }

    async fn publish(
        &self,
        user_id: &str,
        username: &str,
        track: Track,
        location: Location,
    ) -> Result<ComposedShare, SharingError> {
        let share = NewShare {
            user_id: user_id.to_string(),
            username: username.to_string(),
            track: track.clone(),
            location: location.clone(),
            timestamp: Utc::now().timestamp_millis(),
        };

        let id = self.index.add_share(share).await?;

        Ok(ComposedShare { id, track, location })
    }
}
