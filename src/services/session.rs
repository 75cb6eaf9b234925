use crate::models::SessionUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors raised when no usable access token is available
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Access token expired at {0}")]
    TokenExpired(DateTime<Utc>),
}

/// Source of bearer tokens for the streaming-service API
///
/// Refreshing tokens is the provider's business; callers only ask for a
/// token that is valid right now.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn valid_access_token(&self) -> Result<String, AuthError>;
}

/// A signed-in user's session
///
/// Created at sign-in and consumed at sign-out. Each session is an
/// independent value, so several can coexist (one per connected listener).
#[derive(Debug, Clone)]
pub struct Session {
    user: SessionUser,
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a session from a completed token exchange
    pub fn sign_in(user: SessionUser, access_token: String, expires_in: Duration) -> Self {
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in).unwrap_or(chrono::Duration::zero());

        tracing::info!(user_id = %user.id, %expires_at, "Session started");

        Self {
            user,
            access_token,
            expires_at,
        }
    }

    pub fn user(&self) -> &SessionUser {
        &self.user
    }

    pub fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty() && Utc::now() < self.expires_at
    }

    /// End the session, returning the user it belonged to
    pub fn sign_out(self) -> SessionUser {
        tracing::info!(user_id = %self.user.id, "Session ended");
        self.user
    }
}

#[async_trait]
impl AccessTokenProvider for Session {
    async fn valid_access_token(&self) -> Result<String, AuthError> {
        if self.access_token.is_empty() {
            return Err(AuthError::NotAuthenticated);
        }
        if Utc::now() >= self.expires_at {
            return Err(AuthError::TokenExpired(self.expires_at));
        }
        Ok(self.access_token.clone())
    }
}

/// A token taken from an incoming `Authorization: Bearer` header
#[derive(Debug, Clone)]
pub struct BearerToken(String);

impl BearerToken {
    /// Parse an `Authorization` header value
    pub fn from_header(value: &str) -> Result<Self, AuthError> {
        value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| Self(token.to_string()))
            .ok_or(AuthError::NotAuthenticated)
    }
}

#[async_trait]
impl AccessTokenProvider for BearerToken {
    async fn valid_access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}
