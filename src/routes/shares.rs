use actix_web::{http::header, http::StatusCode, web, HttpRequest, HttpResponse, Responder};
use bytes::Bytes;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use validator::Validate;
use crate::config::SharingSettings;
use crate::core::distance_km;
use crate::models::{
    Coordinate, CreateShareRequest, CreateShareResponse, ErrorResponse, HealthResponse, Location,
    NearbyQuery, NearbyShare, NearbySharesResponse, NewShare, NowPlayingQuery, ShareNowPlayingRequest,
    ShareNowPlayingResponse, ShareRecord,
};
use crate::services::{
    AuthError, BearerToken, LiveLocationTracker, ShareComposer, ShareIndex, ShareIndexError, SharingError, SpotifyError,
};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub index: ShareIndex,
    pub composer: ShareComposer,
    pub tracker: LiveLocationTracker,
    pub sharing: SharingSettings,
}

/// Configure all share-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/shares", web::post().to(create_share))
        .route("/shares/now-playing", web::post().to(share_now_playing))
        .route("/shares/nearby", web::get().to(nearby_shares))
        .route("/shares/live", web::get().to(live_shares))
        .route("/now-playing", web::get().to(now_playing));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let store_healthy = state.index.health_check().await.unwrap_or(false);

    let status = if store_healthy { "healthy" } else { "degraded" };

    HttpResponse::Ok().json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Publish a share
///
/// POST /api/v1/shares
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "username": "string",
///   "track": { "id": "...", "name": "...", "artist": "...", ... },
///   "latitude": 37.5665,
///   "longitude": 126.978,
///   "timestamp": 1700000000000
/// }
/// ```
async fn create_share(
    state: web::Data<AppState>,
    req: web::Json<CreateShareRequest>,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors.to_string());
    }

    let req = req.into_inner();
    let location = match Location::new(req.latitude, req.longitude) {
        Ok(location) => location,
        Err(e) => return validation_failed(e.to_string()),
    };

    let share = NewShare {
        user_id: req.user_id,
        username: req.username,
        track: req.track,
        location,
        timestamp: req
            .timestamp
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    };

    match state.index.add_share(share).await {
        Ok(id) => HttpResponse::Created().json(CreateShareResponse { id }),
        Err(e) => index_error("Failed to add share", e),
    }
}

/// What the caller is playing right now
///
/// GET /api/v1/now-playing?userId={userId}
///
/// Requires `Authorization: Bearer <streaming-service token>`.
async fn now_playing(
    state: web::Data<AppState>,
    query: web::Query<NowPlayingQuery>,
    http_req: HttpRequest,
) -> impl Responder {
    if let Err(errors) = query.validate() {
        return validation_failed(errors.to_string());
    }

    let token = match bearer_token(&http_req) {
        Ok(token) => token,
        Err(e) => return auth_failed(e),
    };

    match state.composer.now_playing(&query.user_id, &token).await {
        Ok(playing) => HttpResponse::Ok().json(playing),
        Err(e) => sharing_error("Failed to fetch now playing", e),
    }
}

/// Share the caller's currently playing track
///
/// POST /api/v1/shares/now-playing
///
/// Uses the body's `latitude`/`longitude` when present, otherwise the
/// server's configured location source.
///
/// Requires `Authorization: Bearer <streaming-service token>`.
async fn share_now_playing(
    state: web::Data<AppState>,
    req: web::Json<ShareNowPlayingRequest>,
    http_req: HttpRequest,
) -> impl Responder {
    if let Err(errors) = req.validate() {
        return validation_failed(errors.to_string());
    }

    let token = match bearer_token(&http_req) {
        Ok(token) => token,
        Err(e) => return auth_failed(e),
    };

    let location = match (req.latitude, req.longitude) {
        (Some(latitude), Some(longitude)) => match Location::new(latitude, longitude) {
            Ok(location) => location,
            Err(e) => return validation_failed(e.to_string()),
        },
        (None, None) => match state.tracker.get_once().await {
            Ok(location) => location,
            Err(e) => return sharing_error("Failed to locate", SharingError::Location(e)),
        },
        _ => {
            return validation_failed(
                "latitude and longitude must be given together".to_string(),
            )
        }
    };

    match state
        .composer
        .share_playing_at(&req.user_id, &req.username, &token, location)
        .await
    {
        Ok(shared) => HttpResponse::Created().json(ShareNowPlayingResponse {
            id: shared.id,
            track: shared.track,
        }),
        Err(e) => sharing_error("Failed to share now playing", e),
    }
}

/// One-shot nearby lookup
///
/// GET /api/v1/shares/nearby?lat={lat}&lon={lon}&radiusKm={radius}
async fn nearby_shares(
    state: web::Data<AppState>,
    query: web::Query<NearbyQuery>,
) -> impl Responder {
    let (center, radius_km) = match resolve_query(&state.sharing, &query) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    match state.index.nearby(center, radius_km).await {
        Ok(shares) => HttpResponse::Ok().json(nearby_response(shares, &center, radius_km)),
        Err(e) => index_error("Failed to query nearby shares", e),
    }
}

/// Live nearby feed as server-sent events
///
/// GET /api/v1/shares/live?lat={lat}&lon={lon}&radiusKm={radius}
///
/// Emits one `shares` event per snapshot. If the live query fails, a final
/// `error` event carries the reason before the stream ends. The subscription
/// lives as long as the response body, so a client disconnect releases it.
async fn live_shares(
    state: web::Data<AppState>,
    query: web::Query<NearbyQuery>,
) -> impl Responder {
    let (center, radius_km) = match resolve_query(&state.sharing, &query) {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let mut subscription = match state.index.subscribe(center, radius_km, move |shares| {
        let _ = tx.send(nearby_response(shares, &center, radius_km));
    }) {
        Ok(subscription) => subscription,
        Err(e) => return index_error("Failed to open live query", e),
    };

    tracing::info!(
        subscription = %subscription.id(),
        latitude = center.latitude,
        longitude = center.longitude,
        radius_km,
        "Live nearby feed opened"
    );

    let snapshots = UnboundedReceiverStream::new(rx).map(|snapshot| sse_event("shares", &snapshot));

    // Owns the subscription, so a disconnect drops it
    let closing = futures::stream::once(async move {
        match subscription.finished().await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(subscription = %subscription.id(), "Live nearby feed failed: {}", e);
                Some(sse_event(
                    "error",
                    &ErrorResponse {
                        error: "Live query failed".to_string(),
                        message: e.to_string(),
                        status_code: index_status(&e).as_u16(),
                    },
                ))
            }
        }
    })
    .filter_map(futures::future::ready);

    let events = snapshots.chain(closing);

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(events)
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(payload)?;
    Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", name, json)))
}

fn resolve_query(
    sharing: &SharingSettings,
    query: &NearbyQuery,
) -> Result<(Coordinate, f64), HttpResponse> {
    if let Err(errors) = query.validate() {
        return Err(validation_failed(errors.to_string()));
    }

    let center = Coordinate::new(query.lat, query.lon)
        .map_err(|e| validation_failed(e.to_string()))?;

    Ok((center, sharing.effective_radius(query.radius_km)))
}

fn nearby_response(shares: Vec<ShareRecord>, center: &Coordinate, radius_km: f64) -> NearbySharesResponse {
    let shares: Vec<NearbyShare> = shares
        .into_iter()
        .map(|share| NearbyShare {
            distance_km: distance_km(center, &share.location.coordinate()),
            share,
        })
        .collect();

    NearbySharesResponse {
        total_results: shares.len(),
        shares,
        radius_km,
    }
}

fn bearer_token(req: &HttpRequest) -> Result<BearerToken, AuthError> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::NotAuthenticated)
        .and_then(BearerToken::from_header)
}

fn error_response(status: StatusCode, error: &str, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorResponse {
        error: error.to_string(),
        message,
        status_code: status.as_u16(),
    })
}

fn validation_failed(message: String) -> HttpResponse {
    error_response(StatusCode::BAD_REQUEST, "Validation failed", message)
}

fn auth_failed(e: AuthError) -> HttpResponse {
    error_response(StatusCode::UNAUTHORIZED, "Unauthorized", e.to_string())
}

fn index_status(e: &ShareIndexError) -> StatusCode {
    match e {
        ShareIndexError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ShareIndexError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        ShareIndexError::TaskFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn index_error(context: &str, e: ShareIndexError) -> HttpResponse {
    let status = index_status(&e);

    if status.is_server_error() {
        tracing::error!("{}: {}", context, e);
    }
    error_response(status, context, e.to_string())
}

fn sharing_error(context: &str, e: SharingError) -> HttpResponse {
    let status = match &e {
        SharingError::NothingPlaying => StatusCode::CONFLICT,
        SharingError::Spotify(SpotifyError::Unauthorized | SpotifyError::Auth(_)) => {
            StatusCode::UNAUTHORIZED
        }
        SharingError::Spotify(_) => StatusCode::BAD_GATEWAY,
        SharingError::Location(_) => StatusCode::SERVICE_UNAVAILABLE,
        SharingError::Index(e) => index_status(e),
    };

    if status.is_server_error() {
        tracing::error!("{}: {}", context, e);
    }
    error_response(status, context, e.to_string())
}
