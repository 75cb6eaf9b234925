use actix_cors::Cors;
use actix_web::{web, App, HttpServer, HttpResponse, middleware, error, http::StatusCode};
use soundspot::config::{LogFormat, Settings, StoreBackend};
use soundspot::models::Coordinate;
use soundspot::routes::{self, AppState};
use soundspot::services::{
    CacheManager, LiveLocationTracker, MemoryShareStore, PostgresShareStore, ShareComposer,
    ShareIndex, ShareStore, SpotifyClient, StaticLocationSource,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;

/// JSON error response for JSON payload errors
#[derive(Debug, serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub message: String,
    pub status_code: u16,
}

impl std::fmt::Display for JsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

impl std::error::Error for JsonError {}

impl error::ResponseError for JsonError {
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::BAD_REQUEST))
            .json(self)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(err: error::JsonPayloadError, req: &actix_web::HttpRequest) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    JsonError {
        error: "invalid_json".to_string(),
        message: format!("Invalid JSON: {}", err),
        status_code: 400,
    }
    .into()
}

/// Handle query payload errors
pub fn handle_query_payload_error(err: error::QueryPayloadError, _req: &actix_web::HttpRequest) -> actix_web::Error {
    JsonError {
        error: "invalid_query".to_string(),
        message: format!("Invalid query: {}", err),
        status_code: 400,
    }
    .into()
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    match format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    error!("{}: {}", context, e);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    let settings = Settings::load().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
    })?;

    init_logging(&settings.logging.level, settings.logging.format);

    info!("Starting SoundSpot service...");

    let store: Arc<dyn ShareStore> = match settings.store.backend {
        StoreBackend::Memory => {
            warn!("Using in-memory share store; shares are lost on restart");
            Arc::new(MemoryShareStore::new())
        }
        StoreBackend::Postgres => {
            let db = &settings.database;
            let store = PostgresShareStore::from_settings(
                &db.url,
                db.max_connections,
                db.min_connections,
                db.acquire_timeout_secs,
                db.idle_timeout_secs,
            )
            .await
            .map_err(|e| startup_error("Failed to connect to PostgreSQL", e))?;

            info!(
                "PostgreSQL share store initialized (max: {} connections)",
                db.max_connections.unwrap_or(10)
            );
            Arc::new(store)
        }
    };

    let index = ShareIndex::new(Arc::clone(&store)).with_max_results(settings.sharing.max_results);

    let spotify = SpotifyClient::new(
        settings.spotify.api_base_url.clone(),
        Duration::from_secs(settings.spotify.timeout_secs),
    )
    .map_err(|e| startup_error("Failed to build Spotify client", e))?;

    // Cache is optional: without Redis the now-playing cache stays in-process
    let cache_ttl = settings.cache.ttl_secs;
    let l1_cache_size = settings.cache.l1_cache_size;

    let cache = match &settings.cache.redis_url {
        Some(redis_url) => match CacheManager::new(redis_url, l1_cache_size, cache_ttl).await {
            Ok(c) => {
                info!("Cache manager initialized (L1: {} entries, TTL: {}s, Redis L2)", l1_cache_size, cache_ttl);
                c
            }
            Err(e) => {
                warn!("Failed to connect to Redis ({}), caching in-process only", e);
                CacheManager::local(l1_cache_size, cache_ttl)
            }
        },
        None => CacheManager::local(l1_cache_size, cache_ttl),
    };

    let composer = ShareComposer::new(index.clone(), Arc::new(spotify)).with_cache(Arc::new(cache));

    let location_source = match (settings.location.latitude, settings.location.longitude) {
        (Some(latitude), Some(longitude)) => {
            let coordinate = Coordinate::new(latitude, longitude)
                .map_err(|e| startup_error("Invalid location settings", e))?;
            info!("Server location fixed at {}, {}", latitude, longitude);
            StaticLocationSource::new(coordinate, Duration::from_secs(settings.location.interval_secs))
        }
        _ => StaticLocationSource::unavailable(),
    };
    let tracker = LiveLocationTracker::new(Arc::new(location_source));

    let app_state = AppState {
        index,
        composer,
        tracker,
        sharing: settings.sharing.clone(),
    };

    // Configure HTTP server
    let host = settings.server.host.clone();
    let port = settings.server.port;
    let workers = settings.server.workers.unwrap_or(4);

    info!("Starting HTTP server on {}:{}", host, port);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(handle_json_payload_error))
            .app_data(web::QueryConfig::default().error_handler(handle_query_payload_error))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(routes::configure_routes)
    })
    .workers(workers)
    .bind((host, port))?
    .run()
    .await;

    // Ends any live queries still open and releases the store's connections
    store.close().await;
    info!("SoundSpot service stopped");

    server
}
