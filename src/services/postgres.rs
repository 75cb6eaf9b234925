use crate::models::{Location, NewShare, RangeQuery, ShareRecord, Track};
use crate::services::store::{ChangeKind, ShareChange, ShareStore, StoreError, CHANGE_FEED_CAPACITY};
use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Channel the `music_shares` trigger notifies on
pub const CHANGE_CHANNEL: &str = "music_shares_changed";

/// Delay before re-listening after the notification connection fails
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// PostgreSQL-backed share store
///
/// Shares live in the `music_shares` table, indexed on
/// `(geohash, client_timestamp DESC)` so range queries read the index in
/// order. An insert/delete trigger calls `pg_notify`, and a background task
/// forwards those notifications into the change feed until `close` is called.
pub struct PostgresShareStore {
    pool: PgPool,
    feed: Mutex<Option<broadcast::Sender<ShareChange>>>,
    shutdown: CancellationToken,
}

impl PostgresShareStore {
    /// Create a new store from a connection string, running migrations
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Self::from_pool(pool).await
    }

    /// Create a new store from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL share store");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
        )
        .await
    }

    /// Wrap an existing, migrated pool and start the notification listener
    pub async fn from_pool(pool: PgPool) -> Result<Self, StoreError> {
        let mut listener = PgListener::connect_with(&pool).await?;
        listener.listen(CHANGE_CHANNEL).await?;

        let (feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        let shutdown = CancellationToken::new();

        tokio::spawn(forward_notifications(listener, feed.clone(), shutdown.clone()));

        Ok(Self {
            pool,
            feed: Mutex::new(Some(feed)),
            shutdown,
        })
    }

    /// Fetch a share by id
    pub async fn get(&self, id: &str) -> Result<Option<ShareRecord>, StoreError> {
        let id = match uuid::Uuid::parse_str(id) {
            Ok(id) => id,
            Err(_) => return Ok(None),
        };

        let query = r#"
            SELECT id, user_id, username, track_id, track_name, track_artist, track_album,
                   track_album_art, track_preview_url, track_external_url,
                   latitude, longitude, client_timestamp, created_at
            FROM music_shares
            WHERE id = $1
        "#;

        let row = sqlx::query(query).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(share_from_row).transpose()
    }
}

#[async_trait]
impl ShareStore for PostgresShareStore {
    async fn insert(&self, share: NewShare) -> Result<ShareRecord, StoreError> {
        let id = uuid::Uuid::new_v4();

        let query = r#"
            INSERT INTO music_shares (
                id, user_id, username, track_id, track_name, track_artist, track_album,
                track_album_art, track_preview_url, track_external_url,
                latitude, longitude, geohash, client_timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING created_at
        "#;

        let row = sqlx::query(query)
            .bind(id)
            .bind(&share.user_id)
            .bind(&share.username)
            .bind(&share.track.id)
            .bind(&share.track.name)
            .bind(&share.track.artist)
            .bind(&share.track.album)
            .bind(&share.track.album_art)
            .bind(&share.track.preview_url)
            .bind(&share.track.external_url)
            .bind(share.location.latitude())
            .bind(share.location.longitude())
            .bind(share.location.geohash())
            .bind(share.timestamp)
            .fetch_one(&self.pool)
            .await?;

        let created_at: chrono::DateTime<chrono::Utc> = row.try_get("created_at")?;

        tracing::debug!(id = %id, geohash = share.location.geohash(), "Stored share");

        Ok(ShareRecord::from_new(id.to_string(), share, created_at))
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ShareRecord>, StoreError> {
        let sql = r#"
            SELECT id, user_id, username, track_id, track_name, track_artist, track_album,
                   track_album_art, track_preview_url, track_external_url,
                   latitude, longitude, client_timestamp, created_at
            FROM music_shares
            WHERE geohash >= $1 AND geohash <= $2
            ORDER BY geohash ASC, client_timestamp DESC
            LIMIT $3
        "#;

        let rows = sqlx::query(sql)
            .bind(&query.bounds.lower)
            .bind(&query.bounds.upper)
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(share_from_row).collect()
    }

    fn changes(&self) -> Result<broadcast::Receiver<ShareChange>, StoreError> {
        self.feed
            .lock()
            .ok()
            .and_then(|feed| feed.as_ref().map(broadcast::Sender::subscribe))
            .ok_or_else(|| StoreError::Unavailable("postgres store has been closed".into()))
    }

    /// Health check for the database connection
    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }

    /// Stop forwarding notifications and close the pool
    ///
    /// Open subscriptions see their change feed close and end quietly.
    async fn close(&self) {
        self.shutdown.cancel();
        if let Ok(mut feed) = self.feed.lock() {
            feed.take();
        }
        self.pool.close().await;
        tracing::info!("PostgreSQL share store closed");
    }
}

/// Map a `music_shares` row back into a record, re-deriving its location key
fn share_from_row(row: &PgRow) -> Result<ShareRecord, StoreError> {
    let id: uuid::Uuid = row.try_get("id")?;
    let latitude: f64 = row.try_get("latitude")?;
    let longitude: f64 = row.try_get("longitude")?;

    let location = Location::new(latitude, longitude).map_err(|e| StoreError::CorruptRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })?;

    Ok(ShareRecord {
        id: id.to_string(),
        user_id: row.try_get("user_id")?,
        username: row.try_get("username")?,
        track: Track {
            id: row.try_get("track_id")?,
            name: row.try_get("track_name")?,
            artist: row.try_get("track_artist")?,
            album: row.try_get("track_album")?,
            album_art: row.try_get("track_album_art")?,
            preview_url: row.try_get("track_preview_url")?,
            external_url: row.try_get("track_external_url")?,
        },
        location,
        timestamp: row.try_get("client_timestamp")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Parse a trigger payload of the form `INSERT:<geohash>` or `DELETE:<geohash>`
fn parse_notification(payload: &str) -> Option<ShareChange> {
    let (op, geohash) = payload.split_once(':')?;
    let kind = match op {
        "INSERT" => ChangeKind::Inserted,
        "DELETE" => ChangeKind::Removed,
        _ => return None,
    };
    Some(ShareChange {
        kind,
        geohash: geohash.to_string(),
    })
}

/// Tell every subscriber that notifications were lost
fn request_resync(feed: &broadcast::Sender<ShareChange>) {
    let receivers = feed.send(ShareChange::resync()).unwrap_or(0);
    tracing::info!(receivers, "Share change listener recovered, requesting resync");
}

async fn forward_notifications(
    mut listener: PgListener,
    feed: broadcast::Sender<ShareChange>,
    shutdown: CancellationToken,
) {
    tracing::info!(channel = CHANGE_CHANNEL, "Share change listener started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                tracing::info!("Share change listener shutting down");
                break;
            }

            notification = listener.recv() => match notification {
                Ok(notification) => match parse_notification(notification.payload()) {
                    Some(change) => {
                        let _ = feed.send(change);
                    }
                    None => {
                        tracing::warn!(payload = notification.payload(), "Ignoring malformed share notification");
                    }
                },
                Err(e) => {
                    // PgListener reconnects on the next recv; anything sent
                    // while it was down is gone
                    tracing::warn!("Share change listener error: {}", e);
                    tokio::time::sleep(LISTENER_RETRY_DELAY).await;
                    request_resync(&feed);
                }
            }
        }
    }

    // Dropping the last sender closes every subscriber's feed
    drop(feed);
}
