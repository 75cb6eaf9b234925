use crate::models::{NewShare, RangeBounds, RangeQuery, ShareRecord};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

/// Capacity of a store's change feed before slow subscribers start lagging
pub const CHANGE_FEED_CAPACITY: usize = 256;

/// Errors that can occur when talking to a share store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: String, reason: String },
}

/// Kind of change a store reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Removed,
    /// Changes may have been missed; every subscriber must re-query
    Resync,
}

/// A change notification carrying the proximity key that changed
///
/// A `Resync` carries no key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareChange {
    pub kind: ChangeKind,
    pub geohash: String,
}

impl ShareChange {
    pub fn resync() -> Self {
        Self {
            kind: ChangeKind::Resync,
            geohash: String::new(),
        }
    }

    /// Whether a live query over `bounds` has to re-run for this change
    pub fn affects(&self, bounds: &RangeBounds) -> bool {
        self.kind == ChangeKind::Resync || bounds.contains(&self.geohash)
    }
}

/// Persistent storage with range queries and a change feed
///
/// Together `query_range` and `changes` form the live-query primitive: a
/// subscriber opens the feed, runs the query, and re-runs it whenever a
/// relevant change arrives. The feed closes when the store is torn down.
#[async_trait]
pub trait ShareStore: Send + Sync {
    /// Append a share, assigning its id and creation time
    async fn insert(&self, share: NewShare) -> Result<ShareRecord, StoreError>;

    /// Shares with `lower <= geohash <= upper`, ordered by geohash then by
    /// client timestamp descending, at most `query.limit` of them
    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ShareRecord>, StoreError>;

    /// Open a receiver on the change feed
    fn changes(&self) -> Result<broadcast::Receiver<ShareChange>, StoreError>;

    /// Health check for the underlying storage
    async fn health_check(&self) -> Result<bool, StoreError>;

    /// Tear the store down, closing the change feed
    async fn close(&self);
}
