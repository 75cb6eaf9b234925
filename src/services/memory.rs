use crate::models::{NewShare, RangeQuery, ShareRecord};
use crate::services::store::{ChangeKind, ShareChange, ShareStore, StoreError, CHANGE_FEED_CAPACITY};
use async_trait::async_trait;
use std::sync::{Mutex, RwLock};
use tokio::sync::broadcast;

/// In-process share store
///
/// Used for development runs (`store.backend = "memory"`) and tests. Shares
/// live for the lifetime of the process; `shutdown` simulates a storage
/// teardown by closing the change feed and refusing further operations.
pub struct MemoryShareStore {
    shares: RwLock<Vec<ShareRecord>>,
    feed: Mutex<Option<broadcast::Sender<ShareChange>>>,
}

impl MemoryShareStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            shares: RwLock::new(Vec::new()),
            feed: Mutex::new(Some(tx)),
        }
    }

    /// Number of stored shares
    pub fn len(&self) -> usize {
        self.shares.read().map(|shares| shares.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch a share by id
    pub fn get(&self, id: &str) -> Option<ShareRecord> {
        self.shares
            .read()
            .ok()?
            .iter()
            .find(|share| share.id == id)
            .cloned()
    }

    /// Delete a share by id, notifying subscribers
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let removed = {
            let mut shares = self.write_shares()?;
            let position = shares.iter().position(|share| share.id == id);
            position.map(|index| shares.remove(index))
        };

        match removed {
            Some(share) => {
                self.notify(ChangeKind::Removed, share.location.geohash());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Drop every share and tell subscribers to re-query
    pub fn clear(&self) -> Result<usize, StoreError> {
        let cleared = {
            let mut shares = self.write_shares()?;
            let count = shares.len();
            shares.clear();
            count
        };

        self.send(ShareChange::resync());
        tracing::info!(cleared, "Memory share store cleared");
        Ok(cleared)
    }

    /// Close the change feed and refuse further operations
    pub fn shutdown(&self) {
        if let Ok(mut feed) = self.feed.lock() {
            if feed.take().is_some() {
                tracing::info!("Memory share store shut down");
            }
        }
    }

    fn is_open(&self) -> bool {
        self.feed.lock().map(|feed| feed.is_some()).unwrap_or(false)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store has been shut down".into()))
        }
    }

    fn write_shares(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<ShareRecord>>, StoreError> {
        self.shares
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
    }

    fn notify(&self, kind: ChangeKind, geohash: &str) {
        self.send(ShareChange {
            kind,
            geohash: geohash.to_string(),
        });
    }

    fn send(&self, change: ShareChange) {
        if let Ok(feed) = self.feed.lock() {
            if let Some(tx) = feed.as_ref() {
                // No receivers is fine: nobody is subscribed
                let _ = tx.send(change);
            }
        }
    }
}

impl Default for MemoryShareStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShareStore for MemoryShareStore {
    async fn insert(&self, share: NewShare) -> Result<ShareRecord, StoreError> {
        self.ensure_open()?;

        let record = ShareRecord::from_new(uuid::Uuid::new_v4().to_string(), share, chrono::Utc::now());
        self.write_shares()?.push(record.clone());

        tracing::debug!(id = %record.id, geohash = record.location.geohash(), "Stored share");
        self.notify(ChangeKind::Inserted, record.location.geohash());

        Ok(record)
    }

    async fn query_range(&self, query: &RangeQuery) -> Result<Vec<ShareRecord>, StoreError> {
        self.ensure_open()?;

        let shares = self
            .shares
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;

        let mut matches: Vec<ShareRecord> = shares
            .iter()
            .filter(|share| query.bounds.contains(share.location.geohash()))
            .cloned()
            .collect();
        drop(shares);

        matches.sort_by(|a, b| {
            a.location
                .geohash()
                .cmp(b.location.geohash())
                .then_with(|| b.timestamp.cmp(&a.timestamp))
        });
        matches.truncate(query.limit);

        Ok(matches)
    }

    fn changes(&self) -> Result<broadcast::Receiver<ShareChange>, StoreError> {
        self.feed
            .lock()
            .ok()
            .and_then(|feed| feed.as_ref().map(broadcast::Sender::subscribe))
            .ok_or_else(|| StoreError::Unavailable("memory store has been shut down".into()))
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(self.is_open())
    }

    async fn close(&self) {
        self.shutdown();
    }
}
