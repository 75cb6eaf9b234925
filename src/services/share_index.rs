use crate::core::{distance::within_radius, geocode::GeoError, range::key_range};
use crate::models::{Coordinate, NewShare, RangeQuery, ShareRecord};
use crate::services::listener::ListenerSlot;
use crate::services::store::{ChangeKind, ShareChange, ShareStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Upper bound on shares fetched per snapshot
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// Errors surfaced by the share index
#[derive(Debug, Error)]
pub enum ShareIndexError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] GeoError),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("Subscription task failed: {0}")]
    TaskFailed(String),
}

type SnapshotCallback = Box<dyn FnMut(Vec<ShareRecord>) + Send + 'static>;

/// Proximity index over persisted shares
///
/// Range queries run over proximity keys and every result set is refined by
/// exact great-circle distance before it reaches the caller.
#[derive(Clone)]
pub struct ShareIndex {
    store: Arc<dyn ShareStore>,
    max_results: usize,
}

impl ShareIndex {
    pub fn new(store: Arc<dyn ShareStore>) -> Self {
        Self {
            store,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Persist a new share, returning the id the store assigned
    ///
    /// Every call creates a new record; identical shares are not merged.
    pub async fn add_share(&self, share: NewShare) -> Result<String, ShareIndexError> {
        let record = self.store.insert(share).await?;

        tracing::info!(
            id = %record.id,
            user_id = %record.user_id,
            track = %record.track.name,
            geohash = record.location.geohash(),
            "Share added"
        );

        Ok(record.id)
    }

    /// One-shot nearby lookup with the same semantics as a live snapshot
    pub async fn nearby(
        &self,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<ShareRecord>, ShareIndexError> {
        let query = self.range_query(&center, radius_km)?;
        let snapshot = self.store.query_range(&query).await?;
        let candidates = snapshot.len();
        let shares = within_radius(snapshot, &center, radius_km);

        tracing::debug!(candidates, matched = shares.len(), radius_km, "Nearby lookup");

        Ok(shares)
    }

    /// Open a live nearby query
    ///
    /// `on_update` receives the refined result set once for the initial load
    /// and again after every store change inside the query's key range. It
    /// runs on a runtime worker thread, never concurrently with itself. The
    /// returned handle must be kept alive; dropping it unsubscribes.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<F>(
        &self,
        center: Coordinate,
        radius_km: f64,
        on_update: F,
    ) -> Result<Subscription, ShareIndexError>
    where
        F: FnMut(Vec<ShareRecord>) + Send + 'static,
    {
        let query = self.range_query(&center, radius_km)?;
        // Opened before the first query so no change slips between the two
        let changes = self.store.changes()?;

        let id = uuid::Uuid::new_v4();
        let slot: Arc<ListenerSlot<SnapshotCallback>> =
            Arc::new(ListenerSlot::new(Box::new(on_update)));
        let cancel = CancellationToken::new();

        tracing::debug!(
            subscription = %id,
            lower = %query.bounds.lower,
            upper = %query.bounds.upper,
            radius_km,
            "Opening live nearby query"
        );

        let task = tokio::spawn(run_live_query(LiveQuery {
            id,
            store: Arc::clone(&self.store),
            query,
            center,
            radius_km,
            slot: Arc::clone(&slot),
            changes,
            cancel: cancel.clone(),
        }));

        Ok(Subscription {
            id,
            slot,
            cancel,
            task: Some(task),
        })
    }

    /// Health check for the underlying store
    pub async fn health_check(&self) -> Result<bool, ShareIndexError> {
        Ok(self.store.health_check().await?)
    }

    fn range_query(&self, center: &Coordinate, radius_km: f64) -> Result<RangeQuery, GeoError> {
        Ok(RangeQuery {
            bounds: key_range(center, radius_km)?,
            limit: self.max_results,
        })
    }
}

/// Handle to a live nearby query
///
/// `unsubscribe` is idempotent and never fails, even after the store has
/// been torn down. Once it returns, the callback is never invoked again.
pub struct Subscription {
    id: uuid::Uuid,
    slot: Arc<ListenerSlot<SnapshotCallback>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<(), ShareIndexError>>>,
}

impl Subscription {
    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// Still delivering: not unsubscribed and the live query has not ended
    pub fn is_active(&self) -> bool {
        self.slot.is_attached()
            && !self.cancel.is_cancelled()
            && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop notifications and release the live query
    pub fn unsubscribe(&self) {
        let detached = self.slot.detach();
        self.cancel.cancel();

        if detached {
            tracing::debug!(subscription = %self.id, "Unsubscribed live nearby query");
        }
    }

    /// Wait for the live query to end, returning its terminal error if any
    ///
    /// Resolves when the subscription is cancelled, the store closes its
    /// change feed, or a query fails.
    pub async fn finished(&mut self) -> Result<(), ShareIndexError> {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Ok(()),
                Err(e) => Err(ShareIndexError::TaskFailed(e.to_string())),
            },
            None => Ok(()),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct LiveQuery {
    id: uuid::Uuid,
    store: Arc<dyn ShareStore>,
    query: RangeQuery,
    center: Coordinate,
    radius_km: f64,
    slot: Arc<ListenerSlot<SnapshotCallback>>,
    changes: broadcast::Receiver<ShareChange>,
    cancel: CancellationToken,
}

async fn run_live_query(mut live: LiveQuery) -> Result<(), ShareIndexError> {
    let result = refresh_until_done(&mut live).await;
    // However the query ends, the callback is released
    live.slot.detach();
    result
}

async fn refresh_until_done(live: &mut LiveQuery) -> Result<(), ShareIndexError> {
    loop {
        let snapshot = tokio::select! {
            biased;

            _ = live.cancel.cancelled() => return Ok(()),
            snapshot = live.store.query_range(&live.query) => snapshot,
        };

        let snapshot = match snapshot {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(subscription = %live.id, "Live nearby query failed: {}", e);
                return Err(e.into());
            }
        };

        let shares = within_radius(snapshot, &live.center, live.radius_km);
        let count = shares.len();

        if !live.slot.deliver(move |on_update| on_update(shares)) {
            return Ok(());
        }
        tracing::trace!(subscription = %live.id, count, "Delivered nearby snapshot");

        if !wait_for_relevant_change(live).await {
            return Ok(());
        }
    }
}

/// Block until a change lands inside the query's key range, or the feed
/// asks for a resync
///
/// Returns `false` when the subscription should end.
async fn wait_for_relevant_change(live: &mut LiveQuery) -> bool {
    loop {
        tokio::select! {
            biased;

            _ = live.cancel.cancelled() => return false,

            change = live.changes.recv() => match change {
                Ok(change) if change.affects(&live.query.bounds) => {
                    if change.kind == ChangeKind::Resync {
                        tracing::debug!(subscription = %live.id, "Change feed resync, refreshing");
                    }
                    return true;
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(subscription = %live.id, skipped, "Change feed lagged, refreshing");
                    return true;
                }
                Err(RecvError::Closed) => {
                    tracing::debug!(subscription = %live.id, "Change feed closed, ending live query");
                    return false;
                }
            }
        }
    }
}
