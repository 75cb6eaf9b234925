use crate::core::geocode::GeoError;
use crate::models::{Coordinate, Location};
use crate::services::listener::ListenerSlot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Bounded wait for a single position fix
pub const FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// Oldest cached reading a watch will accept
pub const WATCH_MAXIMUM_AGE: Duration = Duration::from_secs(30);

/// Errors reported by location sources and the tracker
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Location unavailable: no location source on this platform")]
    Unavailable,

    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Location permission denied")]
    Denied,

    #[error("Location reading is stale ({age_secs}s old)")]
    Stale { age_secs: i64 },

    #[error("Location source returned an invalid reading: {0}")]
    InvalidReading(#[from] GeoError),

    #[error("Location source failed: {0}")]
    SourceFailed(String),
}

/// A raw reading from a location source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coordinate: Coordinate,
    /// When the source took the fix
    pub timestamp: DateTime<Utc>,
    /// Accuracy radius in meters, if the source reports one
    pub accuracy_m: Option<f64>,
}

impl Position {
    pub fn now(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            timestamp: Utc::now(),
            accuracy_m: None,
        }
    }

    /// How long before `reference` this fix was taken (zero if after)
    pub fn age_at(&self, reference: DateTime<Utc>) -> chrono::Duration {
        (reference - self.timestamp).max(chrono::Duration::zero())
    }
}

/// Options passed to a location source for each request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the source may return; zero forces a fresh fix
    pub maximum_age: Duration,
}

impl PositionOptions {
    /// Fresh, high-accuracy, single read
    pub fn single_fix() -> Self {
        Self {
            high_accuracy: true,
            timeout: FIX_TIMEOUT,
            maximum_age: Duration::ZERO,
        }
    }

    /// Continuous reads that tolerate a short-lived cached fix
    pub fn watch() -> Self {
        Self {
            high_accuracy: true,
            timeout: FIX_TIMEOUT,
            maximum_age: WATCH_MAXIMUM_AGE,
        }
    }
}

/// A platform location provider
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Whether the platform has a location source at all
    fn is_available(&self) -> bool;

    /// Take one fix honoring `options`
    async fn current_position(&self, options: PositionOptions) -> Result<Position, LocationError>;

    /// Start a stream of readings at the source's own cadence
    ///
    /// A fix that takes longer than `options.timeout` is the source's to
    /// report as `LocationError::Timeout`; the gap between readings is not
    /// bounded. The stream ends when the receiver is dropped or the source
    /// stops.
    fn watch_positions(
        &self,
        options: PositionOptions,
    ) -> Result<mpsc::Receiver<Result<Position, LocationError>>, LocationError>;
}

/// Turns a possibly-unavailable location source into `Location` readings
#[derive(Clone)]
pub struct LiveLocationTracker {
    source: Arc<dyn LocationSource>,
}

impl LiveLocationTracker {
    pub fn new(source: Arc<dyn LocationSource>) -> Self {
        Self { source }
    }

    /// Take one fresh reading
    ///
    /// Never returns a cached fix: readings taken before the request are
    /// rejected as stale. Waits at most `FIX_TIMEOUT`.
    pub async fn get_once(&self) -> Result<Location, LocationError> {
        if !self.source.is_available() {
            return Err(LocationError::Unavailable);
        }

        let options = PositionOptions::single_fix();
        let requested_at = Utc::now();

        let position = tokio::time::timeout(options.timeout, self.source.current_position(options))
            .await
            .map_err(|_| LocationError::Timeout(options.timeout))??;

        if position.timestamp < requested_at {
            return Err(LocationError::Stale {
                age_secs: position.age_at(requested_at).num_seconds(),
            });
        }

        let location = Location::from_coordinate(position.coordinate)?;
        tracing::debug!(geohash = location.geohash(), "Got location fix");
        Ok(location)
    }

    /// Stream readings until the returned handle is stopped
    ///
    /// Readings arrive at the source's cadence, however slow. Each failed
    /// read goes to `on_error` and the stream carries on: source errors
    /// (including the source's own timeouts), readings older than
    /// `WATCH_MAXIMUM_AGE` and invalid coordinates. Callbacks run on a
    /// runtime worker thread, never concurrently with each other.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn watch<U, E>(&self, on_update: U, on_error: E) -> Result<WatchHandle, LocationError>
    where
        U: FnMut(Location) + Send + 'static,
        E: FnMut(LocationError) + Send + 'static,
    {
        if !self.source.is_available() {
            return Err(LocationError::Unavailable);
        }

        let options = PositionOptions::watch();
        let readings = self.source.watch_positions(options)?;

        let slot = Arc::new(ListenerSlot::new(WatchCallbacks {
            on_update: Box::new(on_update),
            on_error: Box::new(on_error),
        }));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_watch(readings, options, Arc::clone(&slot), cancel.clone()));

        tracing::debug!("Location watch started");

        Ok(WatchHandle { slot, cancel, task })
    }

    /// Stop a watch; same as `WatchHandle::stop`
    pub fn stop(&self, handle: &WatchHandle) {
        handle.stop();
    }
}

struct WatchCallbacks {
    on_update: Box<dyn FnMut(Location) + Send>,
    on_error: Box<dyn FnMut(LocationError) + Send>,
}

/// Handle to a running location watch
///
/// `stop` is idempotent; once it returns neither callback runs again.
/// Dropping the handle stops the watch.
pub struct WatchHandle {
    slot: Arc<ListenerSlot<WatchCallbacks>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchHandle {
    pub fn stop(&self) {
        if self.slot.detach() {
            tracing::debug!("Location watch stopped");
        }
        self.cancel.cancel();
    }

    /// Still streaming: not stopped and the source has not ended
    pub fn is_active(&self) -> bool {
        self.slot.is_attached() && !self.task.is_finished()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_watch(
    mut readings: mpsc::Receiver<Result<Position, LocationError>>,
    options: PositionOptions,
    slot: Arc<ListenerSlot<WatchCallbacks>>,
    cancel: CancellationToken,
) {
    let max_age = chrono::Duration::from_std(options.maximum_age).unwrap_or(chrono::Duration::MAX);

    loop {
        let reading = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            reading = readings.recv() => reading,
        };

        let outcome = match reading {
            None => {
                tracing::debug!("Location source ended its stream");
                break;
            }
            Some(Err(e)) => Err(e),
            Some(Ok(position)) => {
                let age = position.age_at(Utc::now());
                if age > max_age {
                    Err(LocationError::Stale { age_secs: age.num_seconds() })
                } else {
                    Location::from_coordinate(position.coordinate).map_err(LocationError::from)
                }
            }
        };

        let delivered = slot.deliver(|callbacks| match outcome {
            Ok(location) => (callbacks.on_update)(location),
            Err(e) => {
                tracing::debug!("Location read failed: {}", e);
                (callbacks.on_error)(e)
            }
        });

        if !delivered {
            break;
        }
    }
}

/// A location source pinned to a configured coordinate
///
/// Suits fixed installations (a venue kiosk, a home speaker) where the
/// "device" does not move. Without a coordinate the source reports itself
/// unavailable.
pub struct StaticLocationSource {
    coordinate: Option<Coordinate>,
    interval: Duration,
}

impl StaticLocationSource {
    pub fn new(coordinate: Coordinate, interval: Duration) -> Self {
        Self {
            coordinate: Some(coordinate),
            interval,
        }
    }

    /// A source for a platform with no location support
    pub fn unavailable() -> Self {
        Self {
            coordinate: None,
            interval: Duration::from_secs(30),
        }
    }
}

#[async_trait]
impl LocationSource for StaticLocationSource {
    fn is_available(&self) -> bool {
        self.coordinate.is_some()
    }

    async fn current_position(&self, _options: PositionOptions) -> Result<Position, LocationError> {
        self.coordinate
            .map(Position::now)
            .ok_or(LocationError::Unavailable)
    }

    fn watch_positions(
        &self,
        _options: PositionOptions,
    ) -> Result<mpsc::Receiver<Result<Position, LocationError>>, LocationError> {
        let coordinate = self.coordinate.ok_or(LocationError::Unavailable)?;
        let (tx, rx) = mpsc::channel(1);
        let mut ticker = tokio::time::interval(self.interval);

        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                if tx.send(Ok(Position::now(coordinate))).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }
}
