// Integration tests for SoundSpot

use async_trait::async_trait;
use chrono::Utc;
use soundspot::models::{Coordinate, Location, NewShare, ShareRecord, Track};
use soundspot::services::{
    LiveLocationTracker, LocationError, LocationSource, MemoryShareStore, Position,
    PositionOptions, ShareIndex, StaticLocationSource,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const SEOUL: Coordinate = Coordinate { latitude: 37.5665, longitude: 126.9780 };

fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        name: format!("Song {}", id),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        album_art: "https://img".to_string(),
        preview_url: None,
        external_url: format!("https://open.spotify.com/track/{}", id),
    }
}

fn share_at(user: &str, track_id: &str, lat: f64, lon: f64) -> NewShare {
    NewShare {
        user_id: user.to_string(),
        username: format!("User {}", user),
        track: track(track_id),
        location: Location::new(lat, lon).unwrap(),
        timestamp: Utc::now().timestamp_millis(),
    }
}

async fn next_snapshot(rx: &mut mpsc::UnboundedReceiver<Vec<ShareRecord>>) -> Vec<ShareRecord> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for snapshot")
        .expect("subscription ended")
}

/// A location source that replays a script
struct ScriptedSource {
    single: Script,
    watch: Mutex<Option<Vec<Result<Position, LocationError>>>>,
}

enum Script {
    Fix(Position),
    Fail(LocationError),
    Hang,
}

impl ScriptedSource {
    fn single(script: Script) -> Self {
        Self {
            single: script,
            watch: Mutex::new(None),
        }
    }

    fn watching(readings: Vec<Result<Position, LocationError>>) -> Self {
        Self {
            single: Script::Hang,
            watch: Mutex::new(Some(readings)),
        }
    }
}

#[async_trait]
impl LocationSource for ScriptedSource {
    fn is_available(&self) -> bool {
        true
    }

    async fn current_position(&self, _options: PositionOptions) -> Result<Position, LocationError> {
        match &self.single {
            Script::Fix(position) => Ok(*position),
            Script::Fail(e) => Err(e.clone()),
            Script::Hang => std::future::pending().await,
        }
    }

    fn watch_positions(
        &self,
        _options: PositionOptions,
    ) -> Result<mpsc::Receiver<Result<Position, LocationError>>, LocationError> {
        let readings = self
            .watch
            .lock()
            .unwrap()
            .take()
            .ok_or(LocationError::SourceFailed("already watching".to_string()))?;

        let (tx, rx) = mpsc::channel(readings.len().max(1));
        tokio::spawn(async move {
            for reading in readings {
                if tx.send(reading).await.is_err() {
                    return;
                }
            }
            // Keep the stream open so only the caller ends it
            tx.closed().await;
        });
        Ok(rx)
    }
}

#[tokio::test]
async fn test_live_query_in_seoul_includes_nearby_and_excludes_far() {
    let store = Arc::new(MemoryShareStore::new());
    let index = ShareIndex::new(store.clone());

    let here = index.add_share(share_at("here", "t1", 37.5665, 126.9780)).await.unwrap();
    // ~1.5 km north
    let close = index.add_share(share_at("close", "t2", 37.5800, 126.9780)).await.unwrap();
    // ~50 km south-east
    index.add_share(share_at("far", "t3", 37.2636, 127.4286)).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = index
        .subscribe(SEOUL, 5.0, move |shares| {
            let _ = tx.send(shares);
        })
        .unwrap();

    let mut ids: Vec<_> = next_snapshot(&mut rx).await.into_iter().map(|s| s.id).collect();
    ids.sort();
    let mut expected = vec![here.clone(), close.clone()];
    expected.sort();
    assert_eq!(ids, expected);

    // A new share in range refreshes the snapshot
    let fresh = index.add_share(share_at("fresh", "t4", 37.5600, 126.9900)).await.unwrap();
    let snapshot = next_snapshot(&mut rx).await;
    assert_eq!(snapshot.len(), 3);
    assert!(snapshot.iter().any(|share| share.id == fresh));

    subscription.unsubscribe();
}

#[tokio::test]
async fn test_add_share_creates_one_retrievable_record() {
    let store = Arc::new(MemoryShareStore::new());
    let index = ShareIndex::new(store.clone());

    let id = index.add_share(share_at("u1", "t1", 37.5665, 126.9780)).await.unwrap();

    assert_eq!(store.len(), 1);
    let record = store.get(&id).unwrap();
    assert_eq!(record.track.id, "t1");
    assert_eq!(record.user_id, "u1");
    assert_eq!(record.location.geohash(), Location::new(37.5665, 126.9780).unwrap().geohash());

    let nearby = index.nearby(SEOUL, 1.0).await.unwrap();
    assert_eq!(nearby.len(), 1);
    assert_eq!(nearby[0].id, id);
}

#[tokio::test]
async fn test_identical_shares_are_not_merged() {
    let index = ShareIndex::new(Arc::new(MemoryShareStore::new()));

    let first = index.add_share(share_at("u1", "t1", 37.5665, 126.9780)).await.unwrap();
    let second = index.add_share(share_at("u1", "t1", 37.5665, 126.9780)).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(index.nearby(SEOUL, 1.0).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unsubscribed_listener_receives_nothing() {
    let store = Arc::new(MemoryShareStore::new());
    let index = ShareIndex::new(store.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = index
        .subscribe(SEOUL, 5.0, move |shares| {
            let _ = tx.send(shares);
        })
        .unwrap();

    assert!(next_snapshot(&mut rx).await.is_empty());

    subscription.unsubscribe();
    subscription.unsubscribe();
    assert!(subscription.finished().await.is_ok());
    assert!(!subscription.is_active());

    index.add_share(share_at("late", "t1", 37.5665, 126.9780)).await.unwrap();

    // The callback (and its sender) is gone, so the channel reports closed
    let after = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(matches!(after, Ok(None)));
}

#[tokio::test]
async fn test_store_teardown_ends_subscription_quietly() {
    let store = Arc::new(MemoryShareStore::new());
    let index = ShareIndex::new(store.clone());

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut subscription = index
        .subscribe(SEOUL, 5.0, move |shares| {
            let _ = tx.send(shares);
        })
        .unwrap();
    next_snapshot(&mut rx).await;

    store.shutdown();

    let finished = tokio::time::timeout(Duration::from_secs(2), subscription.finished()).await;
    assert!(matches!(finished, Ok(Ok(()))));

    // Unsubscribing after teardown is still fine
    subscription.unsubscribe();
}

#[tokio::test]
async fn test_get_once_without_location_source() {
    let tracker = LiveLocationTracker::new(Arc::new(StaticLocationSource::unavailable()));
    assert_eq!(tracker.get_once().await, Err(LocationError::Unavailable));
}

#[tokio::test]
async fn test_get_once_permission_denied() {
    let tracker = LiveLocationTracker::new(Arc::new(ScriptedSource::single(Script::Fail(
        LocationError::Denied,
    ))));
    assert_eq!(tracker.get_once().await, Err(LocationError::Denied));
}

#[tokio::test(start_paused = true)]
async fn test_get_once_times_out() {
    let tracker = LiveLocationTracker::new(Arc::new(ScriptedSource::single(Script::Hang)));
    assert!(matches!(tracker.get_once().await, Err(LocationError::Timeout(_))));
}

#[tokio::test]
async fn test_get_once_rejects_cached_fix() {
    let cached = Position {
        coordinate: SEOUL,
        timestamp: Utc::now() - chrono::Duration::minutes(5),
        accuracy_m: Some(20.0),
    };
    let tracker = LiveLocationTracker::new(Arc::new(ScriptedSource::single(Script::Fix(cached))));

    assert!(matches!(tracker.get_once().await, Err(LocationError::Stale { .. })));
}

#[tokio::test]
async fn test_watch_errors_do_not_stop_the_stream() {
    let stale = Position {
        coordinate: SEOUL,
        timestamp: Utc::now() - chrono::Duration::minutes(5),
        accuracy_m: None,
    };
    let busan = Coordinate { latitude: 35.1796, longitude: 129.0756 };

    let tracker = LiveLocationTracker::new(Arc::new(ScriptedSource::watching(vec![
        Ok(Position::now(SEOUL)),
        Err(LocationError::SourceFailed("gps glitch".to_string())),
        Ok(stale),
        Ok(Position::now(busan)),
    ])));

    let (update_tx, mut updates) = mpsc::unbounded_channel();
    let (error_tx, mut errors) = mpsc::unbounded_channel();
    let handle = tracker
        .watch(
            move |location: Location| {
                let _ = update_tx.send(location.coordinate());
            },
            move |e| {
                let _ = error_tx.send(e);
            },
        )
        .unwrap();

    let wait = Duration::from_secs(2);
    assert_eq!(tokio::time::timeout(wait, updates.recv()).await.unwrap(), Some(SEOUL));
    assert_eq!(
        tokio::time::timeout(wait, errors.recv()).await.unwrap(),
        Some(LocationError::SourceFailed("gps glitch".to_string()))
    );
    assert!(matches!(
        tokio::time::timeout(wait, errors.recv()).await.unwrap(),
        Some(LocationError::Stale { .. })
    ));
    assert_eq!(tokio::time::timeout(wait, updates.recv()).await.unwrap(), Some(busan));

    assert!(handle.is_active());
    handle.stop();
    assert!(!handle.is_active());
}
