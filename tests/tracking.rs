use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;

use plow_tracker::models::{ContractorId, PositionSample};
use plow_tracker::publisher::PositionPublisher;
use plow_tracker::session::{ConnectionHealth, TrackingSession};
use plow_tracker::source::{CadencePolicy, ReplayLocationSource};
use plow_tracker::store::{MemoryPositionStore, PositionStore, StoreEvent};

const FRESHNESS: Duration = Duration::from_secs(60);

fn contractor(id: &str) -> ContractorId {
    ContractorId::try_from(id).unwrap()
}

fn sample(latitude: f64) -> PositionSample {
    PositionSample {
        latitude,
        longitude: 56.78,
        speed: Some(10.0),
        accuracy: 5.0,
        heading: Some(90.0),
    }
}

fn permissive() -> CadencePolicy {
    CadencePolicy::new(Duration::ZERO, 0.0)
}

#[tokio::test]
async fn publisher_to_session_round_trip() {
    let store = Arc::new(MemoryPositionStore::new());
    let plow = contractor("plow-7");

    // Customer opens tracking before the contractor has ever published
    let mut session = TrackingSession::new(Arc::clone(&store), FRESHNESS);
    session.track(plow.clone()).await.unwrap();

    let first = timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap();
    assert_eq!(first, Some(StoreEvent::Snapshot(None)));
    assert_eq!(session.health(Utc::now()), ConnectionHealth::Waiting);
    assert!(!session.is_connected());
    assert_eq!(session.error(), Some("Contractor location not available"));

    // Contractor starts tracking
    let source = Arc::new(ReplayLocationSource::new(vec![sample(12.34)]));
    let mut publisher =
        PositionPublisher::new(source, Arc::clone(&store), plow.clone(), permissive());
    publisher.start_tracking().await.unwrap();

    let record = match timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap()
    {
        Some(StoreEvent::Update(Some(record))) => record,
        other => panic!("expected a live record, got {other:?}"),
    };
    assert_eq!(record.latitude, 12.34);
    assert!(record.is_active);
    assert_eq!(session.health(Utc::now()), ConnectionHealth::Live);
    assert!(session.is_connected());
    assert_eq!(session.update_count(), 1);
    assert_eq!(session.error(), None);

    // Contractor stops: the session sees the inactive record and reads
    // offline, with the last position still visible
    publisher.stop_tracking().await.unwrap();
    let record = match timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap()
    {
        Some(StoreEvent::Update(Some(record))) => record,
        other => panic!("expected the inactive record, got {other:?}"),
    };
    assert!(!record.is_active);
    assert_eq!(session.health(Utc::now()), ConnectionHealth::Offline);
    assert_eq!(session.record().unwrap().latitude, 12.34);
}

#[tokio::test]
async fn initial_snapshot_is_not_a_live_push() {
    let store = Arc::new(MemoryPositionStore::new());
    let plow = contractor("plow-7");

    store.publish(&plow, &sample(12.34)).await.unwrap();

    let mut session = TrackingSession::new(Arc::clone(&store), FRESHNESS);
    session.track(plow).await.unwrap();

    let first = timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap();
    assert!(matches!(first, Some(StoreEvent::Snapshot(Some(_)))));
    assert!(session.is_connected());
    assert_eq!(session.update_count(), 0);
}

#[tokio::test]
async fn switching_contractors_cancels_prior_watch() {
    let store = Arc::new(MemoryPositionStore::new());
    let first = contractor("plow-1");
    let second = contractor("plow-2");

    let mut session = TrackingSession::new(Arc::clone(&store), FRESHNESS);

    session.track(first.clone()).await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), session.recv()).await.unwrap(),
        Some(StoreEvent::Snapshot(None))
    );

    session.track(second.clone()).await.unwrap();
    assert_eq!(
        timeout(Duration::from_secs(1), session.recv()).await.unwrap(),
        Some(StoreEvent::Snapshot(None))
    );

    // The old watch is gone
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.watch_count(&first).await, 0);
    assert_eq!(store.watch_count(&second).await, 1);

    // A write to the old contractor cannot reach the session
    store.publish(&first, &sample(99.0)).await.unwrap();
    store.publish(&second, &sample(12.34)).await.unwrap();

    let record = match timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap()
    {
        Some(StoreEvent::Update(Some(record))) => record,
        other => panic!("expected the new contractor's record, got {other:?}"),
    };
    assert_eq!(record.latitude, 12.34);
    assert_eq!(session.update_count(), 1);
}

#[tokio::test]
async fn untrack_resets_the_view() {
    let store = Arc::new(MemoryPositionStore::new());
    let plow = contractor("plow-7");

    store.publish(&plow, &sample(12.34)).await.unwrap();

    let mut session = TrackingSession::new(Arc::clone(&store), FRESHNESS);
    session.track(plow.clone()).await.unwrap();
    timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap();
    assert!(session.record().is_some());

    session.untrack();

    assert_eq!(session.record(), None);
    assert_eq!(session.update_count(), 0);
    assert!(!session.is_connected());
    assert_eq!(session.error(), None);
    assert_eq!(session.target(), None);
    assert_eq!(session.health(Utc::now()), ConnectionHealth::Waiting);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.watch_count(&plow).await, 0);
}

#[tokio::test]
async fn retry_without_target_is_rejected() {
    let store = Arc::new(MemoryPositionStore::new());
    let mut session: TrackingSession<MemoryPositionStore> =
        TrackingSession::new(store, FRESHNESS);

    assert!(session.retry().await.is_err());
}

#[tokio::test]
async fn retry_reopens_subscription_for_current_target() {
    let store = Arc::new(MemoryPositionStore::new());
    let plow = contractor("plow-7");

    store.publish(&plow, &sample(12.34)).await.unwrap();

    let mut session = TrackingSession::new(Arc::clone(&store), FRESHNESS);
    session.track(plow.clone()).await.unwrap();
    timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap();

    session.retry().await.unwrap();
    assert_eq!(session.target(), Some(&plow));

    let replayed = timeout(Duration::from_secs(1), session.recv())
        .await
        .unwrap();
    assert!(matches!(replayed, Some(StoreEvent::Snapshot(Some(_)))));
}
