//! Contractor-side tracking publisher.
//!
//! While a job is in progress the publisher samples device position and
//! overwrites the contractor's Position Record on every admitted sample.
//! Starting is idempotent, stopping performs exactly one final inactive
//! write, and dropping the publisher releases the acquisition loop whether
//! or not stop was ever called.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::ContractorId;
use crate::source::{CadencePolicy, LocationSource};
use crate::store::PositionStore;

pub struct PositionPublisher<L, S> {
    source: Arc<L>,
    store: Arc<S>,
    contractor: ContractorId,
    cadence: CadencePolicy,
    active: Option<ActiveTracking>,
}

/// Resources owned by a running acquisition loop. Dropping them cancels
/// the feed registration and the loop task.
struct ActiveTracking {
    feed: CancelHandle,
    task: JoinHandle<()>,
}

impl Drop for ActiveTracking {
    fn drop(&mut self) {
        self.feed.cancel();
        self.task.abort();
    }
}

impl<L, S> PositionPublisher<L, S>
where
    L: LocationSource + 'static,
    S: PositionStore + 'static,
{
    pub fn new(
        source: Arc<L>,
        store: Arc<S>,
        contractor: ContractorId,
        cadence: CadencePolicy,
    ) -> Self {
        Self {
            source,
            store,
            contractor,
            cadence,
            active: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.active.is_some()
    }

    /// Begin publishing device positions.
    ///
    /// No-op while already tracking. Fails with
    /// [`TrackingError::PermissionDenied`] when the device refuses, in
    /// which case tracking does not start and nothing is written.
    pub async fn start_tracking(&mut self) -> Result<(), TrackingError> {
        if self.active.is_some() {
            return Ok(());
        }

        self.source.request_permission().await?;
        let feed = self.source.watch_position(self.cadence).await?;
        let (mut rx, feed_handle) = feed.into_parts();

        let store = Arc::clone(&self.store);
        let contractor = self.contractor.clone();
        let task = tokio::spawn(async move {
            while let Some(next) = rx.recv().await {
                match next {
                    Ok(sample) => {
                        // A failed write must not stop tracking; the next
                        // acquisition retries implicitly.
                        if let Err(e) = store.publish(&contractor, &sample).await {
                            warn!("Position publish failed: {}", e);
                        }
                    }
                    Err(e) => {
                        warn!("Location acquisition failed: {}", e);
                    }
                }
            }
        });

        info!("Started tracking for contractor {}", self.contractor);
        self.active = Some(ActiveTracking {
            feed: feed_handle,
            task,
        });
        Ok(())
    }

    /// Stop publishing and mark the record inactive.
    ///
    /// The final write merges `is_active = false` with a fresh timestamp
    /// into the existing record; its failure is logged but never surfaced,
    /// and a second stop performs no write at all.
    pub async fn stop_tracking(&mut self) -> Result<(), TrackingError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        drop(active);

        if let Err(e) = self.store.mark_inactive(&self.contractor).await {
            warn!("Final inactive write failed: {}", e);
        }
        info!("Stopped tracking for contractor {}", self.contractor);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::models::{PositionSample, PositionRecord};
    use crate::source::ReplayLocationSource;
    use crate::store::{MemoryPositionStore, PositionWatch};

    fn permissive() -> CadencePolicy {
        CadencePolicy::new(Duration::ZERO, 0.0)
    }

    fn sample() -> PositionSample {
        PositionSample {
            latitude: 12.34,
            longitude: 56.78,
            speed: Some(10.0),
            accuracy: 5.0,
            heading: Some(90.0),
        }
    }

    /// Store wrapper counting writes, for stop-idempotence assertions.
    struct CountingStore {
        inner: MemoryPositionStore,
        publishes: AtomicUsize,
        inactive_writes: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: MemoryPositionStore::new(),
                publishes: AtomicUsize::new(0),
                inactive_writes: AtomicUsize::new(0),
            }
        }
    }

    impl PositionStore for CountingStore {
        async fn publish(
            &self,
            contractor: &ContractorId,
            sample: &PositionSample,
        ) -> Result<(), TrackingError> {
            self.publishes.fetch_add(1, Ordering::SeqCst);
            self.inner.publish(contractor, sample).await
        }

        async fn mark_inactive(&self, contractor: &ContractorId) -> Result<(), TrackingError> {
            self.inactive_writes.fetch_add(1, Ordering::SeqCst);
            self.inner.mark_inactive(contractor).await
        }

        async fn watch(&self, contractor: &ContractorId) -> Result<PositionWatch, TrackingError> {
            self.inner.watch(contractor).await
        }
    }

    #[tokio::test]
    async fn permission_denied_blocks_start() {
        let source = Arc::new(ReplayLocationSource::new(vec![sample()]).deny_permission());
        let store = Arc::new(MemoryPositionStore::new());
        let contractor = ContractorId::try_from("c-1").unwrap();
        let mut publisher = PositionPublisher::new(
            Arc::clone(&source),
            Arc::clone(&store),
            contractor.clone(),
            permissive(),
        );

        let err = publisher.start_tracking().await.unwrap_err();
        assert_eq!(err.to_string(), "Permission to access location was denied");
        assert!(!publisher.is_tracking());
        assert_eq!(store.current(&contractor).await, None);
    }

    #[tokio::test]
    async fn publishes_acquired_samples() {
        let source = Arc::new(ReplayLocationSource::new(vec![sample()]));
        let store = Arc::new(MemoryPositionStore::new());
        let contractor = ContractorId::try_from("c-1").unwrap();
        let mut publisher = PositionPublisher::new(
            Arc::clone(&source),
            Arc::clone(&store),
            contractor.clone(),
            permissive(),
        );

        publisher.start_tracking().await.unwrap();
        assert!(publisher.is_tracking());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let record = store.current(&contractor).await.expect("record written");
        let expected = PositionRecord::from_sample(&sample(), record.timestamp.unwrap());
        assert_eq!(record, expected);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_tracking() {
        let source = Arc::new(ReplayLocationSource::new(vec![sample()]));
        let store = Arc::new(MemoryPositionStore::new());
        let contractor = ContractorId::try_from("c-1").unwrap();
        let mut publisher =
            PositionPublisher::new(Arc::clone(&source), store, contractor, permissive());

        publisher.start_tracking().await.unwrap();
        publisher.start_tracking().await.unwrap();

        // Second start registered no second feed
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.cancellations(), 0);
        publisher.stop_tracking().await.unwrap();
        assert_eq!(source.cancellations(), 1);
    }

    #[tokio::test]
    async fn double_stop_writes_inactive_once() {
        let source = Arc::new(ReplayLocationSource::new(vec![sample()]));
        let store = Arc::new(CountingStore::new());
        let contractor = ContractorId::try_from("c-1").unwrap();
        let mut publisher = PositionPublisher::new(
            Arc::clone(&source),
            Arc::clone(&store),
            contractor.clone(),
            permissive(),
        );

        publisher.start_tracking().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        publisher.stop_tracking().await.unwrap();
        publisher.stop_tracking().await.unwrap();

        assert_eq!(store.inactive_writes.load(Ordering::SeqCst), 1);
        assert!(!publisher.is_tracking());
        let record = store.inner.current(&contractor).await.unwrap();
        assert!(!record.is_active);
        // Last-known coordinates survive the stop
        assert_eq!(record.latitude, 12.34);
    }

    #[tokio::test]
    async fn drop_cancels_feed_exactly_once() {
        let source = Arc::new(ReplayLocationSource::new(vec![sample()]));
        let store = Arc::new(MemoryPositionStore::new());
        let contractor = ContractorId::try_from("c-1").unwrap();
        let mut publisher = PositionPublisher::new(
            Arc::clone(&source),
            store,
            contractor,
            permissive(),
        );

        publisher.start_tracking().await.unwrap();
        assert!(publisher.is_tracking());

        drop(publisher);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.cancellations(), 1);
    }
}
