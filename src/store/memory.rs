//! In-memory position store.
//!
//! One `tokio::sync::watch` channel per contractor holds the latest record;
//! `None` is the "never written" state. Fan-out and last-write-wins
//! semantics come from the channel itself, which mirrors what the real
//! document store provides.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};

use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::{ContractorId, PositionRecord, PositionSample};

use super::{PositionStore, PositionWatch, StoreEvent};

#[derive(Default)]
pub struct MemoryPositionStore {
    records: Mutex<HashMap<ContractorId, watch::Sender<Option<PositionRecord>>>>,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest record for `contractor`, if any has been written.
    pub async fn current(&self, contractor: &ContractorId) -> Option<PositionRecord> {
        let records = self.records.lock().await;
        records
            .get(contractor)
            .and_then(|tx| tx.borrow().clone())
    }

    /// Number of open watches on `contractor`'s record.
    pub async fn watch_count(&self, contractor: &ContractorId) -> usize {
        let records = self.records.lock().await;
        records
            .get(contractor)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}

impl PositionStore for MemoryPositionStore {
    async fn publish(
        &self,
        contractor: &ContractorId,
        sample: &PositionSample,
    ) -> Result<(), TrackingError> {
        let record = PositionRecord::from_sample(sample, Utc::now());
        let mut records = self.records.lock().await;
        records
            .entry(contractor.clone())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(record));
        Ok(())
    }

    async fn mark_inactive(&self, contractor: &ContractorId) -> Result<(), TrackingError> {
        let records = self.records.lock().await;
        if let Some(tx) = records.get(contractor) {
            tx.send_modify(|current| {
                if let Some(record) = current {
                    record.is_active = false;
                    record.timestamp = Some(Utc::now());
                }
            });
        }
        Ok(())
    }

    async fn watch(&self, contractor: &ContractorId) -> Result<PositionWatch, TrackingError> {
        let mut source = {
            let mut records = self.records.lock().await;
            records
                .entry(contractor.clone())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe()
        };

        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(async move {
            let initial = source.borrow_and_update().clone();
            if tx.send(StoreEvent::Snapshot(initial)).await.is_err() {
                return;
            }
            while source.changed().await.is_ok() {
                let current = source.borrow_and_update().clone();
                if tx.send(StoreEvent::Update(current)).await.is_err() {
                    break;
                }
            }
        });

        let abort = task.abort_handle();
        Ok(PositionWatch::new(rx, CancelHandle::new(move || abort.abort())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PositionSample {
        PositionSample {
            latitude: 12.34,
            longitude: 56.78,
            speed: Some(10.0),
            accuracy: 5.0,
            heading: Some(90.0),
        }
    }

    #[tokio::test]
    async fn watch_before_first_publish_snapshots_nothing() {
        let store = MemoryPositionStore::new();
        let contractor = ContractorId::try_from("c-1").unwrap();

        let mut watch = store.watch(&contractor).await.unwrap();
        assert_eq!(watch.recv().await, Some(StoreEvent::Snapshot(None)));
    }

    #[tokio::test]
    async fn publish_overwrites_and_fans_out() {
        let store = MemoryPositionStore::new();
        let contractor = ContractorId::try_from("c-1").unwrap();

        store.publish(&contractor, &sample()).await.unwrap();
        let mut watch = store.watch(&contractor).await.unwrap();

        let Some(StoreEvent::Snapshot(Some(first))) = watch.recv().await else {
            panic!("expected snapshot of the published record");
        };
        assert_eq!(first.latitude, 12.34);
        assert!(first.is_active);
        assert!(first.timestamp.is_some());

        let moved = PositionSample {
            latitude: 12.35,
            ..sample()
        };
        store.publish(&contractor, &moved).await.unwrap();

        let Some(StoreEvent::Update(Some(second))) = watch.recv().await else {
            panic!("expected a pushed update");
        };
        assert_eq!(second.latitude, 12.35);
        assert_eq!(store.current(&contractor).await.unwrap().latitude, 12.35);
    }

    #[tokio::test]
    async fn mark_inactive_preserves_coordinates() {
        let store = MemoryPositionStore::new();
        let contractor = ContractorId::try_from("c-1").unwrap();

        store.publish(&contractor, &sample()).await.unwrap();
        let before = store.current(&contractor).await.unwrap();

        store.mark_inactive(&contractor).await.unwrap();
        let after = store.current(&contractor).await.unwrap();

        assert!(!after.is_active);
        assert_eq!(after.latitude, before.latitude);
        assert_eq!(after.longitude, before.longitude);
        assert!(after.timestamp >= before.timestamp);
    }

    #[tokio::test]
    async fn mark_inactive_without_record_is_noop() {
        let store = MemoryPositionStore::new();
        let contractor = ContractorId::try_from("c-1").unwrap();

        store.mark_inactive(&contractor).await.unwrap();
        assert_eq!(store.current(&contractor).await, None);
    }

    #[tokio::test]
    async fn timestamps_are_non_decreasing() {
        let store = MemoryPositionStore::new();
        let contractor = ContractorId::try_from("c-1").unwrap();

        store.publish(&contractor, &sample()).await.unwrap();
        let first = store.current(&contractor).await.unwrap().timestamp;
        store.publish(&contractor, &sample()).await.unwrap();
        let second = store.current(&contractor).await.unwrap().timestamp;

        assert!(second >= first);
    }
}
