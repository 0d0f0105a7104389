//! Customer-side tracking session.
//!
//! A session watches exactly one contractor's Position Record at a time and
//! keeps the client-local view: last delivered record, received-at marker,
//! live-push counter, connected flag and error string. Connection health is
//! derived from that view by a pure function, re-evaluated whenever the
//! caller renders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::errors::TrackingError;
use crate::models::{ContractorId, PositionRecord};
use crate::store::{PositionStore, PositionWatch, StoreEvent};

/// Human-readable connection health for the tracking view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// No record has ever been delivered
    Waiting,
    /// The contractor stopped tracking
    Offline,
    /// The record is stale and no live push has arrived
    ConnectionIssues,
    /// Fresh data, or live pushes proving the device reachable
    Live,
}

impl std::fmt::Display for ConnectionHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionHealth::Waiting => "Waiting for contractor",
            ConnectionHealth::Offline => "Contractor Offline",
            ConnectionHealth::ConnectionIssues => "Connection Issues",
            ConnectionHealth::Live => "Live Tracking Active",
        };
        f.write_str(label)
    }
}

/// Derive connection health from the latest record and live-push counter.
///
/// An inactive record always reads as offline, regardless of freshness.
/// A stale timestamp only downgrades to connection issues while the counter
/// is zero: an update counter above zero is stronger evidence of liveness
/// than one ambiguous timestamp, so pushes win the tie-break.
pub fn connection_health(
    record: Option<&PositionRecord>,
    update_count: u64,
    now: DateTime<Utc>,
    freshness: TimeDelta,
) -> ConnectionHealth {
    let Some(record) = record else {
        return ConnectionHealth::Waiting;
    };
    if !record.is_active {
        return ConnectionHealth::Offline;
    }
    if update_count == 0 {
        if let Some(timestamp) = record.timestamp {
            if now.signed_duration_since(timestamp) > freshness {
                return ConnectionHealth::ConnectionIssues;
            }
        }
    }
    ConnectionHealth::Live
}

/// One customer's live view of one contractor.
pub struct TrackingSession<S> {
    store: Arc<S>,
    freshness: TimeDelta,
    target: Option<ContractorId>,
    watch: Option<PositionWatch>,
    record: Option<PositionRecord>,
    received_at: Option<DateTime<Utc>>,
    update_count: u64,
    connected: bool,
    error: Option<String>,
}

impl<S> TrackingSession<S>
where
    S: PositionStore,
{
    pub fn new(store: Arc<S>, freshness: Duration) -> Self {
        Self {
            store,
            freshness: TimeDelta::from_std(freshness)
                .unwrap_or_else(|_| TimeDelta::seconds(60)),
            target: None,
            watch: None,
            record: None,
            received_at: None,
            update_count: 0,
            connected: false,
            error: None,
        }
    }

    /// Follow `contractor`, cancelling any watch already open.
    ///
    /// The session reads as connecting (no record, not connected) until the
    /// first delivery arrives.
    pub async fn track(&mut self, contractor: ContractorId) -> Result<(), TrackingError> {
        self.reset();
        let watch = self.store.watch(&contractor).await?;
        self.watch = Some(watch);
        self.target = Some(contractor);
        Ok(())
    }

    /// Stop following and clear the view back to its initial state.
    pub fn untrack(&mut self) {
        self.reset();
        self.target = None;
    }

    /// Re-open the subscription for the current target after a transport
    /// failure.
    pub async fn retry(&mut self) -> Result<(), TrackingError> {
        match self.target.clone() {
            Some(contractor) => self.track(contractor).await,
            None => Err(TrackingError::NoContractorAssigned),
        }
    }

    /// Receive and apply the next delivery. `None` when no watch is open
    /// or the watch has closed.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        let watch = self.watch.as_mut()?;
        let event = watch.recv().await?;
        self.apply(&event);
        Some(event)
    }

    fn reset(&mut self) {
        if let Some(mut watch) = self.watch.take() {
            watch.cancel();
        }
        self.record = None;
        self.received_at = None;
        self.update_count = 0;
        self.connected = false;
        self.error = None;
    }

    fn apply(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::Snapshot(Some(record)) => {
                self.record = Some(record.clone());
                self.received_at = Some(Utc::now());
                self.connected = true;
                self.error = None;
            }
            StoreEvent::Update(Some(record)) => {
                self.record = Some(record.clone());
                self.received_at = Some(Utc::now());
                self.connected = true;
                self.error = None;
                self.update_count += 1;
            }
            StoreEvent::Snapshot(None) | StoreEvent::Update(None) => {
                self.error = Some("Contractor location not available".to_string());
            }
            StoreEvent::Lost(message) => {
                // Stale-but-visible: the last record stays on screen
                self.error = Some(message.clone());
                self.connected = false;
            }
        }
    }

    /// Current connection health as of `now`.
    pub fn health(&self, now: DateTime<Utc>) -> ConnectionHealth {
        connection_health(self.record.as_ref(), self.update_count, now, self.freshness)
    }

    pub fn record(&self) -> Option<&PositionRecord> {
        self.record.as_ref()
    }

    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.received_at
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn target(&self) -> Option<&ContractorId> {
        self.target.as_ref()
    }
}
