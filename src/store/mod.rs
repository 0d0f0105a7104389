//! Position store boundary.
//!
//! The store is the sole rendezvous between publisher and subscriber: one
//! mutable Position Record per contractor identity, written by the
//! contractor's publisher and fanned out to any number of watches. The
//! store assigns write timestamps and serializes write ordering; clients
//! never coordinate with each other directly.

mod memory;
mod postgres;

pub use memory::MemoryPositionStore;
pub use postgres::PgPositionStore;

use std::future::Future;

use tokio::sync::mpsc;

use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::{ContractorId, PositionRecord, PositionSample};

/// One delivery from a watch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The record's state at subscribe time; `None` means the record has
    /// never been written
    Snapshot(Option<PositionRecord>),
    /// A change pushed by the store after subscribing
    Update(Option<PositionRecord>),
    /// The subscription transport failed; previously delivered state is
    /// still the best available
    Lost(String),
}

/// An open push subscription to one contractor's Position Record.
///
/// Dropping the watch cancels it; a cancelled watch delivers nothing
/// further.
#[derive(Debug)]
pub struct PositionWatch {
    rx: mpsc::Receiver<StoreEvent>,
    handle: CancelHandle,
}

impl PositionWatch {
    pub fn new(rx: mpsc::Receiver<StoreEvent>, handle: CancelHandle) -> Self {
        Self { rx, handle }
    }

    /// Receive the next delivery; `None` once the watch is closed.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    pub fn cancel(&mut self) {
        self.handle.cancel();
    }
}

/// Document store holding one Position Record per contractor.
pub trait PositionStore: Send + Sync {
    /// Overwrite the contractor's record with `sample`, marking it active
    /// and stamping a store-assigned timestamp.
    fn publish(
        &self,
        contractor: &ContractorId,
        sample: &PositionSample,
    ) -> impl Future<Output = Result<(), TrackingError>> + Send;

    /// Merge `is_active = false` and a fresh timestamp into the existing
    /// record, preserving the last-known coordinates. A record that was
    /// never written is left absent.
    fn mark_inactive(
        &self,
        contractor: &ContractorId,
    ) -> impl Future<Output = Result<(), TrackingError>> + Send;

    /// Open a push subscription to the contractor's record. The first
    /// delivery is a [`StoreEvent::Snapshot`] of current state.
    fn watch(
        &self,
        contractor: &ContractorId,
    ) -> impl Future<Output = Result<PositionWatch, TrackingError>> + Send;
}
