//! Scripted location source.
//!
//! Replays a fixed list of samples at a steady pace. Used by tests and by
//! anyone driving the publisher without a live device: permission can be
//! denied up front, and cancellations are observable.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::PositionSample;

use super::{CadenceGate, CadencePolicy, LocationSource, PositionFeed};

pub struct ReplayLocationSource {
    samples: Vec<PositionSample>,
    pace: Duration,
    permission_granted: bool,
    cancellations: Arc<AtomicUsize>,
}

impl ReplayLocationSource {
    pub fn new(samples: Vec<PositionSample>) -> Self {
        Self {
            samples,
            pace: Duration::from_millis(10),
            permission_granted: true,
            cancellations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Delay between consecutive replayed samples
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    /// Make `request_permission` fail
    pub fn deny_permission(mut self) -> Self {
        self.permission_granted = false;
        self
    }

    /// How many times a feed from this source has been cancelled
    pub fn cancellations(&self) -> usize {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl LocationSource for ReplayLocationSource {
    async fn request_permission(&self) -> Result<(), TrackingError> {
        if self.permission_granted {
            Ok(())
        } else {
            Err(TrackingError::PermissionDenied)
        }
    }

    async fn watch_position(&self, cadence: CadencePolicy) -> Result<PositionFeed, TrackingError> {
        let samples = self.samples.clone();
        let pace = self.pace;
        let (tx, rx) = mpsc::channel(100);

        let task = tokio::spawn(async move {
            let mut gate = CadenceGate::new(cadence);
            for sample in samples {
                if gate.admit(&sample) && tx.send(Ok(sample)).await.is_err() {
                    return;
                }
                tokio::time::sleep(pace).await;
            }
            // Script exhausted; hold the feed open until cancelled
            std::future::pending::<()>().await;
        });

        let abort = task.abort_handle();
        let cancellations = Arc::clone(&self.cancellations);
        Ok(PositionFeed::new(
            rx,
            CancelHandle::new(move || {
                cancellations.fetch_add(1, Ordering::SeqCst);
                abort.abort();
            }),
        ))
    }
}
