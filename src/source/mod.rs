//! Device location boundary.
//!
//! A location source stands in for the platform's positioning service: a
//! one-shot permission request, then a recurring acquisition registration
//! that honors a cadence policy and yields a cancellation handle.

mod mqtt;
mod replay;

pub use mqtt::MqttLocationSource;
pub use replay::ReplayLocationSource;

use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::PositionSample;

/// Acquisition cadence: a sample is admitted when either enough time has
/// passed or the device has moved far enough, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CadencePolicy {
    pub interval: Duration,
    pub min_displacement: f64,
}

impl CadencePolicy {
    pub fn new(interval: Duration, min_displacement: f64) -> Self {
        Self {
            interval,
            min_displacement,
        }
    }
}

impl Default for CadencePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            min_displacement: 1.0,
        }
    }
}

/// Stateful admission filter applying a [`CadencePolicy`].
#[derive(Debug)]
pub struct CadenceGate {
    policy: CadencePolicy,
    last: Option<(f64, f64, Instant)>,
}

impl CadenceGate {
    pub fn new(policy: CadencePolicy) -> Self {
        Self { policy, last: None }
    }

    /// Admit `sample` if the policy allows it now. The first sample is
    /// always admitted.
    pub fn admit(&mut self, sample: &PositionSample) -> bool {
        self.admit_at(sample, Instant::now())
    }

    fn admit_at(&mut self, sample: &PositionSample, now: Instant) -> bool {
        let admit = match self.last {
            None => true,
            Some((latitude, longitude, at)) => {
                now.duration_since(at) >= self.policy.interval
                    || distance_meters(latitude, longitude, sample.latitude, sample.longitude)
                        >= self.policy.min_displacement
            }
        };
        if admit {
            self.last = Some((sample.latitude, sample.longitude, now));
        }
        admit
    }
}

/// Great-circle distance between two coordinates, in meters.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// A running acquisition registration.
///
/// Samples arrive on the receiver; individual acquisition failures arrive
/// as errors and do not end the feed. Dropping the feed cancels the
/// registration.
#[derive(Debug)]
pub struct PositionFeed {
    rx: mpsc::Receiver<Result<PositionSample, TrackingError>>,
    handle: CancelHandle,
}

impl PositionFeed {
    pub fn new(
        rx: mpsc::Receiver<Result<PositionSample, TrackingError>>,
        handle: CancelHandle,
    ) -> Self {
        Self { rx, handle }
    }

    pub async fn recv(&mut self) -> Option<Result<PositionSample, TrackingError>> {
        self.rx.recv().await
    }

    /// Split into the sample receiver and the cancellation handle so the
    /// two can be owned by different parties.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<Result<PositionSample, TrackingError>>,
        CancelHandle,
    ) {
        (self.rx, self.handle)
    }
}

/// Device location service.
pub trait LocationSource: Send + Sync {
    /// One-shot permission request. [`TrackingError::PermissionDenied`]
    /// when the device refuses to share position.
    fn request_permission(&self) -> impl Future<Output = Result<(), TrackingError>> + Send;

    /// Begin recurring acquisition under `cadence`.
    fn watch_position(
        &self,
        cadence: CadencePolicy,
    ) -> impl Future<Output = Result<PositionFeed, TrackingError>> + Send;
}
