//! Live contractor position tracking.
//!
//! One mutable Position Record per contractor is the sole rendezvous
//! between the contractor's publisher and any number of customer sessions:
//! the publisher overwrites the record with each admitted device sample,
//! the store fans changes out to open watches, and each session derives a
//! connection-health status from the latest record and its live-push
//! counter.

pub mod config;
pub mod errors;
pub mod format;
pub mod handle;
pub mod models;
pub mod publisher;
pub mod session;
pub mod source;
pub mod store;

pub use config::AppConfig;
pub use errors::TrackingError;
pub use models::{ContractorId, PositionRecord, PositionSample};
pub use publisher::PositionPublisher;
pub use session::{connection_health, ConnectionHealth, TrackingSession};
