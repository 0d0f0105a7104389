//! Application configuration

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::TrackingError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub role: Role,
    pub mqtt: MqttConfig,
    pub database: DatabaseConfig,
    pub tracking: TrackingConfig,
}

/// Which side of the tracking contract this process runs.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Contractor side: acquire device positions and publish them
    Publish,
    /// Customer side: watch a contractor's record and report health
    Watch,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct MqttConfig {
    pub uri: String,
    pub client_id: String,
    /// How long the broker admission probe may wait for a ConnAck
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct TrackingConfig {
    /// Stable identity keying the Position Record
    pub contractor_id: String,
    /// Acquisition cadence: emit after this much time has passed
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_interval")]
    pub interval: Duration,
    /// Acquisition cadence: emit after moving this many meters
    #[serde(default = "default_min_displacement")]
    pub min_displacement: f64,
    /// A record older than this with no live pushes reads as a
    /// connection problem
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_freshness_threshold")]
    pub freshness_threshold: Duration,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_min_displacement() -> f64 {
    1.0
}

fn default_freshness_threshold() -> Duration {
    Duration::from_secs(60)
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("PLOWTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl TrackingConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TrackingError> {
        if self.interval.is_zero() {
            return Err(TrackingError::InvalidConfig {
                message: "Tracking interval must be greater than zero".to_string(),
            });
        }
        if !self.min_displacement.is_finite() || self.min_displacement < 0.0 {
            return Err(TrackingError::InvalidConfig {
                message: "Minimum displacement must be a non-negative number".to_string(),
            });
        }
        if self.freshness_threshold.is_zero() {
            return Err(TrackingError::InvalidConfig {
                message: "Freshness threshold must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
