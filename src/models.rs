//! Data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::TrackingError;
use serde_helpers::*;

/// Stable contractor identity.
///
/// Keys the contractor's Position Record in the store and scopes the device
/// feed topic. Blank identities are rejected: an order without an assigned
/// contractor cannot be tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContractorId(String);

impl TryFrom<&str> for ContractorId {
    type Error = TrackingError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TrackingError::NoContractorAssigned);
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for ContractorId {
    type Error = TrackingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl ContractorId {
    /// Get the raw identity string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContractorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One device position acquisition.
///
/// Speed and heading carry device sentinels for "not available": a negative
/// speed (a device without a fix reports -1) and a heading outside 0..360
/// both deserialize to `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PositionSample {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Ground speed in m/s, None if the device has no estimate
    #[serde(default, deserialize_with = "deserialize_speed")]
    pub speed: Option<f64>,
    /// Radius of uncertainty in meters
    #[serde(default)]
    pub accuracy: f64,
    /// Direction of travel in degrees (0-360), None if not available
    #[serde(default, deserialize_with = "deserialize_heading")]
    pub heading: Option<f64>,
}

/// The shared Position Record, one per contractor identity.
///
/// Overwritten on every publish; no history is kept. The timestamp is
/// assigned by the store at write time, never by the publishing device, so
/// it is monotonically non-decreasing per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Ground speed in m/s, 0 when the device had no estimate
    #[serde(default)]
    pub speed: f64,
    /// Radius of uncertainty in meters
    #[serde(default)]
    pub accuracy: f64,
    /// Direction of travel in degrees, 0 when not available
    #[serde(default)]
    pub heading: f64,
    /// Store-assigned write instant; None when the stored shape could not
    /// be normalized to an instant
    #[serde(default, deserialize_with = "deserialize_instant")]
    pub timestamp: Option<DateTime<Utc>>,
    /// True while the publisher is actively tracking
    pub is_active: bool,
}

impl PositionRecord {
    /// Build the record a publish writes for `sample`.
    ///
    /// Absent speed and heading become 0, negative accuracy is clamped.
    pub fn from_sample(sample: &PositionSample, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed: sample.speed.unwrap_or(0.0),
            accuracy: sample.accuracy.max(0.0),
            heading: sample.heading.unwrap_or(0.0),
            timestamp: Some(timestamp),
            is_active: true,
        }
    }
}

/// Normalize a stored timestamp value to one canonical instant.
///
/// Accepts the store-native `{seconds, nanoseconds}` object, plain numeric
/// seconds since the Unix epoch, or an RFC 3339 string. Anything else is
/// `None`; shape handling lives here and nowhere downstream.
pub fn normalize_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Object(map) => {
            let seconds = map.get("seconds").and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("nanos"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos as u32)
        }
        Value::Number(n) => {
            let seconds = n.as_f64()?;
            DateTime::from_timestamp(seconds.trunc() as i64, (seconds.fract() * 1e9) as u32)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// Custom deserializers
mod serde_helpers {
    use super::normalize_instant;
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize_speed<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.filter(|v| *v >= 0.0))
    }

    pub fn deserialize_heading<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<f64>::deserialize(deserializer)?;
        Ok(value.filter(|v| (0.0..=360.0).contains(v)))
    }

    pub fn deserialize_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().and_then(normalize_instant))
    }
}
