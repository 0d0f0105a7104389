//! Presentation helpers for positions, speeds and timestamps.
//!
//! Pure formatting, no state: the tracking views render whatever these
//! return.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Display unit for ground speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    MilesPerHour,
    KilometersPerHour,
}

const MPS_TO_MPH: f64 = 2.236_936_292_054_4;
const MPS_TO_KMH: f64 = 3.6;

/// Latitude as fixed six-decimal degrees with a hemisphere letter.
pub fn format_latitude(latitude: f64) -> String {
    let hemisphere = if latitude >= 0.0 { "N" } else { "S" };
    format!("{:.6}° {}", latitude.abs(), hemisphere)
}

/// Longitude as fixed six-decimal degrees with a hemisphere letter.
pub fn format_longitude(longitude: f64) -> String {
    let hemisphere = if longitude >= 0.0 { "E" } else { "W" };
    format!("{:.6}° {}", longitude.abs(), hemisphere)
}

/// Both coordinates, latitude first.
pub fn format_coordinates(latitude: f64, longitude: f64) -> String {
    format!(
        "{}, {}",
        format_latitude(latitude),
        format_longitude(longitude)
    )
}

/// Ground speed converted from m/s to the display unit, one decimal.
pub fn format_speed(meters_per_second: f64, unit: SpeedUnit) -> String {
    match unit {
        SpeedUnit::MilesPerHour => {
            format!("{:.1} mph", meters_per_second * MPS_TO_MPH)
        }
        SpeedUnit::KilometersPerHour => {
            format!("{:.1} km/h", meters_per_second * MPS_TO_KMH)
        }
    }
}

/// Wall-clock time of `timestamp` in the given zone.
pub fn clock_time<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%H:%M:%S").to_string()
}

/// "Last updated" label: the store timestamp on the local wall clock.
pub fn format_last_updated(timestamp: &DateTime<Utc>) -> String {
    clock_time(&timestamp.with_timezone(&Local))
}
