//! Errors for the position tracker
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackingError {
    #[error("Permission to access location was denied")]
    PermissionDenied,

    #[error("Location acquisition failed: {0}")]
    Acquisition(String),

    #[error("Position publish failed: {0}")]
    Publish(String),

    #[error("Location subscription failed: {0}")]
    Subscription(String),

    #[error("No contractor assigned")]
    NoContractorAssigned,

    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },

    #[error("MQTT connection failed")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    #[error("MQTT client error")]
    MqttClient(#[from] rumqttc::ClientError),

    #[error("Serialization error")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration error")]
    Config(#[from] config::ConfigError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Invalid topic")]
    InvalidTopic(String),

    #[error("Unknown message type")]
    UnknownMessageType(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),
}
