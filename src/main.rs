//! Contractor tracking daemon

use std::sync::Arc;

use chrono::Utc;
use tokio::signal;
use tracing::info;

use plow_tracker::config::{AppConfig, Role};
use plow_tracker::errors::TrackingError;
use plow_tracker::format::{self, SpeedUnit};
use plow_tracker::models::ContractorId;
use plow_tracker::publisher::PositionPublisher;
use plow_tracker::session::TrackingSession;
use plow_tracker::source::{CadencePolicy, MqttLocationSource};
use plow_tracker::store::PgPositionStore;

#[tokio::main]
async fn main() -> Result<(), TrackingError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = AppConfig::load()?;
    config.tracking.validate()?;

    let contractor = ContractorId::try_from(config.tracking.contractor_id.as_str())?;
    let store = PgPositionStore::connect(&config.database.url).await?;

    match config.role {
        Role::Publish => run_publisher(&config, store, contractor).await,
        Role::Watch => run_watcher(&config, store, contractor).await,
    }
}

/// Contractor side: publish device positions until shutdown, then mark the
/// record inactive.
async fn run_publisher(
    config: &AppConfig,
    store: PgPositionStore,
    contractor: ContractorId,
) -> Result<(), TrackingError> {
    let source = MqttLocationSource::new(&config.mqtt, &contractor)?;
    let cadence = CadencePolicy::new(
        config.tracking.interval,
        config.tracking.min_displacement,
    );

    let mut publisher =
        PositionPublisher::new(Arc::new(source), Arc::new(store), contractor, cadence);
    publisher.start_tracking().await?;

    signal::ctrl_c().await?;
    info!("Received shutdown signal");

    publisher.stop_tracking().await?;
    Ok(())
}

/// Customer side: follow the contractor's record and log every delivery
/// with the derived health status.
async fn run_watcher(
    config: &AppConfig,
    store: PgPositionStore,
    contractor: ContractorId,
) -> Result<(), TrackingError> {
    let mut session = TrackingSession::new(Arc::new(store), config.tracking.freshness_threshold);
    session.track(contractor).await?;
    info!("Status: {}", session.health(Utc::now()));

    loop {
        tokio::select! {
            event = session.recv() => {
                if event.is_none() {
                    break;
                }
                let status = session.health(Utc::now());
                match session.record() {
                    Some(record) => {
                        let updated = record
                            .timestamp
                            .map(|t| format::format_last_updated(&t))
                            .unwrap_or_else(|| "unknown".to_string());
                        info!(
                            "Status: {} | {} | {} | updated {}",
                            status,
                            format::format_coordinates(record.latitude, record.longitude),
                            format::format_speed(record.speed, SpeedUnit::MilesPerHour),
                            updated,
                        );
                    }
                    None => info!("Status: {}", status),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                session.untrack();
                break;
            }
        }
    }

    Ok(())
}
