//! Postgres-backed position store.
//!
//! One `positions` row per contractor. Publishing is an upsert stamped with
//! `now()` on the server, stopping is a merge update, and the push watch
//! rides `LISTEN/NOTIFY`: a trigger emits the changed row as JSON and each
//! watch task filters for its contractor.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::{ContractorId, PositionRecord, PositionSample};

use super::{PositionStore, PositionWatch, StoreEvent};

/// Notification channel the row trigger publishes on.
const NOTIFY_CHANNEL: &str = "position_updates";

pub struct PgPositionStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct PositionRow {
    latitude: f64,
    longitude: f64,
    speed: f64,
    accuracy: f64,
    heading: f64,
    timestamp: DateTime<Utc>,
    is_active: bool,
}

impl From<PositionRow> for PositionRecord {
    fn from(row: PositionRow) -> Self {
        Self {
            latitude: row.latitude,
            longitude: row.longitude,
            speed: row.speed,
            accuracy: row.accuracy,
            heading: row.heading,
            timestamp: Some(row.timestamp),
            is_active: row.is_active,
        }
    }
}

/// Trigger payload: the changed row as JSON.
#[derive(Debug, Deserialize)]
struct PositionPayload {
    contractor_id: String,
    #[serde(flatten)]
    record: PositionRecord,
}

impl PgPositionStore {
    /// Connect and bring the schema up to date.
    pub async fn connect(url: &str) -> Result<Self, TrackingError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
        Self::new(pool).await
    }

    pub async fn new(pool: PgPool) -> Result<Self, TrackingError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    async fn fetch_record(
        pool: &PgPool,
        contractor: &ContractorId,
    ) -> Result<Option<PositionRecord>, TrackingError> {
        let row: Option<PositionRow> = sqlx::query_as(
            r#"SELECT latitude, longitude, speed, accuracy, heading, "timestamp", is_active
               FROM positions WHERE contractor_id = $1"#,
        )
        .bind(contractor.as_str())
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

impl PositionStore for PgPositionStore {
    async fn publish(
        &self,
        contractor: &ContractorId,
        sample: &PositionSample,
    ) -> Result<(), TrackingError> {
        let record = PositionRecord::from_sample(sample, Utc::now());
        sqlx::query(
            r#"INSERT INTO positions
                   (contractor_id, latitude, longitude, speed, accuracy, heading, "timestamp", is_active)
               VALUES ($1, $2, $3, $4, $5, $6, now(), TRUE)
               ON CONFLICT (contractor_id) DO UPDATE SET
                   latitude = EXCLUDED.latitude,
                   longitude = EXCLUDED.longitude,
                   speed = EXCLUDED.speed,
                   accuracy = EXCLUDED.accuracy,
                   heading = EXCLUDED.heading,
                   "timestamp" = now(),
                   is_active = TRUE"#,
        )
        .bind(contractor.as_str())
        .bind(record.latitude)
        .bind(record.longitude)
        .bind(record.speed)
        .bind(record.accuracy)
        .bind(record.heading)
        .execute(&self.pool)
        .await
        .map_err(|e| TrackingError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn mark_inactive(&self, contractor: &ContractorId) -> Result<(), TrackingError> {
        sqlx::query(
            r#"UPDATE positions SET is_active = FALSE, "timestamp" = now()
               WHERE contractor_id = $1"#,
        )
        .bind(contractor.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| TrackingError::Publish(e.to_string()))?;

        Ok(())
    }

    async fn watch(&self, contractor: &ContractorId) -> Result<PositionWatch, TrackingError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| TrackingError::Subscription(e.to_string()))?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(|e| TrackingError::Subscription(e.to_string()))?;

        let (tx, rx) = mpsc::channel(16);
        let pool = self.pool.clone();
        let contractor = contractor.clone();

        let task = tokio::spawn(async move {
            let snapshot = match Self::fetch_record(&pool, &contractor).await {
                Ok(record) => StoreEvent::Snapshot(record),
                Err(e) => StoreEvent::Lost(e.to_string()),
            };
            if tx.send(snapshot).await.is_err() {
                return;
            }

            loop {
                match listener.recv().await {
                    Ok(notification) => {
                        let payload: PositionPayload =
                            match serde_json::from_str(notification.payload()) {
                                Ok(payload) => payload,
                                Err(e) => {
                                    warn!("Malformed position payload: {}", e);
                                    continue;
                                }
                            };
                        if payload.contractor_id != contractor.as_str() {
                            continue;
                        }
                        if tx
                            .send(StoreEvent::Update(Some(payload.record)))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Err(e) => {
                        // PgListener reconnects on the next recv
                        if tx.send(StoreEvent::Lost(e.to_string())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let abort = task.abort_handle();
        Ok(PositionWatch::new(rx, CancelHandle::new(move || abort.abort())))
    }
}
