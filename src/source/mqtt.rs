//! MQTT device feed.
//!
//! The contractor's device publishes raw GPS samples to
//! `contractors/{id}/position`; this source subscribes over WSS and turns
//! the stream into a cadence-filtered [`PositionFeed`]. Broker admission
//! stands in for the device permission prompt: a connection refused for
//! authorization reasons is a denied permission.

use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS,
    Transport,
};

use crate::config::MqttConfig;
use crate::errors::TrackingError;
use crate::handle::CancelHandle;
use crate::models::{ContractorId, PositionSample};

use super::{CadenceGate, CadencePolicy, LocationSource, PositionFeed};

pub struct MqttLocationSource {
    client: AsyncClient,
    event_loop: Mutex<Option<EventLoop>>,
    contractor: ContractorId,
    connect_timeout: Duration,
}

impl MqttLocationSource {
    /// Create a feed for one contractor's device topic
    pub fn new(config: &MqttConfig, contractor: &ContractorId) -> Result<Self, TrackingError> {
        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.uri, 443);

        mqtt_options.set_transport(Transport::wss_with_default_config());
        mqtt_options.set_keep_alive(Duration::from_secs(5));

        let (client, event_loop) = AsyncClient::new(mqtt_options, 100);

        Ok(Self {
            client,
            event_loop: Mutex::new(Some(event_loop)),
            contractor: contractor.clone(),
            connect_timeout: config.connect_timeout,
        })
    }

    fn topic(&self) -> String {
        format!("contractors/{}/position", self.contractor)
    }

    /// Process MQTT events
    ///
    /// `rumqttc` reconnects automatically when the connection drops, but
    /// topic subscriptions must be re-established, so every ConnAck
    /// triggers a fresh subscribe.
    async fn process_events(
        tx: mpsc::Sender<Result<PositionSample, TrackingError>>,
        mut event_loop: EventLoop,
        client: AsyncClient,
        topic: String,
        contractor: ContractorId,
        cadence: CadencePolicy,
    ) {
        let mut gate = CadenceGate::new(cadence);

        if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
            error!("Failed to subscribe to {}: {}", topic, e);
            let _ = tx.send(Err(e.into())).await;
            return;
        }

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("Connected to device feed, subscribing to {}", topic);
                    if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                        error!("Failed to subscribe: {}", e);
                        let _ = tx.send(Err(e.into())).await;
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    match Self::parse_sample(&publish.topic, &publish.payload) {
                        Ok((id, sample)) => {
                            if id != contractor {
                                continue;
                            }
                            if gate.admit(&sample) {
                                if tx.send(Ok(sample)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            warn!("Failed to parse sample: {}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Device feed error: {}", e);
                    let _ = tx
                        .send(Err(TrackingError::Acquisition(e.to_string())))
                        .await;
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                _ => continue,
            }
        }
    }

    /// Parse an incoming message based on topic
    fn parse_sample(
        topic: &str,
        payload: &[u8],
    ) -> Result<(ContractorId, PositionSample), TrackingError> {
        let parts: Vec<&str> = topic.split('/').collect();

        // Validate topic structure
        if parts.len() < 3 || parts[0] != "contractors" {
            return Err(TrackingError::InvalidTopic(topic.to_string()));
        }

        let contractor = parts[1].try_into()?;

        match parts[2] {
            "position" => {
                let sample: PositionSample = serde_json::from_slice(payload)?;
                Ok((contractor, sample))
            }
            _ => Err(TrackingError::UnknownMessageType(parts[2].to_string())),
        }
    }
}

impl LocationSource for MqttLocationSource {
    async fn request_permission(&self) -> Result<(), TrackingError> {
        let mut guard = self.event_loop.lock().await;
        let Some(event_loop) = guard.as_mut() else {
            // Feed already running, permission was granted earlier
            return Ok(());
        };

        let probe = async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack)))
                        if ack.code == ConnectReturnCode::Success =>
                    {
                        return Ok(());
                    }
                    Ok(_) => continue,
                    Err(ConnectionError::ConnectionRefused(code)) => {
                        return match code {
                            ConnectReturnCode::NotAuthorized
                            | ConnectReturnCode::BadUserNamePassword => {
                                Err(TrackingError::PermissionDenied)
                            }
                            other => Err(TrackingError::Subscription(format!(
                                "broker refused connection: {other:?}"
                            ))),
                        };
                    }
                    Err(e) => {
                        warn!("Device feed connect error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        };

        match tokio::time::timeout(self.connect_timeout, probe).await {
            Ok(result) => result,
            Err(_) => Err(TrackingError::Acquisition(
                "timed out waiting for device feed connection".to_string(),
            )),
        }
    }

    async fn watch_position(&self, cadence: CadencePolicy) -> Result<PositionFeed, TrackingError> {
        let event_loop = self.event_loop.lock().await.take().ok_or_else(|| {
            TrackingError::Subscription("device feed already consumed".to_string())
        })?;

        let (tx, rx) = mpsc::channel(100);

        let task = tokio::spawn(Self::process_events(
            tx,
            event_loop,
            self.client.clone(),
            self.topic(),
            self.contractor.clone(),
            cadence,
        ));

        let abort = task.abort_handle();
        Ok(PositionFeed::new(rx, CancelHandle::new(move || abort.abort())))
    }
}
