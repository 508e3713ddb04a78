// NEP Gateway - DNS interception, HTTP ingress and exposition
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Notification bridge to an MQTT broker
//!
//! A bridge only exists when a broker is configured and answered the
//! initial handshake; callers hold an `Option<NotificationBridge>`.
//! Publishing never waits on the network: requests are queued to the
//! client's event loop, and a full queue is reported as an error.

use std::time::Duration;

use nepserver::DeviceRecord;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::discovery::{config_topic, raw_topic, state_topic, DiscoveryDescriptor};
use crate::error::{GatewayError, Result};

/// Pending requests buffered between publishers and the event loop
const REQUEST_CAPACITY: usize = 64;

/// Pause before the event loop retries a lost connection
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Trait for message bus clients
pub trait Publisher: Send + Sync {
    /// Queue a message without blocking
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()>;
}

/// [`Publisher`] backed by a `rumqttc` client
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, retain, payload)
            .map_err(|e| GatewayError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Publishes readings and discovery documents
pub struct NotificationBridge {
    publisher: Box<dyn Publisher>,
    config: BridgeConfig,
}

impl NotificationBridge {
    /// Create a bridge over any publisher
    pub fn new(publisher: Box<dyn Publisher>, config: BridgeConfig) -> Self {
        Self { publisher, config }
    }

    /// Connect to the configured broker
    ///
    /// Waits up to `connect_timeout` for the broker's CONNACK, then drives
    /// the event loop in the background until `shutdown` flips to true.
    pub async fn connect(config: BridgeConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let client_id = format!("nepserver-{}", Uuid::new_v4());
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        if let (Some(user), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), password.clone());
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        match tokio::time::timeout(config.connect_timeout, wait_for_connack(&mut eventloop)).await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GatewayError::BridgeUnavailable(e.to_string())),
            Err(_) => {
                return Err(GatewayError::BridgeUnavailable(format!(
                    "no CONNACK from {}:{} within {:?}",
                    config.host, config.port, config.connect_timeout
                )))
            }
        }

        info!(host = %config.host, port = config.port, "MQTT bridge connected");
        tokio::spawn(drive_eventloop(eventloop, shutdown));

        Ok(Self::new(Box::new(MqttPublisher::new(client)), config))
    }

    /// Bridge configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Publish raw frame, wattage and discovery document for one record
    ///
    /// All three publishes are attempted; the first failure is returned.
    pub fn publish_record(&self, record: &DeviceRecord) -> Result<()> {
        let serial_number = &record.reading.serial_number;
        let descriptor = DiscoveryDescriptor::render(serial_number, &self.config);

        let results = [
            self.publisher.publish(
                &raw_topic(&self.config),
                record.raw_frame.to_hex().into_bytes(),
                false,
            ),
            self.publisher.publish(
                &state_topic(serial_number, &self.config),
                record.reading.power_watts.to_string().into_bytes(),
                true,
            ),
            descriptor.to_json().and_then(|json| {
                self.publisher.publish(
                    &config_topic(serial_number, &self.config),
                    json.into_bytes(),
                    true,
                )
            }),
        ];

        results.into_iter().collect()
    }
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> std::result::Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Packet::ConnAck(_)) = eventloop.poll().await? {
            return Ok(());
        }
    }
}

async fn drive_eventloop(mut eventloop: EventLoop, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            event = eventloop.poll() => match event {
                Ok(event) => debug!(?event, "MQTT event"),
                Err(e) => {
                    warn!(error = %e, "MQTT connection lost, retrying");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            },
        }
    }
    debug!("MQTT event loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nepserver::{RawFrame, Reading, SerialNumber, TelemetryStore};
    use std::sync::{Arc, Mutex};

    /// Publisher that records every message
    #[derive(Default, Clone)]
    struct RecordingPublisher {
        messages: Arc<Mutex<Vec<(String, String, bool)>>>,
        fail_topic: Option<String>,
    }

    impl Publisher for RecordingPublisher {
        fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool) -> Result<()> {
            if self.fail_topic.as_deref() == Some(topic) {
                return Err(GatewayError::Publish {
                    topic: topic.to_string(),
                    reason: "rejected".to_string(),
                });
            }
            self.messages.lock().unwrap().push((
                topic.to_string(),
                String::from_utf8(payload).unwrap(),
                retain,
            ));
            Ok(())
        }
    }

    fn record() -> Arc<DeviceRecord> {
        let reading = Reading::new(SerialNumber::new(0x30c577e1), 230);
        TelemetryStore::new().upsert(reading, RawFrame::new(vec![0x00, 0x5a, 0x48]), Utc::now())
    }

    #[test]
    fn test_publish_record_topics() {
        let publisher = RecordingPublisher::default();
        let bridge = NotificationBridge::new(Box::new(publisher.clone()), BridgeConfig::default());

        bridge.publish_record(&record()).unwrap();

        let messages = publisher.messages.lock().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(
            messages[0],
            ("nepserver/raw".to_string(), "005a48".to_string(), false)
        );
        assert_eq!(
            messages[1],
            ("nepserver/30c577e1/watt".to_string(), "230".to_string(), true)
        );
        assert_eq!(
            messages[2].0,
            "homeassistant/sensor/nepserver_30c577e1/watt/config"
        );
        assert!(messages[2].2);
        let doc: serde_json::Value = serde_json::from_str(&messages[2].1).unwrap();
        assert_eq!(doc["state_topic"], "nepserver/30c577e1/watt");
    }

    #[test]
    fn test_publish_failure_still_attempts_rest() {
        let publisher = RecordingPublisher {
            fail_topic: Some("nepserver/raw".to_string()),
            ..Default::default()
        };
        let bridge = NotificationBridge::new(Box::new(publisher.clone()), BridgeConfig::default());

        let result = bridge.publish_record(&record());
        assert!(matches!(result, Err(GatewayError::Publish { .. })));
        assert_eq!(publisher.messages.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_connect_unreachable_broker() {
        // Bind then drop to get a port nobody listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = BridgeConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        };
        let (_tx, rx) = watch::channel(false);

        let result = NotificationBridge::connect(config, rx).await;
        assert!(matches!(result, Err(GatewayError::BridgeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_eventloop_stops_during_reconnect_delay() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let (_client, eventloop) =
            AsyncClient::new(MqttOptions::new("test", "127.0.0.1", port), REQUEST_CAPACITY);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(drive_eventloop(eventloop, rx));

        // Connection is refused at once, so the loop is now waiting to retry
        tokio::time::sleep(Duration::from_millis(300)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("event loop kept sleeping after shutdown")
            .unwrap();
    }
}
