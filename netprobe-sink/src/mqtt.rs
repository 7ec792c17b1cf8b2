//! MQTT session backed by `rumqttc`.
//!
//! The connector drives the MQTT event loop until the broker acknowledges
//! the connection. From then on a background task keeps polling the event
//! loop: rumqttc reconnects on the next poll after a transport error, so
//! loss and restore of the session are only observed and logged here.
//!
//! ## Example
//!
//! ```rust,no_run
//! use netprobe_sink::mqtt::{MqttConnector, MqttTransport};
//! use netprobe_sink::{Connector, LastWill, QoS};
//!
//! # async fn run() -> Result<(), netprobe_sink::SinkError> {
//! let mut connector = MqttConnector::builder()
//!     .host("broker.local")
//!     .port(1883)
//!     .client_id("ha-net-probe_kitchen")
//!     .transport(MqttTransport::Tcp)
//!     .build();
//! connector.set_last_will(LastWill::new("probe/state", "OFF", QoS::AtLeastOnce, true));
//!
//! let session = connector.connect().await?;
//! session.publish("probe/state", "ON", QoS::AtLeastOnce, true).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, Transport};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{Connector, LastWill, QoS, Sink, SinkError};

/// Default MQTT broker port.
pub const DEFAULT_PORT: u16 = 1883;

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 256;
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Transport carrying the MQTT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MqttTransport {
    #[default]
    Tcp,
    Websockets,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// Connector for an MQTT broker.
#[derive(Debug, Clone)]
pub struct MqttConnector {
    host: String,
    port: u16,
    client_id: String,
    transport: MqttTransport,
    credentials: Option<(String, String)>,
    last_will: Option<LastWill>,
}

impl MqttConnector {
    /// Create a new builder for configuring the connector.
    pub fn builder() -> MqttConnectorBuilder {
        MqttConnectorBuilder::default()
    }

    fn options(&self) -> MqttOptions {
        let mut options = match self.transport {
            MqttTransport::Tcp => MqttOptions::new(&self.client_id, &self.host, self.port),
            MqttTransport::Websockets => {
                let url = format!("ws://{}:{}/mqtt", self.host, self.port);
                let mut options = MqttOptions::new(&self.client_id, url, self.port);
                options.set_transport(Transport::Ws);
                options
            }
        };

        options.set_keep_alive(KEEP_ALIVE);
        options.set_clean_session(true);

        if let Some((username, password)) = &self.credentials {
            options.set_credentials(username, password);
        }

        if let Some(will) = &self.last_will {
            options.set_last_will(rumqttc::LastWill::new(
                &will.topic,
                will.payload.as_bytes().to_vec(),
                will.qos.into(),
                will.retain,
            ));
        }

        options
    }
}

#[async_trait]
impl Connector for MqttConnector {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn set_last_will(&mut self, will: LastWill) {
        self.last_will = Some(will);
    }

    async fn connect(&mut self) -> Result<Arc<dyn Sink>, SinkError> {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);

        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    debug!(endpoint = %self.endpoint(), code = ?ack.code, "mqtt: connack");
                    break;
                }
                Ok(_) => {}
                Err(e) => return Err(SinkError::Connection(e.to_string())),
            }
        }

        let closing = Arc::new(AtomicBool::new(false));
        let events = tokio::spawn(drive_events(eventloop, self.endpoint(), closing.clone()));

        Ok(Arc::new(MqttSink {
            client,
            closing,
            events: Mutex::new(Some(events)),
        }))
    }
}

/// Keep the session alive and log connection changes.
async fn drive_events(mut eventloop: EventLoop, endpoint: String, closing: Arc<AtomicBool>) {
    let mut connected = true;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                if !connected {
                    info!("Reconnected to MQTT server {}", endpoint);
                    connected = true;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnected from MQTT server {}", endpoint);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if closing.load(Ordering::SeqCst) {
                    break;
                }
                if connected {
                    warn!("Unexpected disconnect from MQTT server {}: {}", endpoint, e);
                    connected = false;
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

/// Live MQTT session.
#[derive(Debug)]
pub struct MqttSink {
    client: AsyncClient,
    closing: Arc<AtomicBool>,
    events: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Sink for MqttSink {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), SinkError> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }

        let request = self
            .client
            .publish(topic, qos.into(), retain, payload.as_bytes().to_vec());

        match tokio::time::timeout(PUBLISH_TIMEOUT, request).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(SinkError::Publish {
                topic: topic.to_string(),
                reason: "timed out".to_string(),
            }),
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closing.store(true, Ordering::SeqCst);
        self.client
            .disconnect()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        if let Some(events) = self.events.lock().take() {
            events.abort();
        }
    }
}

/// Builder for [`MqttConnector`].
#[derive(Debug, Default)]
pub struct MqttConnectorBuilder {
    host: Option<String>,
    port: Option<u16>,
    client_id: Option<String>,
    transport: MqttTransport,
    credentials: Option<(String, String)>,
}

impl MqttConnectorBuilder {
    /// Set the broker host (default: "localhost").
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the broker port (default: 1883).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the MQTT client id.
    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Set the transport (default: TCP).
    pub fn transport(mut self, transport: MqttTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Authenticate with username and password.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// Build the connector.
    pub fn build(self) -> MqttConnector {
        MqttConnector {
            host: self.host.unwrap_or_else(|| "localhost".to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            client_id: self.client_id.unwrap_or_else(|| "netprobe".to_string()),
            transport: self.transport,
            credentials: self.credentials,
            last_will: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let connector = MqttConnector::builder().build();
        assert_eq!(connector.endpoint(), "localhost:1883");
        assert_eq!(connector.transport, MqttTransport::Tcp);
        assert!(connector.credentials.is_none());
        assert!(connector.last_will.is_none());
    }

    #[test]
    fn options_carry_last_will_and_credentials() {
        let mut connector = MqttConnector::builder()
            .host("broker")
            .port(1884)
            .client_id("probe-1")
            .credentials("user", "secret")
            .build();
        connector.set_last_will(LastWill::new("a/state", "OFF", QoS::AtLeastOnce, true));

        let options = connector.options();
        assert_eq!(options.client_id(), "probe-1");
        assert_eq!(options.broker_address(), ("broker".to_string(), 1884));
        assert_eq!(
            options.credentials(),
            Some(("user".to_string(), "secret".to_string()))
        );

        let will = options.last_will().unwrap();
        assert_eq!(will.topic, "a/state");
        assert_eq!(&will.message[..], b"OFF");
        assert!(will.retain);
    }

    #[test]
    fn websocket_transport_uses_url() {
        let connector = MqttConnector::builder()
            .host("broker")
            .port(9001)
            .transport(MqttTransport::Websockets)
            .build();

        let options = connector.options();
        assert_eq!(options.broker_address().0, "ws://broker:9001/mqtt");
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut connector = MqttConnector::builder().host("127.0.0.1").port(port).build();
        let result = connector.connect().await;
        assert!(matches!(result, Err(SinkError::Connection(_))));
    }
}
