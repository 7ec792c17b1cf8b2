//! # netprobe-sink
//!
//! Sessions with the telemetry sink the agent publishes to.
//!
//! A [`Connector`] knows how to reach the sink. A last-will message is
//! registered on it before connecting; the sink delivers that message on
//! the agent's behalf if the session ends without a clean close. A
//! successful [`Connector::connect`] yields a shared [`Sink`] handle used
//! for publishing by every task of the session.
//!
//! ## Backends
//!
//! - **MQTT** (`mqtt` feature) - [`mqtt::MqttConnector`]
//! - **Memory** - [`memory::MemoryConnector`], records publications in-process
//!
//! ## Example
//!
//! ```rust
//! use netprobe_sink::memory::{MemoryConnector, MemorySink};
//! use netprobe_sink::{Connector, LastWill, QoS};
//! use std::sync::Arc;
//!
//! # tokio_test_block_on(async {
//! let sink = Arc::new(MemorySink::new());
//! let mut connector = MemoryConnector::new(sink.clone());
//! connector.set_last_will(LastWill::new("agent/state", "OFF", QoS::AtLeastOnce, true));
//!
//! let session = connector.connect().await.unwrap();
//! session.publish("agent/state", "ON", QoS::AtLeastOnce, true).await.unwrap();
//!
//! assert_eq!(sink.publications().len(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;

pub mod error;
pub mod memory;

#[cfg(feature = "mqtt")]
pub mod mqtt;

pub use error::SinkError;

/// Delivery guarantee requested for a publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

/// Message the sink delivers if the session terminates abnormally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastWill {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

impl LastWill {
    /// Create a new last-will message.
    pub fn new(
        topic: impl Into<String>,
        payload: impl Into<String>,
        qos: QoS,
        retain: bool,
    ) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain,
        }
    }
}

/// A publication as seen by the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

/// A live session with the sink.
///
/// Shared read-only between every task of a session; publishing does not
/// require exclusive access.
#[async_trait]
pub trait Sink: Send + Sync + Debug {
    /// Publish `payload` on `topic`. Returns once the call completed.
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), SinkError>;

    /// Close the session cleanly. The last will is not delivered.
    async fn close(&self) -> Result<(), SinkError>;
}

/// Establishes sessions with the sink.
#[async_trait]
pub trait Connector: Send + Debug {
    /// Human-readable endpoint, used in log messages.
    fn endpoint(&self) -> String;

    /// Register the last-will message for subsequent connects.
    fn set_last_will(&mut self, will: LastWill);

    /// Try once to establish a session.
    ///
    /// Once established, recovering from transport loss is the session's
    /// own business; callers only retry failed initial connects.
    async fn connect(&mut self) -> Result<Arc<dyn Sink>, SinkError>;
}
