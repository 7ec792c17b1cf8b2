//! In-process sink that records every publication.
//!
//! Useful to observe what a session publishes without a broker. Failures
//! can be injected per topic and for initial connects.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{Connector, LastWill, Publication, QoS, Sink, SinkError};

/// A sink that keeps publications in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    publications: Mutex<Vec<Publication>>,
    failing: Mutex<Vec<String>>,
    last_will: Mutex<Option<LastWill>>,
    connect_attempts: AtomicUsize,
    closed: AtomicBool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish to a topic containing `pattern` fail.
    pub fn fail_on(&self, pattern: impl Into<String>) {
        self.failing.lock().push(pattern.into());
    }

    /// All successful publications, in call order.
    pub fn publications(&self) -> Vec<Publication> {
        self.publications.lock().clone()
    }

    /// Payloads published to exactly `topic`, in call order.
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.publications
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .map(|p| p.payload.clone())
            .collect()
    }

    /// Most recent payload published to `topic`.
    pub fn last_payload(&self, topic: &str) -> Option<String> {
        self.payloads(topic).pop()
    }

    /// Last will registered by the connector, if any.
    pub fn last_will(&self) -> Option<LastWill> {
        self.last_will.lock().clone()
    }

    /// Number of connect attempts made against this sink.
    pub fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Whether the session was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn publish(
        &self,
        topic: &str,
        payload: &str,
        qos: QoS,
        retain: bool,
    ) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        if self.failing.lock().iter().any(|p| topic.contains(p.as_str())) {
            return Err(SinkError::Publish {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        self.publications.lock().push(Publication {
            topic: topic.to_string(),
            payload: payload.to_string(),
            qos,
            retain,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out a shared [`MemorySink`].
#[derive(Debug)]
pub struct MemoryConnector {
    sink: Arc<MemorySink>,
    failures_left: usize,
}

impl MemoryConnector {
    /// Create a connector that always succeeds.
    pub fn new(sink: Arc<MemorySink>) -> Self {
        Self {
            sink,
            failures_left: 0,
        }
    }

    /// Fail the first `attempts` connects.
    pub fn fail_first(mut self, attempts: usize) -> Self {
        self.failures_left = attempts;
        self
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    fn endpoint(&self) -> String {
        "memory".to_string()
    }

    fn set_last_will(&mut self, will: LastWill) {
        *self.sink.last_will.lock() = Some(will);
    }

    async fn connect(&mut self) -> Result<Arc<dyn Sink>, SinkError> {
        self.sink.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(SinkError::Connection("injected failure".to_string()));
        }
        self.sink.closed.store(false, Ordering::SeqCst);
        Ok(self.sink.clone())
    }
}
