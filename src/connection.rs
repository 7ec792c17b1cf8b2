//! Sink session ownership: connect with backoff, last will, liveness.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use netprobe_sink::{Connector, Sink};
use netprobe_types::Connectivity;

use crate::publish::liveness::{last_will, send_liveness};
use crate::publish::{SensorEntity, SensorEntityBuilder};

/// Time granted to the transport to flush the final disconnect.
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Linear retry delay: `step` more per failed attempt, at most `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub step: Duration,
    pub max: Duration,
}

impl Backoff {
    pub const fn new(step: Duration, max: Duration) -> Self {
        Self { step, max }
    }

    /// Delay before the next attempt after `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        self.step.saturating_mul(failures).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(10))
    }
}

/// Establishes the session with the sink.
///
/// The last will is registered on the connector when the manager is
/// created, so it is in place before the first attempt.
#[derive(Debug)]
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    liveness: SensorEntityBuilder,
    backoff: Backoff,
}

impl ConnectionManager {
    pub fn new(
        mut connector: Box<dyn Connector>,
        liveness: SensorEntityBuilder,
        backoff: Backoff,
    ) -> Self {
        connector.set_last_will(last_will(liveness.state_topic()));
        Self {
            connector,
            liveness,
            backoff,
        }
    }

    /// Connect, retrying until a session is established.
    ///
    /// Never gives up; failures are only logged. Dropping the future
    /// abandons the attempts.
    pub async fn connect(&mut self) -> Connection {
        let endpoint = self.connector.endpoint();
        let mut failures: u32 = 0;
        loop {
            if failures > 0 {
                let delay = self.backoff.delay(failures);
                info!(endpoint = %endpoint, "sleep {:.0} sec before retrying", delay.as_secs_f64());
                tokio::time::sleep(delay).await;
            }
            info!(endpoint = %endpoint, "connecting to sink");
            match self.connector.connect().await {
                Ok(sink) => {
                    info!(endpoint = %endpoint, attempts = failures + 1, "connected to sink");
                    let liveness = self.liveness.clone().build(sink.clone());
                    return Connection { sink, liveness };
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, "connect failed: {}", e);
                    failures = failures.saturating_add(1);
                }
            }
        }
    }
}

/// An established session.
#[derive(Debug)]
pub struct Connection {
    sink: Arc<dyn Sink>,
    liveness: SensorEntity,
}

impl Connection {
    /// Shared publish handle.
    pub fn sink(&self) -> Arc<dyn Sink> {
        self.sink.clone()
    }

    pub fn liveness(&self) -> &SensorEntity {
        &self.liveness
    }

    /// Publish the liveness descriptor. Failures are logged.
    pub async fn send_configuration(&self) {
        if let Err(e) = self.liveness.send_configuration().await {
            warn!(topic = self.liveness.config_topic(), "error publishing config: {}", e);
        }
    }

    /// Report the agent as connected.
    pub async fn announce(&self) {
        send_liveness(&self.liveness, Connectivity::Connected).await;
    }

    /// Report the agent as disconnected, close the session and wait `grace`.
    ///
    /// Best effort throughout: nothing here can fail the caller.
    pub async fn close(self, grace: Duration) {
        send_liveness(&self.liveness, Connectivity::Disconnected).await;
        if let Err(e) = self.sink.close().await {
            warn!("error closing sink session: {}", e);
        }
        tokio::time::sleep(grace).await;
        info!("disconnected from sink");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netprobe_sink::memory::{MemoryConnector, MemorySink};
    use netprobe_sink::QoS;
    use tokio::time::Instant;

    use crate::publish::liveness::liveness_sensor;
    use crate::publish::Node;

    const LIVENESS: &str = "homeassistant/binary_sensor/ha_net_probe_pi/ha_net_probe/state";

    fn manager(sink: &Arc<MemorySink>, failures: usize) -> ConnectionManager {
        let connector = MemoryConnector::new(sink.clone()).fail_first(failures);
        ConnectionManager::new(
            Box::new(connector),
            liveness_sensor(&Node::for_service("pi"), "test"),
            Backoff::default(),
        )
    }

    #[test]
    fn backoff_grows_linearly_up_to_cap() {
        let backoff = Backoff::default();
        let delays: Vec<u64> = (1..=7).map(|n| backoff.delay(n).as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 6, 8, 10, 10, 10]);
        assert_eq!(backoff.delay(0), Duration::ZERO);
    }

    #[test]
    fn last_will_registered_before_connecting() {
        let sink = Arc::new(MemorySink::new());
        let _manager = manager(&sink, 0);

        let will = sink.last_will().unwrap();
        assert_eq!(will.topic, LIVENESS);
        assert_eq!(will.payload, "OFF");
        assert_eq!(sink.connect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_until_connected() {
        let sink = Arc::new(MemorySink::new());
        let mut manager = manager(&sink, 6);

        let started = Instant::now();
        let _connection = manager.connect().await;

        assert_eq!(sink.connect_attempts(), 7);
        assert_eq!(started.elapsed(), Duration::from_secs(2 + 4 + 6 + 8 + 10 + 10));
    }

    #[tokio::test(start_paused = true)]
    async fn liveness_lifecycle() {
        let sink = Arc::new(MemorySink::new());
        let mut manager = manager(&sink, 0);

        let connection = manager.connect().await;
        connection.announce().await;
        let started = Instant::now();
        connection.close(SHUTDOWN_GRACE).await;

        assert_eq!(started.elapsed(), SHUTDOWN_GRACE);
        assert_eq!(sink.payloads(LIVENESS), vec!["ON", "OFF"]);
        assert!(sink.publications().iter().all(|p| p.qos == QoS::AtLeastOnce && p.retain));
        assert!(sink.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn close_tolerates_failing_publish() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_on("ha_net_probe/state");
        let mut manager = manager(&sink, 0);

        let connection = manager.connect().await;
        connection.close(Duration::ZERO).await;

        assert!(sink.is_closed());
        assert!(sink.publications().is_empty());
    }
}
