//! One probe: pacing, action, and the state it accumulates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, warn};

use netprobe_drivers::{DriverError, ProbeDriver};
use netprobe_types::{Measurement, ProbeId, ProbeState};

use super::History;

/// Extra time granted to a driver beyond its own timeout before the
/// action is abandoned.
const ACTION_GRACE: Duration = Duration::from_secs(1);

/// Static parameters of a probe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSettings {
    pub target: String,
    /// Minimum time between the starts of two consecutive actions.
    pub interval: Duration,
    /// Time the driver waits for a reply.
    pub timeout: Duration,
    pub history_len: usize,
}

/// Paces and executes one probe and owns everything it records.
///
/// The engine is the only writer of its [`ProbeState`] and [`History`].
/// Other tasks observe the current measurement through a
/// [`watch::Receiver`] obtained from [`subscribe`](Self::subscribe).
#[derive(Debug)]
pub struct ProbeEngine {
    id: ProbeId,
    settings: ProbeSettings,
    driver: Arc<dyn ProbeDriver>,
    state: ProbeState,
    history: History,
    last_start: Option<Instant>,
    current: watch::Sender<Option<Measurement>>,
}

impl ProbeEngine {
    pub fn new(id: ProbeId, settings: ProbeSettings, driver: Arc<dyn ProbeDriver>) -> Self {
        let history = History::new(settings.history_len);
        let (current, _) = watch::channel(None);
        Self {
            id,
            settings,
            driver,
            state: ProbeState::default(),
            history,
            last_start: None,
            current,
        }
    }

    pub fn id(&self) -> &ProbeId {
        &self.id
    }

    pub fn settings(&self) -> &ProbeSettings {
        &self.settings
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Watch the most recent measurement of this probe.
    pub fn subscribe(&self) -> watch::Receiver<Option<Measurement>> {
        self.current.subscribe()
    }

    /// Run one cycle: wait out the interval, perform the action, record it.
    ///
    /// The interval is measured from the start of the previous call. When a
    /// cycle overran it, the next action starts right away.
    ///
    /// Cancel-safe: dropping the returned future before it completes leaves
    /// state and history untouched.
    pub async fn execute(&mut self) -> Measurement {
        if let Some(last) = self.last_start {
            sleep_until(last + self.settings.interval).await;
        }
        self.last_start = Some(Instant::now());

        let measurement = self.act().await;
        self.record(measurement);
        measurement
    }

    async fn act(&self) -> Measurement {
        let limit = self.settings.timeout + ACTION_GRACE;
        let outcome = timeout(
            limit,
            self.driver.perform(&self.settings.target, self.settings.timeout),
        )
        .await;

        match outcome {
            Ok(Ok(measurement)) => measurement,
            Ok(Err(err @ (DriverError::Timeout | DriverError::Unreachable(_)))) => {
                debug!(probe = %self.id, target = %self.settings.target, "no reply: {}", err);
                Measurement::failed()
            }
            Ok(Err(err)) => {
                warn!(
                    probe = %self.id,
                    target = %self.settings.target,
                    "probe action failed: {}",
                    err
                );
                Measurement::failed()
            }
            Err(_) => {
                warn!(
                    probe = %self.id,
                    target = %self.settings.target,
                    "probe action abandoned after {:.1} sec",
                    limit.as_secs_f64()
                );
                Measurement::failed()
            }
        }
    }

    fn record(&mut self, measurement: Measurement) {
        self.history.push(measurement.rtt);
        self.state.record(measurement);
        self.current.send_replace(Some(measurement));
    }
}
