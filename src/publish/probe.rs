//! Per-probe sensor channels.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tracing::{debug, warn};

use netprobe_sink::Sink;
use netprobe_types::{
    component, icon, state_class, unit, Connectivity, ProbeId, ProbeState, SensorCode,
    DEVICE_CLASS_CONNECTIVITY, ENTITY_CATEGORY_DIAGNOSTIC,
};

use super::entity::{Node, SensorEntity, SensorEntityBuilder};
use super::value;
use crate::engine::{History, ProbeEngine};

/// History fill factor, in percent, required before statistics are published.
pub const REQUIRED_HISTORY_FILL: f64 = 40.0;

/// Publishes the eight channels of one probe.
#[derive(Debug)]
pub struct ProbePublisher {
    id: ProbeId,
    precision: usize,
    sensors: Vec<(SensorCode, SensorEntity)>,
}

impl ProbePublisher {
    pub fn new(
        id: ProbeId,
        interval: Duration,
        precision: usize,
        node: &Node,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let sensors = SensorCode::ALL
            .into_iter()
            .map(|code| {
                let object_id = format!("{} {}", id, code);
                let entity = channel(code, node, object_id)
                    .update_interval(interval)
                    .build(sink.clone());
                (code, entity)
            })
            .collect();
        Self {
            id,
            precision,
            sensors,
        }
    }

    pub fn id(&self) -> &ProbeId {
        &self.id
    }

    pub fn entities(&self) -> impl Iterator<Item = &SensorEntity> {
        self.sensors.iter().map(|(_, entity)| entity)
    }

    /// Publish every discovery descriptor concurrently.
    ///
    /// Returns the number of descriptors that failed to publish.
    pub async fn send_configuration(&self) -> usize {
        let results = join_all(self.entities().map(|e| e.send_configuration())).await;
        results
            .into_iter()
            .zip(self.entities())
            .filter_map(|(result, entity)| result.err().map(|e| (entity, e)))
            .inspect(|(entity, e)| {
                warn!(
                    probe = %self.id,
                    topic = entity.config_topic(),
                    "error publishing config: {}",
                    e
                )
            })
            .count()
    }

    /// Publish the state of the current cycle.
    ///
    /// Every channel is published concurrently; a failing channel does not
    /// hold back its siblings.
    pub async fn publish(&self, engine: &ProbeEngine) {
        let states = self.states(engine.state(), engine.history());
        let updates = self.sensors.iter().filter_map(|(code, entity)| {
            states
                .iter()
                .find(|(c, _)| c == code)
                .map(|(_, payload)| entity.send_state(payload))
        });
        join_all(updates).await;
    }

    /// Payloads due for this cycle.
    ///
    /// Round-trip time and connectivity are due every cycle. Statistics are
    /// only due once the history is filled enough.
    pub fn states(&self, state: &ProbeState, history: &History) -> Vec<(SensorCode, String)> {
        let mut states = Vec::with_capacity(SensorCode::ALL.len());
        let current_rtt = state.current.and_then(|m| m.rtt);

        states.push((SensorCode::Rtt, value::millis(current_rtt, self.precision)));
        states.push((
            SensorCode::Connectivity,
            Connectivity::from_up(state.is_up()).as_payload().to_string(),
        ));

        let fill = history.fill_factor();
        if fill >= REQUIRED_HISTORY_FILL {
            let average = history.average();
            let jitter = history.jitter();
            states.push((SensorCode::RttAverage, value::millis(average, self.precision)));
            states.push((
                SensorCode::AverageLoss,
                value::numeric(history.loss_percent(), self.precision),
            ));
            states.push((SensorCode::Jitter, value::millis(jitter, self.precision)));
            states.push((
                SensorCode::JitterGrade,
                value::numeric(value::jitter_grade(jitter, average), self.precision),
            ));
        } else {
            debug!(
                probe = %self.id,
                "history fill factor of {:.1}% is below threshold of {}%, skip publishing statistics",
                fill,
                REQUIRED_HISTORY_FILL
            );
        }

        states.push((SensorCode::BytesSent, state.bytes_sent_total.to_string()));
        states.push((SensorCode::BytesReceived, state.bytes_received_total.to_string()));
        states
    }
}

fn channel(code: SensorCode, node: &Node, object_id: String) -> SensorEntityBuilder {
    let kind = match code {
        SensorCode::Connectivity => component::BINARY_SENSOR,
        _ => component::SENSOR,
    };
    let sensor = SensorEntity::builder(kind, node, object_id);
    match code {
        SensorCode::Rtt | SensorCode::RttAverage | SensorCode::Jitter => sensor
            .icon(icon::TIMER)
            .unit(unit::MILLISECONDS)
            .state_class(state_class::MEASUREMENT),
        SensorCode::AverageLoss => sensor
            .icon(icon::PACKET_LOSS)
            .unit(unit::PERCENTAGE)
            .state_class(state_class::MEASUREMENT),
        SensorCode::JitterGrade => sensor
            .unit(unit::PERCENTAGE)
            .state_class(state_class::MEASUREMENT),
        SensorCode::Connectivity => sensor.device_class(DEVICE_CLASS_CONNECTIVITY),
        SensorCode::BytesSent => sensor
            .icon(icon::NETWORK_UPLOAD)
            .entity_category(ENTITY_CATEGORY_DIAGNOSTIC)
            .unit(unit::BYTES)
            .state_class(state_class::TOTAL_INCREASING),
        SensorCode::BytesReceived => sensor
            .icon(icon::NETWORK_DOWNLOAD)
            .entity_category(ENTITY_CATEGORY_DIAGNOSTIC)
            .unit(unit::BYTES)
            .state_class(state_class::TOTAL_INCREASING),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netprobe_sink::memory::MemorySink;
    use netprobe_types::{Measurement, ProbeKind};

    const AVERAGE_TOPIC: &str = "homeassistant/sensor/ha_net_probe_pi/dns_quad9_average_rtt/state";
    const CONNECTIVITY_TOPIC: &str =
        "homeassistant/binary_sensor/ha_net_probe_pi/dns_quad9_connectivity/state";

    fn publisher(sink: Arc<MemorySink>) -> ProbePublisher {
        ProbePublisher::new(
            ProbeId::new(ProbeKind::Dns, "quad9"),
            Duration::from_secs(1),
            1,
            &Node::for_service("pi"),
            sink,
        )
    }

    fn record(state: &mut ProbeState, history: &mut History, m: Measurement) {
        history.push(m.rtt);
        state.record(m);
    }

    fn codes(states: &[(SensorCode, String)]) -> Vec<SensorCode> {
        states.iter().map(|(c, _)| *c).collect()
    }

    fn payload(states: &[(SensorCode, String)], code: SensorCode) -> Option<&str> {
        states.iter().find(|(c, _)| *c == code).map(|(_, p)| p.as_str())
    }

    #[test]
    fn creates_one_channel_per_code() {
        let publisher = publisher(Arc::new(MemorySink::new()));
        let topics: Vec<_> = publisher.entities().map(|e| e.state_topic()).collect();
        assert_eq!(topics.len(), 8);
        assert!(topics.contains(&AVERAGE_TOPIC));
        assert!(topics.contains(&CONNECTIVITY_TOPIC));
    }

    #[test]
    fn statistics_wait_for_fill_factor() {
        let publisher = publisher(Arc::new(MemorySink::new()));
        let mut state = ProbeState::default();
        let mut history = History::new(100);

        for _ in 0..30 {
            record(&mut state, &mut history, Measurement::reply(Duration::from_millis(10), 30, 60));
        }
        let states = publisher.states(&state, &history);
        assert_eq!(
            codes(&states),
            vec![
                SensorCode::Rtt,
                SensorCode::Connectivity,
                SensorCode::BytesSent,
                SensorCode::BytesReceived
            ]
        );

        for _ in 0..10 {
            record(&mut state, &mut history, Measurement::reply(Duration::from_millis(10), 30, 60));
        }
        let states = publisher.states(&state, &history);
        assert_eq!(states.len(), 8);
        assert_eq!(payload(&states, SensorCode::RttAverage), Some("10.0"));
        assert_eq!(payload(&states, SensorCode::AverageLoss), Some("0.0"));
        assert_eq!(payload(&states, SensorCode::Jitter), Some("0.0"));
        assert_eq!(payload(&states, SensorCode::JitterGrade), Some("0.0"));
        assert_eq!(payload(&states, SensorCode::BytesSent), Some("1200"));
        assert_eq!(payload(&states, SensorCode::BytesReceived), Some("2400"));
    }

    #[test]
    fn lost_sample_reports_unavailable_rtt_and_down() {
        let publisher = publisher(Arc::new(MemorySink::new()));
        let mut state = ProbeState::default();
        let mut history = History::new(2);
        record(&mut state, &mut history, Measurement::lost(30));
        record(&mut state, &mut history, Measurement::lost(30));

        let states = publisher.states(&state, &history);

        assert_eq!(payload(&states, SensorCode::Rtt), Some("unavailable"));
        assert_eq!(payload(&states, SensorCode::Connectivity), Some("OFF"));
        assert_eq!(payload(&states, SensorCode::RttAverage), Some("unavailable"));
        assert_eq!(payload(&states, SensorCode::AverageLoss), Some("100.0"));
        assert_eq!(payload(&states, SensorCode::Jitter), Some("unavailable"));
        assert_eq!(payload(&states, SensorCode::JitterGrade), Some("unavailable"));
    }

    #[test]
    fn single_lost_cycle_still_publishes_rtt() {
        let publisher = publisher(Arc::new(MemorySink::new()));
        let mut state = ProbeState::default();
        let mut history = History::new(100);
        record(&mut state, &mut history, Measurement::lost(30));

        let states = publisher.states(&state, &history);

        assert_eq!(
            codes(&states),
            vec![
                SensorCode::Rtt,
                SensorCode::Connectivity,
                SensorCode::BytesSent,
                SensorCode::BytesReceived
            ]
        );
        assert_eq!(payload(&states, SensorCode::Rtt), Some("unavailable"));
        assert_eq!(payload(&states, SensorCode::BytesSent), Some("30"));
    }

    #[test]
    fn jitter_grade_relates_jitter_to_average() {
        let publisher = publisher(Arc::new(MemorySink::new()));
        let mut state = ProbeState::default();
        let mut history = History::new(3);
        for ms in [10, 20, 30] {
            record(&mut state, &mut history, Measurement::reply(Duration::from_millis(ms), 1, 1));
        }

        let states = publisher.states(&state, &history);

        assert_eq!(payload(&states, SensorCode::Rtt), Some("30.0"));
        assert_eq!(payload(&states, SensorCode::RttAverage), Some("20.0"));
        assert_eq!(payload(&states, SensorCode::Jitter), Some("10.0"));
        assert_eq!(payload(&states, SensorCode::JitterGrade), Some("50.0"));
    }

    #[tokio::test]
    async fn configuration_failures_are_counted_per_channel() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_on("average_rtt/config");
        let publisher = publisher(sink.clone());

        let failed = publisher.send_configuration().await;

        assert_eq!(failed, 1);
        assert_eq!(sink.publications().len(), 7);
    }
}
