//! The per-probe task.

use std::sync::Arc;

use futures_util::future::{join, join_all};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::ProbeEngine;
use crate::publish::{CompoundPublisher, ProbePublisher};

/// Drive `engine` until `token` is cancelled.
///
/// Each cycle executes the probe, then publishes its own channels and
/// republishes every aggregator it belongs to. Own channels are issued
/// first; both sets then complete concurrently. Cancellation interrupts a
/// pending action, wait or publish without recording anything further.
pub async fn run_probe(
    mut engine: ProbeEngine,
    publisher: ProbePublisher,
    aggregators: Vec<Arc<CompoundPublisher>>,
    token: CancellationToken,
) -> ProbeEngine {
    debug!(probe = %engine.id(), aggregators = aggregators.len(), "probe started");
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = engine.execute() => {}
        }

        let own = publisher.publish(&engine);
        let groups = join_all(aggregators.iter().map(|a| a.publish()));
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = join(own, groups) => {}
        }
    }
    debug!(probe = %engine.id(), total = engine.state().total_count, "probe cancelled");
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use netprobe_sink::memory::MemorySink;
    use netprobe_types::{Measurement, ProbeId, ProbeKind};

    use crate::engine::testing::ScriptedDriver;
    use crate::engine::ProbeSettings;
    use crate::publish::{Member, Node};

    const CONNECTIVITY: &str = "homeassistant/binary_sensor/ha_net_probe_pi/ping_gw_connectivity/state";
    const GROUP: &str = "homeassistant/binary_sensor/ha_net_probe_pi/all_connected_wan/state";

    fn engine(driver: ScriptedDriver) -> ProbeEngine {
        named_engine("gw", driver)
    }

    fn named_engine(name: &str, driver: ScriptedDriver) -> ProbeEngine {
        ProbeEngine::new(
            ProbeId::new(ProbeKind::Ping, name),
            ProbeSettings {
                target: "192.0.2.1".into(),
                interval: Duration::from_secs(1),
                timeout: Duration::from_millis(500),
                history_len: 10,
            },
            Arc::new(driver),
        )
    }

    fn publisher(sink: &Arc<MemorySink>) -> ProbePublisher {
        named_publisher("gw", sink)
    }

    fn named_publisher(name: &str, sink: &Arc<MemorySink>) -> ProbePublisher {
        ProbePublisher::new(
            ProbeId::new(ProbeKind::Ping, name),
            Duration::from_secs(1),
            1,
            &Node::for_service("pi"),
            sink.clone(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_every_cycle_until_cancelled() {
        let sink = Arc::new(MemorySink::new());
        let engine = engine(ScriptedDriver::steady(Measurement::reply(
            Duration::from_millis(8),
            64,
            64,
        )));
        let member = Member {
            id: engine.id().clone(),
            current: engine.subscribe(),
        };
        let group = Arc::new(CompoundPublisher::new(
            "wan",
            vec![member],
            Duration::from_secs(1),
            &Node::for_service("pi"),
            sink.clone(),
        ));
        let token = CancellationToken::new();

        let task = tokio::spawn(run_probe(engine, publisher(&sink), vec![group], token.clone()));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        token.cancel();
        let engine = task.await.unwrap();

        assert_eq!(engine.state().total_count, 3);
        assert_eq!(sink.payloads(CONNECTIVITY), vec!["ON", "ON", "ON"]);
        assert_eq!(sink.payloads(GROUP), vec!["ON", "ON", "ON"]);

        // Own channels go out before the group state of the same cycle.
        let topics: Vec<_> = sink.publications().into_iter().map(|p| p.topic).collect();
        let first_group = topics.iter().position(|t| t == GROUP).unwrap();
        let first_own = topics.iter().position(|t| t == CONNECTIVITY).unwrap();
        assert!(first_own < first_group);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_channel_does_not_stop_the_loop() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_on("connectivity");
        let engine = engine(ScriptedDriver::steady(Measurement::reply(
            Duration::from_millis(8),
            64,
            64,
        )));
        let token = CancellationToken::new();

        let task = tokio::spawn(run_probe(engine, publisher(&sink), Vec::new(), token.clone()));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        token.cancel();
        let engine = task.await.unwrap();

        assert_eq!(engine.state().total_count, 2);
        assert!(sink.payloads(CONNECTIVITY).is_empty());
        assert_eq!(
            sink.payloads("homeassistant/sensor/ha_net_probe_pi/ping_gw_bytes_sent/state"),
            vec!["64", "128"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failing_statistic_spares_siblings_and_other_probes() {
        let sink = Arc::new(MemorySink::new());
        sink.fail_on("ping_gw_average_rtt");
        let reply = Measurement::reply(Duration::from_millis(8), 64, 64);
        let token = CancellationToken::new();

        let gw = tokio::spawn(run_probe(
            named_engine("gw", ScriptedDriver::steady(reply)),
            named_publisher("gw", &sink),
            Vec::new(),
            token.clone(),
        ));
        let isp = tokio::spawn(run_probe(
            named_engine("isp", ScriptedDriver::steady(reply)),
            named_publisher("isp", &sink),
            Vec::new(),
            token.clone(),
        ));
        // Five cycles; statistics are due from the fourth sample on.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        token.cancel();
        assert_eq!(gw.await.unwrap().state().total_count, 5);
        assert_eq!(isp.await.unwrap().state().total_count, 5);

        let sensor =
            |object: &str| format!("homeassistant/sensor/ha_net_probe_pi/{}/state", object);
        assert!(sink.payloads(&sensor("ping_gw_average_rtt")).is_empty());
        assert_eq!(sink.payloads(&sensor("ping_gw_average_loss")), vec!["0.0", "0.0"]);
        assert_eq!(sink.payloads(&sensor("ping_gw_jitter")), vec!["0.0", "0.0"]);
        assert_eq!(
            sink.payloads(&sensor("ping_gw_bytes_sent")),
            vec!["64", "128", "192", "256", "320"]
        );
        assert_eq!(sink.payloads(&sensor("ping_isp_average_rtt")), vec!["8.0", "8.0"]);
        assert_eq!(sink.payloads(&sensor("ping_isp_bytes_sent")).len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_action_leaves_no_entry() {
        let sink = Arc::new(MemorySink::new());
        let driver = ScriptedDriver::new([]).with_delay(Duration::from_millis(300));
        let engine = engine(driver);
        let token = CancellationToken::new();

        let task = tokio::spawn(run_probe(engine, publisher(&sink), Vec::new(), token.clone()));
        tokio::time::sleep(Duration::from_millis(1100)).await;
        token.cancel();
        let engine = task.await.unwrap();

        // Second action started at 1000ms and was interrupted at 1100ms.
        assert_eq!(engine.state().total_count, 1);
        assert_eq!(sink.payloads(CONNECTIVITY), vec!["OFF"]);
    }

    #[tokio::test]
    async fn already_cancelled_token_runs_nothing() {
        let sink = Arc::new(MemorySink::new());
        let token = CancellationToken::new();
        token.cancel();

        let engine = run_probe(
            engine(ScriptedDriver::new([])),
            publisher(&sink),
            Vec::new(),
            token,
        )
        .await;

        assert_eq!(engine.state().total_count, 0);
        assert!(sink.publications().is_empty());
    }
}
