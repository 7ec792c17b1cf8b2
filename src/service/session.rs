//! One connected session: everything between a (re)load and its teardown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use netprobe_sink::{Connector, Sink};
use netprobe_types::ProbeId;

use super::{DriverFactory, ProbeConfig, ServiceState};
use crate::config::{AgentConfig, CompoundGroupConfig};
use crate::connection::{Backoff, Connection, ConnectionManager, SHUTDOWN_GRACE};
use crate::engine::{run_probe, ProbeEngine};
use crate::error::{Error, Result};
use crate::publish::liveness::liveness_sensor;
use crate::publish::{AggregatorIndex, CompoundPublisher, Member, Node, ProbePublisher};

struct ProbeSlot {
    engine: ProbeEngine,
    precision: usize,
}

/// Probes and groups built from one configuration, ready to connect.
pub(crate) struct Session {
    node: Node,
    probes: Vec<ProbeSlot>,
    groups: Vec<CompoundGroupConfig>,
    manager: ConnectionManager,
    grace: Duration,
}

impl Session {
    /// Build the probes of `config`. Fails if a driver cannot be set up.
    pub(crate) fn build(
        config: &AgentConfig,
        connector: Box<dyn Connector>,
        drivers: &DriverFactory,
        backoff: Backoff,
    ) -> Result<Self> {
        let node = Node::for_service(&config.service.id);

        let configured = config
            .probes
            .dns
            .iter()
            .map(ProbeConfig::Dns)
            .chain(config.probes.ping.iter().map(ProbeConfig::Ping));

        let mut probes = Vec::with_capacity(config.probes.len());
        for probe in configured {
            let id = probe.id();
            let common = probe.common();
            let driver = drivers(probe).map_err(|source| Error::Probe {
                probe: id.to_string(),
                source,
            })?;
            probes.push(ProbeSlot {
                engine: ProbeEngine::new(id, common.settings(), driver),
                precision: common.publish_precision,
            });
        }

        let liveness = liveness_sensor(&node, &config.service.name);
        Ok(Self {
            node,
            probes,
            groups: config.compound.all_down.clone(),
            manager: ConnectionManager::new(connector, liveness, backoff),
            grace: SHUTDOWN_GRACE,
        })
    }

    /// Connect, announce and run every probe until `token` is cancelled.
    pub(crate) async fn run(
        mut self,
        token: CancellationToken,
        state: Arc<watch::Sender<ServiceState>>,
    ) {
        state.send_replace(ServiceState::Connecting);
        let connection = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("session cancelled while connecting");
                return;
            }
            connection = self.manager.connect() => connection,
        };

        let sink = connection.sink();
        let publishers: Vec<ProbePublisher> = self
            .probes
            .iter()
            .map(|slot| {
                ProbePublisher::new(
                    slot.engine.id().clone(),
                    slot.engine.settings().interval,
                    slot.precision,
                    &self.node,
                    sink.clone(),
                )
            })
            .collect();
        let aggregators = self.aggregators(&sink);
        let index = AggregatorIndex::build(&aggregators);

        let discovery = send_discovery(&connection, &publishers, &aggregators);
        let discovered = tokio::select! {
            biased;
            _ = token.cancelled() => false,
            _ = discovery => true,
        };
        if !discovered {
            connection.close(self.grace).await;
            return;
        }

        let mut tasks = JoinSet::new();
        let names: Vec<String> = self.probes.iter().map(|s| s.engine.id().to_string()).collect();
        for (slot, publisher) in self.probes.into_iter().zip(publishers) {
            let groups = index.for_probe(slot.engine.id()).to_vec();
            tasks.spawn(run_probe(slot.engine, publisher, groups, token.clone()));
        }
        state.send_replace(ServiceState::Running);
        if names.is_empty() {
            info!("no probes configured, idle until signalled");
        } else {
            info!("{} probe(s) started: {:?}", names.len(), names);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {}
            _ = connection.announce() => token.cancelled().await,
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("probe task ended abnormally: {}", e);
            }
        }
        debug!("all probe tasks stopped");
        connection.close(self.grace).await;
    }

    fn aggregators(&self, sink: &Arc<dyn Sink>) -> Vec<Arc<CompoundPublisher>> {
        self.groups
            .iter()
            .map(|group| {
                let mut interval: Option<Duration> = None;
                let mut members = Vec::with_capacity(group.probes.len());
                for reference in &group.probes {
                    let id = reference.id();
                    if let Some(slot) = self.slot(&id) {
                        let probe_interval = slot.engine.settings().interval;
                        interval = Some(interval.map_or(probe_interval, |i| i.min(probe_interval)));
                        members.push(Member {
                            id,
                            current: slot.engine.subscribe(),
                        });
                    }
                }
                Arc::new(CompoundPublisher::new(
                    group.name.clone(),
                    members,
                    interval.unwrap_or(Duration::from_secs(1)),
                    &self.node,
                    sink.clone(),
                ))
            })
            .collect()
    }

    fn slot(&self, id: &ProbeId) -> Option<&ProbeSlot> {
        self.probes.iter().find(|slot| slot.engine.id() == id)
    }
}

/// Publish every discovery descriptor of the session concurrently.
async fn send_discovery(
    connection: &Connection,
    publishers: &[ProbePublisher],
    aggregators: &[Arc<CompoundPublisher>],
) {
    let probes = join_all(publishers.iter().map(|p| p.send_configuration()));
    let groups = join_all(aggregators.iter().map(|a| async move {
        if let Err(e) = a.send_configuration().await {
            warn!(compound = a.name(), "error publishing config: {}", e);
        }
    }));
    let (failures, _, _) = tokio::join!(probes, groups, connection.send_configuration());
    let failed: usize = failures.into_iter().sum();
    if failed > 0 {
        warn!("{} discovery descriptor(s) could not be published", failed);
    }
}
