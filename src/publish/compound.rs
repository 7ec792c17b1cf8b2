//! Connectivity aggregated over a group of probes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use netprobe_sink::{Sink, SinkError};
use netprobe_types::{component, Connectivity, Measurement, ProbeId, DEVICE_CLASS_CONNECTIVITY};

use super::entity::{Node, SensorEntity};

/// Live view on one member probe.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: ProbeId,
    pub current: watch::Receiver<Option<Measurement>>,
}

impl Member {
    fn is_up(&self) -> bool {
        self.current.borrow().is_some()
    }
}

/// Publishes "all connected <name>": connected while any member holds a
/// current measurement, disconnected only when all of them are empty.
///
/// Holds no history of its own; the state is derived from the members'
/// current measurements each time it is published.
#[derive(Debug)]
pub struct CompoundPublisher {
    name: String,
    members: Vec<Member>,
    entity: SensorEntity,
}

impl CompoundPublisher {
    /// `interval` is the shortest update interval among the members.
    pub fn new(
        name: impl Into<String>,
        members: Vec<Member>,
        interval: Duration,
        node: &Node,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let name = name.into();
        let entity = SensorEntity::builder(
            component::BINARY_SENSOR,
            node,
            format!("all connected {}", name),
        )
        .device_class(DEVICE_CLASS_CONNECTIVITY)
        .update_interval(interval)
        .build(sink);
        Self {
            name,
            members,
            entity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> impl Iterator<Item = &ProbeId> {
        self.members.iter().map(|m| &m.id)
    }

    pub fn entity(&self) -> &SensorEntity {
        &self.entity
    }

    /// Current aggregated state.
    pub fn state(&self) -> Connectivity {
        Connectivity::from_up(self.members.iter().any(Member::is_up))
    }

    pub async fn send_configuration(&self) -> Result<(), SinkError> {
        self.entity.send_configuration().await
    }

    /// Recompute the state and publish it. Failures are logged only.
    pub async fn publish(&self) {
        let state = self.state();
        self.entity.send_state(state.as_payload()).await;
    }
}
