//! The agent's own liveness sensor.
//!
//! `ON` while a session is up. The sink itself reports `OFF` through the
//! last will if the session dies, and the agent publishes `OFF` on a clean
//! shutdown.

use netprobe_sink::{LastWill, QoS};
use netprobe_types::{
    component, Connectivity, APP_NAME, DEVICE_CLASS_CONNECTIVITY, ENTITY_CATEGORY_DIAGNOSTIC,
};

use super::entity::{Node, SensorEntity, SensorEntityBuilder};

/// Liveness states are delivered at least once and retained.
pub const LIVENESS_QOS: QoS = QoS::AtLeastOnce;

/// Builder for the liveness entity of `node`, advertised under `service_name`.
pub fn liveness_sensor(node: &Node, service_name: &str) -> SensorEntityBuilder {
    SensorEntity::builder(component::BINARY_SENSOR, node, APP_NAME)
        .device_class(DEVICE_CLASS_CONNECTIVITY)
        .entity_category(ENTITY_CATEGORY_DIAGNOSTIC)
        .device(
            service_name,
            env!("CARGO_PKG_AUTHORS"),
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
}

/// Last will reporting the agent as disconnected on `state_topic`.
pub fn last_will(state_topic: &str) -> LastWill {
    LastWill::new(
        state_topic,
        Connectivity::Disconnected.as_payload(),
        LIVENESS_QOS,
        true,
    )
}

/// Publish a liveness state.
pub async fn send_liveness(entity: &SensorEntity, state: Connectivity) {
    entity
        .send_state_with(state.as_payload(), LIVENESS_QOS, true)
        .await;
}
