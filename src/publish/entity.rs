//! Discoverable sensor entities.
//!
//! Every entity owns two topics below
//! `homeassistant/<component>/<node>/<object>`: `config`, carrying the
//! retained discovery descriptor, and `state`, carrying its value.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use netprobe_sink::{QoS, Sink, SinkError};
use netprobe_types::APP_NAME;

const DISCOVERY_PREFIX: &str = "homeassistant";

/// Slug used in topics and unique ids.
///
/// Lowercase ASCII alphanumerics joined by `_`. Text that reduces to
/// nothing becomes `unknown`.
pub fn slugify(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let slug = slug::slugify(text).replace('-', "_");
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug
    }
}

/// The device all entities of one agent instance are grouped under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: String,
}

impl Node {
    /// Node of the agent running as service `service_id`.
    pub fn for_service(service_id: &str) -> Self {
        Self {
            id: format!("{}_{}", APP_NAME, service_id),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Device block of a discovery descriptor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub identifiers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
}

impl Device {
    fn bare(node: &Node) -> Self {
        Self {
            identifiers: node.id.clone(),
            name: None,
            manufacturer: None,
            model: None,
            sw_version: None,
        }
    }
}

/// Discovery descriptor published on the `config` topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discovery {
    pub name: String,
    pub force_update: bool,
    pub state_topic: String,
    pub unique_id: String,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<&'static str>,
}

/// One discoverable sensor bound to a session.
#[derive(Debug, Clone)]
pub struct SensorEntity {
    sink: Arc<dyn Sink>,
    component: &'static str,
    config_topic: String,
    state_topic: String,
    discovery: Discovery,
}

impl SensorEntity {
    /// Start building an entity of `component` named `object_id` on `node`.
    pub fn builder(
        component: &'static str,
        node: &Node,
        object_id: impl Into<String>,
    ) -> SensorEntityBuilder {
        SensorEntityBuilder::new(component, node, object_id.into())
    }

    pub fn config_topic(&self) -> &str {
        &self.config_topic
    }

    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Publish the discovery descriptor, retained.
    pub async fn send_configuration(&self) -> Result<(), SinkError> {
        let payload = serde_json::to_string(&self.discovery).map_err(|e| SinkError::Publish {
            topic: self.config_topic.clone(),
            reason: e.to_string(),
        })?;
        debug!(
            component = self.component,
            topic = %self.config_topic,
            "publish config: {}",
            payload
        );
        self.sink
            .publish(&self.config_topic, &payload, QoS::AtMostOnce, true)
            .await
    }

    /// Publish a state value, not retained.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn send_state(&self, payload: &str) {
        self.send_state_with(payload, QoS::AtMostOnce, false).await;
    }

    /// Publish a state value with explicit delivery options.
    pub async fn send_state_with(&self, payload: &str, qos: QoS, retain: bool) {
        debug!(component = self.component, topic = %self.state_topic, "publish state {}", payload);
        if let Err(e) = self.sink.publish(&self.state_topic, payload, qos, retain).await {
            warn!(
                component = self.component,
                topic = %self.state_topic,
                "error publishing state: {}",
                e
            );
        }
    }
}

/// Builder for [`SensorEntity`].
#[derive(Debug, Clone)]
pub struct SensorEntityBuilder {
    component: &'static str,
    config_topic: String,
    state_topic: String,
    discovery: Discovery,
}

impl SensorEntityBuilder {
    fn new(component: &'static str, node: &Node, object_id: String) -> Self {
        let base = format!(
            "{}/{}/{}/{}",
            DISCOVERY_PREFIX,
            component,
            slugify(&node.id),
            slugify(&object_id)
        );
        let state_topic = format!("{}/state", base);
        let discovery = Discovery {
            unique_id: slugify(&format!("{}_{}", node.id, object_id)),
            name: object_id,
            force_update: true,
            state_topic: state_topic.clone(),
            device: Device::bare(node),
            expire_after: None,
            icon: None,
            unit_of_measurement: None,
            state_class: None,
            device_class: None,
            entity_category: None,
        };
        Self {
            component,
            config_topic: format!("{}/config", base),
            state_topic,
            discovery,
        }
    }

    /// Topic the built entity will publish its state on.
    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    /// Expect an update at least every `interval`.
    ///
    /// Consumers mark the entity expired after `ceil(interval + 2)` seconds.
    pub fn update_interval(mut self, interval: Duration) -> Self {
        self.discovery.expire_after = Some((interval.as_secs_f64() + 2.0).ceil() as u64);
        self
    }

    pub fn icon(mut self, icon: &'static str) -> Self {
        self.discovery.icon = Some(icon);
        self
    }

    pub fn unit(mut self, unit: &'static str) -> Self {
        self.discovery.unit_of_measurement = Some(unit);
        self
    }

    pub fn state_class(mut self, class: &'static str) -> Self {
        self.discovery.state_class = Some(class);
        self
    }

    pub fn device_class(mut self, class: &'static str) -> Self {
        self.discovery.device_class = Some(class);
        self
    }

    pub fn entity_category(mut self, category: &'static str) -> Self {
        self.discovery.entity_category = Some(category);
        self
    }

    /// Replace the bare device block. The identifiers are kept.
    pub fn device(
        mut self,
        name: impl Into<String>,
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        sw_version: impl Into<String>,
    ) -> Self {
        self.discovery.device.name = Some(name.into());
        self.discovery.device.manufacturer = Some(manufacturer.into());
        self.discovery.device.model = Some(model.into());
        self.discovery.device.sw_version = Some(sw_version.into());
        self
    }

    pub fn build(self, sink: Arc<dyn Sink>) -> SensorEntity {
        SensorEntity {
            sink,
            component: self.component,
            config_topic: self.config_topic,
            state_topic: self.state_topic,
            discovery: self.discovery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netprobe_sink::memory::MemorySink;
    use netprobe_types::{component, icon, unit, DEVICE_CLASS_CONNECTIVITY};

    #[test]
    fn slugs() {
        assert_eq!(slugify("ha-net-probe_Home Server"), "ha_net_probe_home_server");
        assert_eq!(slugify("dns cloudflare average rtt"), "dns_cloudflare_average_rtt");
        assert_eq!(slugify("--!!"), "unknown");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn topics_and_unique_id() {
        let node = Node::for_service("pi");
        let sink = Arc::new(MemorySink::new());
        let entity = SensorEntity::builder(component::SENSOR, &node, "ping gw rtt")
            .update_interval(Duration::from_millis(1500))
            .icon(icon::TIMER)
            .unit(unit::MILLISECONDS)
            .build(sink);

        assert_eq!(node.id(), "ha-net-probe_pi");
        assert_eq!(
            entity.config_topic(),
            "homeassistant/sensor/ha_net_probe_pi/ping_gw_rtt/config"
        );
        assert_eq!(entity.state_topic(), "homeassistant/sensor/ha_net_probe_pi/ping_gw_rtt/state");
        assert_eq!(entity.discovery().unique_id, "ha_net_probe_pi_ping_gw_rtt");
        assert_eq!(entity.discovery().expire_after, Some(4));
    }

    #[tokio::test]
    async fn configuration_is_retained_json() {
        let node = Node::for_service("pi");
        let sink = Arc::new(MemorySink::new());
        let entity = SensorEntity::builder(component::BINARY_SENSOR, &node, "all connected wan")
            .update_interval(Duration::from_secs(1))
            .device_class(DEVICE_CLASS_CONNECTIVITY)
            .build(sink.clone());

        entity.send_configuration().await.unwrap();

        let published = sink.publications();
        assert_eq!(published.len(), 1);
        assert!(published[0].retain);
        let json: serde_json::Value = serde_json::from_str(&published[0].payload).unwrap();
        assert_eq!(json["name"], "all connected wan");
        assert_eq!(json["force_update"], true);
        assert_eq!(json["state_topic"], entity.state_topic());
        assert_eq!(json["device"]["identifiers"], "ha-net-probe_pi");
        assert_eq!(json["device_class"], "connectivity");
        assert_eq!(json["expire_after"], 3);
        assert!(json.get("icon").is_none());
        assert!(json["device"].get("manufacturer").is_none());
    }

    #[tokio::test]
    async fn state_failures_are_swallowed() {
        let node = Node::for_service("pi");
        let sink = Arc::new(MemorySink::new());
        sink.fail_on("rtt");
        let entity =
            SensorEntity::builder(component::SENSOR, &node, "ping gw rtt").build(sink.clone());

        entity.send_state("12.0").await;

        assert!(sink.publications().is_empty());
    }
}
