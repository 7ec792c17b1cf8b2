//! Agent configuration.
//!
//! Loaded from a YAML file with the `config` crate. Any key can be
//! overridden from the environment with the `NETPROBE` prefix and `__`
//! as separator, e.g. `NETPROBE__MQTT__HOST=broker.lan`.
//!
//! ```yaml
//! service:
//!   id: living-room
//!   log-level: INFO
//! mqtt:
//!   host: broker.lan
//! probes:
//!   dns:
//!     - name: quad9
//!       target-adr: 9.9.9.9
//!   ping:
//!     - name: gateway
//!       target-adr: 192.168.1.1
//!       interval: 2.0
//! compound:
//!   all-down:
//!     - name: internet
//!       probes:
//!         - { type: dns, name: quad9 }
//!         - { type: ping, name: gateway }
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use netprobe_drivers::dns::DEFAULT_QUERY_NAMES;
use netprobe_types::{ProbeId, ProbeKind};

use crate::engine::ProbeSettings;
use crate::error::ConfigError;
use crate::logging::LogLevel;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_SERVICE_NAME: &str = "Net probe service";
pub const DEFAULT_INTERVAL: f64 = 1.0;
pub const DEFAULT_TIMEOUT: f64 = 1.0;
pub const DEFAULT_HISTORY_LEN: usize = 100;
/// Largest accepted `history-len`, one day of samples at one per second.
pub const MAX_HISTORY_LEN: usize = 86_400;
pub const DEFAULT_PRECISION: usize = 1;
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

const ENV_PREFIX: &str = "NETPROBE";
const ENV_SEPARATOR: &str = "__";

/// Complete agent configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub probes: ProbesConfig,
    #[serde(default)]
    pub compound: CompoundConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceConfig {
    /// Distinguishes agent instances; defaults to the host name.
    #[serde(default = "default_service_id")]
    pub id: String,
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default, alias = "log_level")]
    pub log_level: LogLevel,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            id: default_service_id(),
            name: default_service_name(),
            log_level: LogLevel::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Tcp,
    Websockets,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub transport: Transport,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbesConfig {
    #[serde(default)]
    pub dns: Vec<DnsProbeConfig>,
    #[serde(default)]
    pub ping: Vec<PingProbeConfig>,
}

impl ProbesConfig {
    pub fn len(&self) -> usize {
        self.dns.len() + self.ping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identities and common settings of every configured probe.
    pub fn all(&self) -> impl Iterator<Item = (ProbeId, &CommonProbeConfig)> {
        let dns = self
            .dns
            .iter()
            .map(|p| (ProbeId::new(ProbeKind::Dns, &p.common.name), &p.common));
        let ping = self
            .ping
            .iter()
            .map(|p| (ProbeId::new(ProbeKind::Ping, &p.common.name), &p.common));
        dns.chain(ping)
    }
}

/// Settings shared by every probe kind.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CommonProbeConfig {
    pub name: String,
    #[serde(alias = "target_adr")]
    pub target_adr: String,
    /// Seconds between the starts of two actions.
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// Seconds to wait for a reply.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_history_len", alias = "history_len")]
    pub history_len: usize,
    /// Decimals of published values.
    #[serde(default = "default_precision", alias = "publish_precision")]
    pub publish_precision: usize,
}

impl CommonProbeConfig {
    pub fn interval(&self) -> Duration {
        seconds(self.interval, DEFAULT_INTERVAL)
    }

    pub fn timeout(&self) -> Duration {
        seconds(self.timeout, DEFAULT_TIMEOUT)
    }

    pub fn settings(&self) -> ProbeSettings {
        ProbeSettings {
            target: self.target_adr.clone(),
            interval: self.interval(),
            timeout: self.timeout(),
            history_len: self.history_len,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnsProbeConfig {
    #[serde(flatten)]
    pub common: CommonProbeConfig,
    #[serde(default = "default_query_names", alias = "query_names")]
    pub query_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PingProbeConfig {
    #[serde(flatten)]
    pub common: CommonProbeConfig,
    /// ICMP payload bytes, header excluded.
    #[serde(default = "default_payload_size", alias = "payload_size")]
    pub payload_size: usize,
    #[serde(default)]
    pub privileged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CompoundConfig {
    #[serde(default, alias = "all_down")]
    pub all_down: Vec<CompoundGroupConfig>,
}

/// A group reported connected while any member probe replies.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompoundGroupConfig {
    pub name: String,
    #[serde(default)]
    pub probes: Vec<ProbeRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProbeRef {
    #[serde(rename = "type")]
    pub kind: ProbeKind,
    pub name: String,
}

impl ProbeRef {
    pub fn id(&self) -> ProbeId {
        ProbeId::new(self.kind, &self.name)
    }
}

impl AgentConfig {
    /// Load and validate the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator(ENV_SEPARATOR))
            .build()?;
        Self::from_source(source)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let source = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?;
        Self::from_source(source)
    }

    fn from_source(source: Config) -> Result<Self, ConfigError> {
        let config: AgentConfig = source.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check the rules the schema alone cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.host.trim().is_empty() {
            return Err(invalid("mqtt.host must not be empty"));
        }

        let mut seen = HashSet::new();
        for (id, probe) in self.probes.all() {
            if !seen.insert(id.clone()) {
                return Err(invalid(format!(
                    "duplicate {} probe name '{}'",
                    id.kind, id.name
                )));
            }
            check_seconds(&id, "interval", probe.interval)?;
            check_seconds(&id, "timeout", probe.timeout)?;
            if probe.history_len == 0 {
                return Err(invalid(format!("{}: history-len must be at least 1", id)));
            }
            if probe.history_len > MAX_HISTORY_LEN {
                return Err(invalid(format!(
                    "{}: history-len must not exceed {}",
                    id, MAX_HISTORY_LEN
                )));
            }
        }
        if let Some(p) = self.probes.dns.iter().find(|p| p.query_names.is_empty()) {
            return Err(invalid(format!(
                "dns {}: query-names must not be empty",
                p.common.name
            )));
        }

        let mut groups = HashSet::new();
        for group in &self.compound.all_down {
            if !groups.insert(group.name.as_str()) {
                return Err(invalid(format!(
                    "duplicate compound name '{}'",
                    group.name
                )));
            }
            if group.probes.is_empty() {
                return Err(invalid(format!(
                    "compound '{}' has no probes",
                    group.name
                )));
            }
            if let Some(missing) = group.probes.iter().find(|r| !seen.contains(&r.id())) {
                return Err(invalid(format!(
                    "compound '{}' refers to unknown {} probe '{}'",
                    group.name, missing.kind, missing.name
                )));
            }
        }
        Ok(())
    }
}

fn check_seconds(id: &ProbeId, field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 && value < u32::MAX as f64 {
        Ok(())
    } else {
        Err(invalid(format!("{}: {} must be a positive number of seconds", id, field)))
    }
}

fn seconds(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| Duration::from_secs_f64(fallback))
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn default_service_id() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_interval() -> f64 {
    DEFAULT_INTERVAL
}

fn default_timeout() -> f64 {
    DEFAULT_TIMEOUT
}

fn default_history_len() -> usize {
    DEFAULT_HISTORY_LEN
}

fn default_precision() -> usize {
    DEFAULT_PRECISION
}

fn default_payload_size() -> usize {
    DEFAULT_PAYLOAD_SIZE
}

fn default_query_names() -> Vec<String> {
    DEFAULT_QUERY_NAMES.iter().map(|s| s.to_string()).collect()
}
