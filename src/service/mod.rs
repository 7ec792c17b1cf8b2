//! Service supervision.
//!
//! The [`Supervisor`] owns the agent's lifecycle:
//!
//! ```text
//!  Init ─▶ Configured ─▶ Connecting ─▶ Running ─▶ Stopping ─▶ Stopped
//!              ▲                          │
//!              └────────── reload ────────┘
//! ```
//!
//! Each configuration load starts a session task holding a child
//! [`CancellationToken`]. A reload cancels that token, waits for the session
//! to tear down and loads the configuration again. A terminate signal, or a
//! configuration that fails to load, stops the service.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use netprobe_drivers::dns::DnsDriver;
use netprobe_drivers::ping::PingDriver;
use netprobe_drivers::{DriverError, ProbeDriver};
use netprobe_sink::mqtt::{MqttConnector, MqttTransport};
use netprobe_sink::Connector;
use netprobe_types::{ProbeId, ProbeKind};

use crate::config::{AgentConfig, CommonProbeConfig, DnsProbeConfig, PingProbeConfig, Transport};
use crate::connection::Backoff;
use crate::error::{ConfigError, Result};
use crate::logging::LogHandle;
use crate::publish::Node;

mod session;
pub mod signals;

use session::Session;

/// Lifecycle state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Init,
    Configured,
    Connecting,
    Running,
    Stopping,
    Stopped,
}

/// Requests delivered to a running supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Tear everything down and exit.
    Terminate,
    /// Tear down the session, reload configuration and start over.
    Reload,
}

/// Configuration of one probe, by kind.
#[derive(Debug, Clone, Copy)]
pub enum ProbeConfig<'a> {
    Dns(&'a DnsProbeConfig),
    Ping(&'a PingProbeConfig),
}

impl<'a> ProbeConfig<'a> {
    pub fn kind(&self) -> ProbeKind {
        match self {
            ProbeConfig::Dns(_) => ProbeKind::Dns,
            ProbeConfig::Ping(_) => ProbeKind::Ping,
        }
    }

    pub fn common(&self) -> &'a CommonProbeConfig {
        match self {
            ProbeConfig::Dns(c) => &c.common,
            ProbeConfig::Ping(c) => &c.common,
        }
    }

    pub fn id(&self) -> ProbeId {
        ProbeId::new(self.kind(), &self.common().name)
    }
}

/// Loads (or reloads) the configuration.
pub type ConfigLoader = Box<dyn FnMut() -> std::result::Result<AgentConfig, ConfigError> + Send>;

/// Creates the sink connector for a configuration.
pub type ConnectorFactory = Box<dyn Fn(&AgentConfig) -> Box<dyn Connector> + Send + Sync>;

/// Creates the driver of a probe.
pub type DriverFactory = Arc<
    dyn Fn(ProbeConfig<'_>) -> std::result::Result<Arc<dyn ProbeDriver>, DriverError>
        + Send
        + Sync,
>;

/// MQTT connector for the broker named in `config`.
pub fn mqtt_connector(config: &AgentConfig) -> Box<dyn Connector> {
    let node = Node::for_service(&config.service.id);
    let transport = match config.mqtt.transport {
        Transport::Tcp => MqttTransport::Tcp,
        Transport::Websockets => MqttTransport::Websockets,
    };
    let mut builder = MqttConnector::builder()
        .host(&config.mqtt.host)
        .port(config.mqtt.port)
        .client_id(node.id())
        .transport(transport);
    if let Some(username) = &config.mqtt.username {
        builder = builder.credentials(username, config.mqtt.password.clone().unwrap_or_default());
    }
    Box::new(builder.build())
}

/// DNS or ICMP driver, as configured.
pub fn network_driver(
    probe: ProbeConfig<'_>,
) -> std::result::Result<Arc<dyn ProbeDriver>, DriverError> {
    match probe {
        ProbeConfig::Dns(config) => {
            let driver = DnsDriver::builder()
                .query_names(config.query_names.iter())
                .build()?;
            Ok(Arc::new(driver))
        }
        ProbeConfig::Ping(config) => {
            let driver = PingDriver::builder()
                .payload_size(config.payload_size)
                .privileged(config.privileged)
                .build();
            Ok(Arc::new(driver))
        }
    }
}

/// Runs sessions until told to stop.
pub struct Supervisor {
    loader: ConfigLoader,
    connectors: ConnectorFactory,
    drivers: DriverFactory,
    backoff: Backoff,
    log: LogHandle,
    state: Arc<watch::Sender<ServiceState>>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("backoff", &self.backoff)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::default()
    }

    /// Observe the lifecycle state.
    pub fn state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Run until a terminate signal arrives or the configuration fails.
    ///
    /// A closed signal channel counts as terminate.
    pub async fn run(mut self, mut signals: mpsc::Receiver<Signal>) -> Result<()> {
        let root = CancellationToken::new();
        let outcome = loop {
            let config = match (self.loader)() {
                Ok(config) => config,
                Err(e) => {
                    error!("{}", e);
                    break Err(e.into());
                }
            };
            self.log.apply(config.service.log_level);
            self.state.send_replace(ServiceState::Configured);
            info!(
                service = %config.service.id,
                probes = config.probes.len(),
                compounds = config.compound.all_down.len(),
                "configuration loaded"
            );

            let connector = (self.connectors)(&config);
            let session = match Session::build(&config, connector, &self.drivers, self.backoff) {
                Ok(session) => session,
                Err(e) => {
                    error!("{}", e);
                    break Err(e);
                }
            };

            let token = root.child_token();
            let mut task = tokio::spawn(session.run(token.clone(), self.state.clone()));

            let signal = tokio::select! {
                signal = signals.recv() => signal.unwrap_or(Signal::Terminate),
                joined = &mut task => {
                    // Sessions only end when cancelled.
                    if let Err(e) = joined {
                        error!("session ended abnormally: {}", e);
                        break Err(e.into());
                    }
                    Signal::Terminate
                }
            };

            match signal {
                Signal::Terminate => {
                    info!("terminate requested, stopping");
                    self.state.send_replace(ServiceState::Stopping);
                    root.cancel();
                    if let Err(e) = finish(task).await {
                        warn!("session teardown failed: {}", e);
                    }
                    break Ok(());
                }
                Signal::Reload => {
                    info!("reload requested, restarting session");
                    token.cancel();
                    if let Err(e) = finish(task).await {
                        warn!("session teardown failed: {}", e);
                    }
                }
            }
        };

        if outcome.is_err() {
            self.state.send_replace(ServiceState::Stopping);
        }
        self.state.send_replace(ServiceState::Stopped);
        info!("service stopped");
        outcome
    }
}

async fn finish(
    task: tokio::task::JoinHandle<()>,
) -> std::result::Result<(), tokio::task::JoinError> {
    if task.is_finished() {
        return Ok(());
    }
    task.await
}

/// Builder for [`Supervisor`].
pub struct SupervisorBuilder {
    loader: Option<ConfigLoader>,
    connectors: ConnectorFactory,
    drivers: DriverFactory,
    backoff: Backoff,
    log: LogHandle,
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self {
            loader: None,
            connectors: Box::new(mqtt_connector),
            drivers: Arc::new(network_driver),
            backoff: Backoff::default(),
            log: LogHandle::detached(),
        }
    }
}

impl SupervisorBuilder {
    /// Load the configuration from `path` on start and on every reload.
    pub fn config_path(self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.config_loader(move || AgentConfig::load(&path))
    }

    pub fn config_loader<F>(mut self, loader: F) -> Self
    where
        F: FnMut() -> std::result::Result<AgentConfig, ConfigError> + Send + 'static,
    {
        self.loader = Some(Box::new(loader));
        self
    }

    pub fn connector_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&AgentConfig) -> Box<dyn Connector> + Send + Sync + 'static,
    {
        self.connectors = Box::new(factory);
        self
    }

    pub fn driver_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(ProbeConfig<'_>) -> std::result::Result<Arc<dyn ProbeDriver>, DriverError>
            + Send
            + Sync
            + 'static,
    {
        self.drivers = Arc::new(factory);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn log_handle(mut self, log: LogHandle) -> Self {
        self.log = log;
        self
    }

    /// Build the supervisor. Without a configuration source it loads `probe.yaml`.
    pub fn build(self) -> Supervisor {
        let loader = match self.loader {
            Some(loader) => loader,
            None => Box::new(|| AgentConfig::load(std::path::Path::new("probe.yaml"))),
        };
        let (state, _) = watch::channel(ServiceState::Init);
        Supervisor {
            loader,
            connectors: self.connectors,
            drivers: self.drivers,
            backoff: self.backoff,
            log: self.log,
            state: Arc::new(state),
        }
    }
}
