//! # netprobe
//!
//! A network health agent. It runs DNS and ICMP echo probes against
//! configured targets, keeps a short history per probe and publishes the
//! results as Home Assistant MQTT discovery sensors.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           Supervisor                             │
//! │   config ──▶ session ──▶ ConnectionManager ──▶ Sink (MQTT)       │
//! │                 │                                  ▲             │
//! │                 ▼                                  │             │
//! │   ┌────────────────────────┐    ┌──────────────────┴──────────┐  │
//! │   │ run_probe (per probe)  │───▶│ ProbePublisher (8 channels) │  │
//! │   │  ProbeEngine + History │    │ CompoundPublisher (groups)  │  │
//! │   └───────────┬────────────┘    └─────────────────────────────┘  │
//! │               ▼                                                  │
//! │          ProbeDriver ◀── DnsDriver | PingDriver                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`engine`]**: pacing, execution and bounded history of one probe
//! - **[`publish`]**: discovery entities, per-probe channels and compound groups
//! - **[`connection`]**: connect with backoff, last will and liveness
//! - **[`service`]**: session lifecycle, reload and shutdown
//! - **[`config`]** / **[`logging`]**: ambient setup
//!
//! Everything runs on a single-threaded runtime. A probe's state is only
//! ever mutated by its own task; other tasks see its latest measurement
//! through a watch channel.
//!
//! ## Usage
//!
//! ```bash
//! # Run with ./probe.yaml
//! netprobe
//!
//! # Explicit configuration; send SIGHUP to reload it
//! netprobe /etc/netprobe/probe.yaml
//! ```
//!
//! ### As a library
//!
//! ```rust,no_run
//! use netprobe::service::{signals, Supervisor};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let supervisor = Supervisor::builder().config_path("probe.yaml").build();
//! supervisor.run(signals::listen()?).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod logging;
pub mod publish;
pub mod service;

pub use crate::config::AgentConfig;
pub use crate::error::{ConfigError, Error, Result};
pub use crate::service::{ServiceState, Signal, Supervisor};

/// Agent version, reported in the liveness sensor.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
