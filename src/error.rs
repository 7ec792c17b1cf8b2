//! Error types of the agent.

use thiserror::Error;

use netprobe_drivers::DriverError;

/// Configuration could not be loaded or is inconsistent.
///
/// Always fatal: the agent stops instead of running a partial setup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or deserializing the configuration failed.
    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration was read but violates a rule.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors that stop the agent.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A probe could not be set up from its configuration.
    #[error("cannot set up probe '{probe}': {source}")]
    Probe {
        probe: String,
        #[source]
        source: DriverError,
    },

    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
