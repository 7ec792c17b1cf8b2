//! Log output and its runtime-adjustable level.
//!
//! The level comes from the `service.log-level` setting and is re-applied
//! on every configuration (re)load. A `RUST_LOG` environment variable, when
//! set, takes precedence and pins the filter for the process lifetime.

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Configured log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "critical")]
    Critical,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    #[default]
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "trace")]
    Trace,
}

impl LogLevel {
    /// Matching tracing filter. Critical has no counterpart and maps to error.
    pub fn as_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Critical | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warning => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Handle to change the level of the installed subscriber.
#[derive(Debug, Clone)]
pub struct LogHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    pinned: bool,
}

impl LogHandle {
    /// A handle that changes nothing, for embedding without a subscriber.
    pub fn detached() -> Self {
        Self {
            reload: None,
            pinned: true,
        }
    }

    /// Switch to `level`, unless `RUST_LOG` pinned the filter.
    pub fn apply(&self, level: LogLevel) {
        if self.pinned {
            return;
        }
        if let Some(handle) = &self.reload {
            let filter = EnvFilter::default().add_directive(level.as_filter().into());
            if let Err(e) = handle.reload(filter) {
                tracing::warn!("cannot change log level: {}", e);
            }
        }
    }
}

/// Install the global subscriber, starting at `INFO`.
///
/// Returns a detached handle if a subscriber was already installed.
pub fn init() -> LogHandle {
    let from_env = EnvFilter::try_from_default_env().ok();
    let pinned = from_env.is_some();
    let filter = from_env
        .unwrap_or_else(|| EnvFilter::default().add_directive(LevelFilter::INFO.into()));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .is_ok();

    if installed {
        LogHandle {
            reload: Some(handle),
            pinned,
        }
    } else {
        LogHandle::detached()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        level: LogLevel,
    }

    fn parse(level: &str) -> LogLevel {
        serde_json::from_str::<Wrapper>(&format!("{{\"level\":\"{}\"}}", level))
            .unwrap()
            .level
    }

    #[test]
    fn parses_configured_names() {
        assert_eq!(parse("CRITICAL"), LogLevel::Critical);
        assert_eq!(parse("WARNING"), LogLevel::Warning);
        assert_eq!(parse("debug"), LogLevel::Debug);
        assert!(serde_json::from_str::<Wrapper>("{\"level\":\"LOUD\"}").is_err());
    }

    #[test]
    fn maps_to_tracing_levels() {
        assert_eq!(LogLevel::Critical.as_filter(), LevelFilter::ERROR);
        assert_eq!(LogLevel::Warning.as_filter(), LevelFilter::WARN);
        assert_eq!(LogLevel::default().as_filter(), LevelFilter::INFO);
    }

    #[test]
    fn detached_handle_ignores_changes() {
        LogHandle::detached().apply(LogLevel::Debug);
    }
}
