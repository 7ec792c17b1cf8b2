//! Error types for probe drivers.

use thiserror::Error;

/// Transient failures while performing a probe action.
///
/// None of these are fatal: the probe engine records a lost sample and
/// carries on with the next cycle. An expected "no reply" is not an error
/// either; drivers report it as a lost [`Measurement`](netprobe_types::Measurement).
#[derive(Debug, Error)]
pub enum DriverError {
    /// The action did not complete in time.
    #[error("timed out")]
    Timeout,

    /// The target cannot be reached at all.
    #[error("target unreachable: {0}")]
    Unreachable(String),

    /// The target address could not be resolved.
    #[error("cannot resolve target: {0}")]
    Resolve(String),

    /// Encoding or decoding the wire message failed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Socket level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(feature = "dns")]
impl From<hickory_proto::error::ProtoError> for DriverError {
    fn from(err: hickory_proto::error::ProtoError) -> Self {
        DriverError::Protocol(err.to_string())
    }
}

#[cfg(feature = "ping")]
impl From<surge_ping::SurgeError> for DriverError {
    fn from(err: surge_ping::SurgeError) -> Self {
        match err {
            surge_ping::SurgeError::Timeout { .. } => DriverError::Timeout,
            surge_ping::SurgeError::IOError(e) => DriverError::Io(e),
            other => DriverError::Unreachable(other.to_string()),
        }
    }
}
