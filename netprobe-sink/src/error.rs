//! Error types for sink sessions.

use thiserror::Error;

/// Errors reported by a sink session.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The session could not be established.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A single publish call failed.
    #[error("publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// The session was closed.
    #[error("session closed")]
    Closed,
}
