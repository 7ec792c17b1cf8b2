//! Single probe measurement.

use core::time::Duration;

/// Outcome of one probe action.
///
/// A missing round-trip time denotes a lost sample. Byte counters are
/// always present, even on loss: a DNS query that timed out still sent
/// its query bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    /// Round-trip time, `None` when no reply arrived.
    pub rtt: Option<Duration>,
    /// Bytes put on the wire by the action.
    pub bytes_sent: u64,
    /// Bytes received in reply.
    pub bytes_received: u64,
}

impl Measurement {
    /// A measurement with a reply.
    pub const fn reply(rtt: Duration, bytes_sent: u64, bytes_received: u64) -> Self {
        Self {
            rtt: Some(rtt),
            bytes_sent,
            bytes_received,
        }
    }

    /// A lost sample. Only the sent bytes are accounted for.
    pub const fn lost(bytes_sent: u64) -> Self {
        Self {
            rtt: None,
            bytes_sent,
            bytes_received: 0,
        }
    }

    /// A lost sample where nothing is known about the traffic.
    ///
    /// Used when the action failed before or while sending.
    pub const fn failed() -> Self {
        Self::lost(0)
    }

    /// Whether this sample is a loss.
    pub const fn is_lost(&self) -> bool {
        self.rtt.is_none()
    }
}
