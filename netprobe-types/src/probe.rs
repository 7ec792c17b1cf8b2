//! Probe identity and running state.

use core::fmt;

use crate::Measurement;

/// The kind of measurement a probe performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ProbeKind {
    /// Name resolution round trip (DNS query/answer).
    Dns,
    /// Reachability round trip (ICMP echo).
    Ping,
}

impl ProbeKind {
    /// All known kinds, in a stable order.
    pub const ALL: [ProbeKind; 2] = [ProbeKind::Dns, ProbeKind::Ping];

    /// Short lowercase name used in configuration and object ids.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Dns => "dns",
            ProbeKind::Ping => "ping",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a probe: its kind plus a name unique within that kind.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProbeId {
    pub kind: ProbeKind,
    pub name: String,
}

impl ProbeId {
    /// Create a new probe id.
    pub fn new(kind: ProbeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.name)
    }
}

/// Running counters of a probe.
///
/// All counters only ever grow. `total_lost_count <= total_count` holds
/// after every [`record`](ProbeState::record).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProbeState {
    /// Number of recorded samples, lost ones included.
    pub total_count: u64,
    /// Number of lost samples.
    pub total_lost_count: u64,
    /// Sum of bytes sent over all samples.
    pub bytes_sent_total: u64,
    /// Sum of bytes received over all samples.
    pub bytes_received_total: u64,
    /// The most recent sample, if any.
    pub current: Option<Measurement>,
}

impl ProbeState {
    /// Account for one sample and make it the current one.
    pub fn record(&mut self, measurement: Measurement) {
        self.total_count = self.total_count.saturating_add(1);
        if measurement.is_lost() {
            self.total_lost_count = self.total_lost_count.saturating_add(1);
        }
        self.bytes_sent_total = self.bytes_sent_total.saturating_add(measurement.bytes_sent);
        self.bytes_received_total = self
            .bytes_received_total
            .saturating_add(measurement.bytes_received);
        self.current = Some(measurement);
    }

    /// Whether the most recent sample got a reply.
    pub fn is_up(&self) -> bool {
        self.current.map_or(false, |m| !m.is_lost())
    }
}
