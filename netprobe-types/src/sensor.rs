//! Sensor channels and the discovery vocabulary they are published with.

use core::fmt;

/// Literal state used for values that are undefined.
///
/// Never substituted by `0` or an empty payload.
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Discovery component types.
pub mod component {
    pub const SENSOR: &str = "sensor";
    pub const BINARY_SENSOR: &str = "binary_sensor";
}

/// Units of measurement.
pub mod unit {
    pub const MILLISECONDS: &str = "ms";
    pub const PERCENTAGE: &str = "%";
    pub const BYTES: &str = "B";
}

/// Icons attached to sensors.
pub mod icon {
    pub const TIMER: &str = "mdi:timer";
    pub const PACKET_LOSS: &str = "mdi:close-network";
    pub const NETWORK_UPLOAD: &str = "mdi:upload-network";
    pub const NETWORK_DOWNLOAD: &str = "mdi:download-network";
}

/// State classes.
pub mod state_class {
    pub const MEASUREMENT: &str = "measurement";
    pub const TOTAL_INCREASING: &str = "total_increasing";
}

pub const DEVICE_CLASS_CONNECTIVITY: &str = "connectivity";
pub const ENTITY_CATEGORY_DIAGNOSTIC: &str = "diagnostic";

/// Binary connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl Connectivity {
    /// Wire payload of this state.
    pub const fn as_payload(&self) -> &'static str {
        match self {
            Connectivity::Connected => "ON",
            Connectivity::Disconnected => "OFF",
        }
    }

    /// `Connected` when `up` is true.
    pub const fn from_up(up: bool) -> Self {
        if up {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        }
    }
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_payload())
    }
}

/// The semantic quantities published for every probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SensorCode {
    Rtt,
    RttAverage,
    AverageLoss,
    Jitter,
    JitterGrade,
    Connectivity,
    BytesSent,
    BytesReceived,
}

impl SensorCode {
    /// Every code, in publication order.
    pub const ALL: [SensorCode; 8] = [
        SensorCode::Rtt,
        SensorCode::RttAverage,
        SensorCode::AverageLoss,
        SensorCode::Jitter,
        SensorCode::JitterGrade,
        SensorCode::Connectivity,
        SensorCode::BytesSent,
        SensorCode::BytesReceived,
    ];

    /// Human-readable code, appended to the probe's object id.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SensorCode::Rtt => "rtt",
            SensorCode::RttAverage => "average rtt",
            SensorCode::AverageLoss => "average loss",
            SensorCode::Jitter => "jitter",
            SensorCode::JitterGrade => "jitter grade",
            SensorCode::Connectivity => "connectivity",
            SensorCode::BytesSent => "bytes sent",
            SensorCode::BytesReceived => "bytes received",
        }
    }
}

impl fmt::Display for SensorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_payloads() {
        assert_eq!(Connectivity::Connected.as_payload(), "ON");
        assert_eq!(Connectivity::Disconnected.as_payload(), "OFF");
        assert_eq!(Connectivity::from_up(false), Connectivity::Disconnected);
    }

    #[test]
    fn codes_are_unique() {
        let mut names: Vec<_> = SensorCode::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SensorCode::ALL.len());
    }
}
