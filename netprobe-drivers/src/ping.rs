//! ICMP echo probe driver.
//!
//! Sends one echo request per action. Unprivileged (datagram) ICMP
//! sockets are used by default; set `privileged` to use raw sockets on
//! systems where unprivileged ICMP is disabled.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use socket2::Type;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, SurgeError, ICMP};
use tracing::info;

use netprobe_types::{Measurement, ProbeKind};

use crate::{resolve_target, DriverError, ProbeDriver};

/// Default echo payload size in bytes.
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;

/// Size of the ICMP echo header.
const ICMP_HEADER_SIZE: usize = 8;

/// ICMP echo probe driver.
#[derive(Debug)]
pub struct PingDriver {
    payload_size: usize,
    privileged: bool,
    sequence: AtomicU16,
}

impl PingDriver {
    /// Create a new builder for configuring the driver.
    pub fn builder() -> PingDriverBuilder {
        PingDriverBuilder::default()
    }

    /// Bytes on the wire for one echo request (payload plus ICMP header).
    pub fn packet_size(&self) -> u64 {
        (self.payload_size + ICMP_HEADER_SIZE) as u64
    }

    fn client_for(&self, addr: IpAddr) -> Result<Client, DriverError> {
        let builder = match addr {
            IpAddr::V4(_) => Config::builder(),
            IpAddr::V6(_) => Config::builder().kind(ICMP::V6),
        };
        let config = builder.sock_type_hint(socket_type(self.privileged)).build();
        Ok(Client::new(&config)?)
    }
}

/// Raw sockets need privileges; datagram ICMP sockets do not.
fn socket_type(privileged: bool) -> Type {
    if privileged {
        Type::RAW
    } else {
        Type::DGRAM
    }
}

#[async_trait]
impl ProbeDriver for PingDriver {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Ping
    }

    async fn perform(&self, target: &str, timeout: Duration) -> Result<Measurement, DriverError> {
        let addr = resolve_target(target, 0).await?.ip();
        let client = self.client_for(addr)?;
        let packet_size = self.packet_size();

        let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
        pinger.timeout(timeout);

        let payload = vec![0u8; self.payload_size];
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);

        match pinger.ping(PingSequence(seq), &payload).await {
            Ok((_, rtt)) => {
                info!(
                    target = %addr,
                    "ping: received {} bytes after {:.0} ms",
                    packet_size,
                    rtt.as_secs_f64() * 1000.0
                );
                Ok(Measurement::reply(rtt, packet_size, packet_size))
            }
            Err(SurgeError::Timeout { .. }) => {
                info!(target = %addr, "ping: timed out after {:.1} sec", timeout.as_secs_f64());
                Ok(Measurement::lost(packet_size))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Builder for [`PingDriver`].
#[derive(Debug, Default)]
pub struct PingDriverBuilder {
    payload_size: Option<usize>,
    privileged: bool,
}

impl PingDriverBuilder {
    /// Set the echo payload size (default: 56 bytes).
    pub fn payload_size(mut self, size: usize) -> Self {
        self.payload_size = Some(size);
        self
    }

    /// Use raw ICMP sockets instead of unprivileged datagram sockets.
    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Build the driver.
    pub fn build(self) -> PingDriver {
        PingDriver {
            payload_size: self.payload_size.unwrap_or(DEFAULT_PAYLOAD_SIZE),
            privileged: self.privileged,
            sequence: AtomicU16::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let driver = PingDriver::builder().build();
        assert_eq!(driver.payload_size, DEFAULT_PAYLOAD_SIZE);
        assert!(!driver.privileged);
        assert_eq!(driver.kind(), ProbeKind::Ping);
    }

    #[test]
    fn packet_size_includes_header() {
        let driver = PingDriver::builder().payload_size(100).privileged(true).build();
        assert_eq!(driver.packet_size(), 108);
        assert!(driver.privileged);
    }

    #[test]
    fn privileged_selects_raw_socket() {
        assert_eq!(socket_type(true), Type::RAW);
        assert_eq!(socket_type(false), Type::DGRAM);
    }
}
