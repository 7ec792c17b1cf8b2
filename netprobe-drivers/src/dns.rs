//! DNS probe driver: a name-resolution round trip over UDP.
//!
//! Each action sends a single `A`/`IN` query, without EDNS, for a name
//! picked at random from the configured list. Replies that do not match
//! the query id are ignored until the timeout expires.
//!
//! ## Example
//!
//! ```rust,no_run
//! use netprobe_drivers::{dns::DnsDriver, ProbeDriver};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), netprobe_drivers::DriverError> {
//! let driver = DnsDriver::builder()
//!     .query_names(["example.com", "example.org"])
//!     .build()?;
//!
//! let m = driver.perform("9.9.9.9", Duration::from_millis(800)).await?;
//! println!("sent {} bytes, received {}", m.bytes_sent, m.bytes_received);
//! # Ok(())
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query};
use hickory_proto::rr::{Name, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinEncodable};
use rand::seq::SliceRandom;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info};

use netprobe_types::{Measurement, ProbeKind};

use crate::{resolve_target, DriverError, ProbeDriver};

/// Names queried when none are configured.
pub const DEFAULT_QUERY_NAMES: &[&str] = &[
    "amazon.com",
    "apple.com",
    "facebook.com",
    "google.com",
    "microsoft.com",
    "netflix.com",
    "snapchat.com",
    "tiktok.com",
    "youtube.com",
];

/// Standard DNS port.
pub const DNS_PORT: u16 = 53;

const MAX_RESPONSE_SIZE: usize = 4096;

/// DNS probe driver.
#[derive(Debug, Clone)]
pub struct DnsDriver {
    query_names: Vec<Name>,
    port: u16,
}

impl DnsDriver {
    /// Create a new builder for configuring the driver.
    pub fn builder() -> DnsDriverBuilder {
        DnsDriverBuilder::default()
    }

    /// Names this driver picks its queries from.
    pub fn query_names(&self) -> &[Name] {
        &self.query_names
    }

    fn make_query(&self, id: u16) -> Result<Message, DriverError> {
        let name = self
            .query_names
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| DriverError::Protocol("no query names configured".to_string()))?;

        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name, RecordType::A));
        Ok(message)
    }
}

#[async_trait]
impl ProbeDriver for DnsDriver {
    fn kind(&self) -> ProbeKind {
        ProbeKind::Dns
    }

    async fn perform(&self, target: &str, timeout: Duration) -> Result<Measurement, DriverError> {
        let id: u16 = rand::random();
        let wire = self.make_query(id)?.to_bytes()?;
        let bytes_sent = wire.len() as u64;

        let addr = resolve_target(target, self.port).await?;
        let socket = UdpSocket::bind(unspecified_for(&addr)).await?;
        socket.connect(addr).await.map_err(map_io)?;

        debug!(target = %addr, bytes = bytes_sent, "dns: sending query");
        let started = Instant::now();
        let deadline = started + timeout;
        socket.send(&wire).await.map_err(map_io)?;

        let mut buf = [0u8; MAX_RESPONSE_SIZE];
        loop {
            let len = match tokio::time::timeout_at(deadline, socket.recv(&mut buf)).await {
                Err(_) => {
                    info!(target = %addr, "dns: timed out after {:.1} sec", timeout.as_secs_f64());
                    return Ok(Measurement::lost(bytes_sent));
                }
                Ok(result) => result.map_err(map_io)?,
            };

            match Message::from_bytes(&buf[..len]) {
                Ok(reply) if reply.id() == id && reply.message_type() == MessageType::Response => {
                    let rtt = started.elapsed();
                    info!(
                        target = %addr,
                        "dns: received {} bytes after {} ms",
                        len,
                        rtt.as_millis()
                    );
                    return Ok(Measurement::reply(rtt, bytes_sent, len as u64));
                }
                Ok(reply) => {
                    debug!(target = %addr, id = reply.id(), "dns: ignoring unexpected reply");
                }
                Err(e) => {
                    debug!(target = %addr, "dns: ignoring malformed reply: {}", e);
                }
            }
        }
    }
}

fn unspecified_for(addr: &SocketAddr) -> SocketAddr {
    if addr.is_ipv4() {
        SocketAddr::from(([0, 0, 0, 0], 0))
    } else {
        SocketAddr::from(([0u16; 8], 0))
    }
}

fn map_io(err: io::Error) -> DriverError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => {
            DriverError::Unreachable(err.to_string())
        }
        _ => DriverError::Io(err),
    }
}

/// Builder for [`DnsDriver`].
#[derive(Debug, Default)]
pub struct DnsDriverBuilder {
    query_names: Vec<String>,
    port: Option<u16>,
}

impl DnsDriverBuilder {
    /// Add a name to query.
    pub fn query_name(mut self, name: impl Into<String>) -> Self {
        self.query_names.push(name.into());
        self
    }

    /// Add several names to query.
    pub fn query_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Override the server port (default: 53).
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Build the driver.
    ///
    /// Falls back to [`DEFAULT_QUERY_NAMES`] when no name was added.
    pub fn build(self) -> Result<DnsDriver, DriverError> {
        let names: Vec<String> = if self.query_names.is_empty() {
            DEFAULT_QUERY_NAMES.iter().map(|s| s.to_string()).collect()
        } else {
            self.query_names
        };

        let query_names = names
            .iter()
            .map(|n| {
                Name::from_ascii(n).map_err(|e| {
                    DriverError::Protocol(format!("invalid query name '{}': {}", n, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DnsDriver {
            query_names,
            port: self.port.unwrap_or(DNS_PORT),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let driver = DnsDriver::builder().build().unwrap();
        assert_eq!(driver.query_names().len(), DEFAULT_QUERY_NAMES.len());
        assert_eq!(driver.port, DNS_PORT);
    }

    #[test]
    fn builder_keeps_explicit_names() {
        let driver = DnsDriver::builder()
            .query_names(["example.com", "example.org"])
            .port(5353)
            .build()
            .unwrap();
        assert_eq!(driver.query_names().len(), 2);
        assert_eq!(driver.port, 5353);
    }

    #[test]
    fn query_is_recursive_a_record() {
        let driver = DnsDriver::builder().query_name("example.com").build().unwrap();
        let query = driver.make_query(4242).unwrap();

        assert_eq!(query.id(), 4242);
        assert!(query.recursion_desired());
        assert_eq!(query.queries().len(), 1);
        assert_eq!(query.queries()[0].query_type(), RecordType::A);
        assert!(query.extensions().is_none());
    }

    #[tokio::test]
    async fn answered_query_reports_rtt_and_bytes() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let request = Message::from_bytes(&buf[..len]).unwrap();

            // A stray reply with the wrong id must be skipped.
            let mut stray = Message::new();
            stray.set_id(request.id().wrapping_add(1)).set_message_type(MessageType::Response);
            server.send_to(&stray.to_vec().unwrap(), peer).await.unwrap();

            let mut reply = request.clone();
            reply.set_message_type(MessageType::Response);
            server.send_to(&reply.to_vec().unwrap(), peer).await.unwrap();
        });

        let driver = DnsDriver::builder()
            .query_name("example.com")
            .port(port)
            .build()
            .unwrap();

        let m = driver.perform("127.0.0.1", Duration::from_secs(2)).await.unwrap();
        assert!(m.rtt.is_some());
        assert!(m.bytes_sent > 0);
        assert_eq!(m.bytes_received, m.bytes_sent);
    }

    #[tokio::test]
    async fn silent_server_is_a_loss_not_an_error() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        let driver = DnsDriver::builder()
            .query_name("example.com")
            .port(port)
            .build()
            .unwrap();

        let m = driver.perform("127.0.0.1", Duration::from_millis(100)).await.unwrap();
        assert!(m.is_lost());
        assert!(m.bytes_sent > 0);
        assert_eq!(m.bytes_received, 0);
        drop(server);
    }
}
