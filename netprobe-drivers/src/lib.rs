//! # netprobe-drivers
//!
//! Probe drivers perform the actual network measurement for a probe.
//! Every probe kind implements the same [`ProbeDriver`] contract, so the
//! probe engine can run any of them without knowing how a query or an
//! echo request is framed on the wire.
//!
//! ## Supported probes
//!
//! - **DNS** (`dns` feature) - name-resolution round trip over UDP
//! - **Ping** (`ping` feature) - ICMP echo round trip
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netprobe_drivers::{dns::DnsDriver, ProbeDriver};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = DnsDriver::builder()
//!         .query_name("example.com")
//!         .build()?;
//!
//!     let measurement = driver.perform("1.1.1.1", Duration::from_secs(1)).await?;
//!     println!("rtt: {:?}", measurement.rtt);
//!     Ok(())
//! }
//! ```

use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use netprobe_types::{Measurement, ProbeKind};

pub mod error;

#[cfg(feature = "dns")]
pub mod dns;

#[cfg(feature = "ping")]
pub mod ping;

pub use error::DriverError;

/// Contract shared by every probe kind.
///
/// `perform` must not fail for an expected no-reply outcome: a query
/// without answer is a lost [`Measurement`], not an error. Errors are
/// reserved for conditions such as an unresolvable or unreachable target.
/// Implementations must be cancel-safe: dropping the future abandons the
/// action without side effects visible to the caller.
#[async_trait]
pub trait ProbeDriver: Send + Sync + Debug {
    /// Kind of probe this driver implements.
    fn kind(&self) -> ProbeKind;

    /// Perform one measurement against `target`, waiting at most `timeout`
    /// for the reply.
    async fn perform(&self, target: &str, timeout: Duration) -> Result<Measurement, DriverError>;
}

/// Resolve a target given either as an IP literal or as a host name.
///
/// The first address returned by the system resolver wins.
pub async fn resolve_target(target: &str, port: u16) -> Result<SocketAddr, DriverError> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    tokio::net::lookup_host((target, port))
        .await
        .map_err(|e| DriverError::Resolve(format!("{}: {}", target, e)))?
        .next()
        .ok_or_else(|| DriverError::Resolve(format!("{}: no addresses", target)))
}
