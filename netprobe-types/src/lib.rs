//! # netprobe-types
//!
//! Core types shared by the netprobe agent, its probe drivers and its
//! telemetry sink. Nothing in here performs I/O.
//!
//! ## Overview
//!
//! - [`Measurement`]: the outcome of a single probe action
//! - [`ProbeKind`] / [`ProbeId`]: identity of a probe, unique per kind
//! - [`ProbeState`]: running counters owned by one probe
//! - [`SensorCode`] / [`Connectivity`]: the semantic quantities published per probe
//!
//! ## Example
//!
//! ```rust
//! use netprobe_types::{Measurement, ProbeState};
//! use std::time::Duration;
//!
//! let mut state = ProbeState::default();
//! state.record(Measurement::reply(Duration::from_millis(12), 40, 56));
//! state.record(Measurement::lost(40));
//!
//! assert_eq!(state.total_count, 2);
//! assert_eq!(state.total_lost_count, 1);
//! assert_eq!(state.bytes_sent_total, 80);
//! ```

mod measurement;
mod probe;
mod sensor;

pub use measurement::*;
pub use probe::*;
pub use sensor::*;

/// Application name used for node identifiers and the liveness sensor.
pub const APP_NAME: &str = "ha-net-probe";
