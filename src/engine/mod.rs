//! Probe execution engine.
//!
//! - [`History`]: bounded ring of round-trip times and the statistics derived from it
//! - [`ProbeEngine`]: paces one probe, invokes its driver and records the outcome
//! - [`run_probe`]: drives an engine until cancelled, publishing after every cycle

mod history;
mod probe;
mod run_loop;

pub use history::History;
pub use probe::{ProbeEngine, ProbeSettings};
pub use run_loop::run_probe;
