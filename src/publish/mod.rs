//! Publish orchestration.
//!
//! Maps probe state onto discoverable sensor channels:
//!
//! - [`ProbePublisher`]: the eight channels of one probe
//! - [`CompoundPublisher`]: connectivity over a group of probes
//! - [`AggregatorIndex`]: which groups to republish after a probe cycle
//! - [`liveness`]: the agent's own connectivity sensor and last will
//!
//! State publications never fail the caller. A channel that cannot be
//! published is logged and skipped; its siblings go out regardless.

mod compound;
mod entity;
mod index;
pub mod liveness;
mod probe;
pub mod value;

pub use compound::{CompoundPublisher, Member};
pub use entity::{slugify, Device, Discovery, Node, SensorEntity, SensorEntityBuilder};
pub use index::AggregatorIndex;
pub use probe::{ProbePublisher, REQUIRED_HISTORY_FILL};
