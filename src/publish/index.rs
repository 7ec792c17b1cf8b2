//! Reverse lookup from a probe to the compound groups it belongs to.

use std::collections::HashMap;
use std::sync::Arc;

use netprobe_types::ProbeId;

use super::CompoundPublisher;

/// Immutable map from probe identity to the aggregators referencing it.
///
/// Built once per session and never modified afterwards.
#[derive(Debug, Default)]
pub struct AggregatorIndex {
    by_probe: HashMap<ProbeId, Vec<Arc<CompoundPublisher>>>,
}

impl AggregatorIndex {
    pub fn build<'a>(aggregators: impl IntoIterator<Item = &'a Arc<CompoundPublisher>>) -> Self {
        let mut by_probe: HashMap<ProbeId, Vec<Arc<CompoundPublisher>>> = HashMap::new();
        for aggregator in aggregators {
            for member in aggregator.members() {
                let entry = by_probe.entry(member.clone()).or_default();
                if !entry.iter().any(|a| Arc::ptr_eq(a, aggregator)) {
                    entry.push(aggregator.clone());
                }
            }
        }
        Self { by_probe }
    }

    /// Aggregators that must be republished after `probe` completed a cycle.
    pub fn for_probe(&self, probe: &ProbeId) -> &[Arc<CompoundPublisher>] {
        self.by_probe.get(probe).map(Vec::as_slice).unwrap_or(&[])
    }
}
