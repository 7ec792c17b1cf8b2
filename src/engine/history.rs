//! Bounded sample history and the statistics derived from it.

use std::time::Duration;

/// Fixed-capacity ring of round-trip times, `None` marking lost samples.
///
/// The slot for the n-th recorded sample is `n % capacity`. Once full, the
/// oldest sample is overwritten. Iteration always yields samples oldest
/// first, regardless of where they physically live in the ring.
#[derive(Debug, Clone)]
pub struct History {
    slots: Vec<Option<Duration>>,
    capacity: usize,
    recorded: u64,
}

impl History {
    /// Create an empty history holding at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            recorded: 0,
        }
    }

    /// Record a sample.
    pub fn push(&mut self, rtt: Option<Duration>) {
        if self.slots.len() < self.capacity {
            self.slots.push(rtt);
        } else {
            let slot = (self.recorded % self.capacity as u64) as usize;
            self.slots[slot] = rtt;
        }
        self.recorded += 1;
    }

    /// Number of samples currently held: `min(recorded, capacity)`.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples in chronological order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = Option<Duration>> + '_ {
        let split = if self.slots.len() < self.capacity {
            0
        } else {
            (self.recorded % self.capacity as u64) as usize
        };
        let (newer, older) = self.slots.split_at(split);
        older.iter().chain(newer.iter()).copied()
    }

    /// Samples in chronological order, collected.
    pub fn to_vec(&self) -> Vec<Option<Duration>> {
        self.iter().collect()
    }

    /// Percentage of the capacity in use.
    pub fn fill_factor(&self) -> f64 {
        100.0 * self.slots.len() as f64 / self.capacity as f64
    }

    /// Mean of the non-lost samples; `None` if every sample was lost.
    pub fn average(&self) -> Option<Duration> {
        let (sum, count) = self
            .slots
            .iter()
            .flatten()
            .fold((0u128, 0u128), |(sum, count), rtt| (sum + rtt.as_nanos(), count + 1));
        mean_nanos(sum, count)
    }

    /// Share of lost samples in percent; `None` while empty.
    pub fn loss_percent(&self) -> Option<f64> {
        if self.slots.is_empty() {
            return None;
        }
        let lost = self.slots.iter().filter(|s| s.is_none()).count();
        Some(100.0 * lost as f64 / self.slots.len() as f64)
    }

    /// Mean absolute difference between chronologically adjacent replies.
    ///
    /// Lost samples are dropped first, so the replies on either side of a
    /// loss count as adjacent. `None` with fewer than two replies.
    pub fn jitter(&self) -> Option<Duration> {
        let replies: Vec<Duration> = self.iter().flatten().collect();
        let (sum, count) = replies
            .windows(2)
            .map(|pair| pair[0].as_nanos().abs_diff(pair[1].as_nanos()))
            .fold((0u128, 0u128), |(sum, count), diff| (sum + diff, count + 1));
        mean_nanos(sum, count)
    }
}

fn mean_nanos(sum: u128, count: u128) -> Option<Duration> {
    if count == 0 {
        return None;
    }
    let mean = sum / count;
    Some(Duration::from_nanos(u64::try_from(mean).unwrap_or(u64::MAX)))
}
