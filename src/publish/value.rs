//! Encoding of state payloads.

use std::time::Duration;

use netprobe_types::STATE_UNAVAILABLE;

/// Render `value` with `precision` decimals, or the unavailable marker.
pub fn numeric(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", precision, v),
        _ => STATE_UNAVAILABLE.to_string(),
    }
}

/// Render a duration as milliseconds.
pub fn millis(value: Option<Duration>, precision: usize) -> String {
    numeric(value.map(as_millis), precision)
}

/// Jitter relative to the average round-trip time, in percent.
pub fn jitter_grade(jitter: Option<Duration>, average: Option<Duration>) -> Option<f64> {
    match (jitter, average) {
        (Some(jitter), Some(average)) if !average.is_zero() => {
            Some(100.0 * (jitter.as_nanos() as f64 / average.as_nanos() as f64))
        }
        _ => None,
    }
}

pub fn as_millis(value: Duration) -> f64 {
    value.as_secs_f64() * 1000.0
}
