use crate::data::{CookedTrace, DryRunReport};
use crate::types::Throughput;

/// Summarize bucket values.
///
/// `below_delta` and `gap_count` describe the buckets before filling; they
/// are passed in because filled values no longer show them.
pub fn summarize(
    values: &[Throughput],
    below_delta: usize,
    gap_count: usize,
) -> Option<DryRunReport> {
    if values.is_empty() {
        return None;
    }
    let count = values.len();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / count as f64;
    Some(DryRunReport {
        count,
        min,
        max,
        mean,
        fraction_below_delta: below_delta as f64 / count as f64,
        gap_count,
    })
}

/// Statistics of an already cooked trace (which has no gaps by construction).
pub fn cooked_report(trace: &CookedTrace, delta: Throughput) -> Option<DryRunReport> {
    let below = trace
        .values()
        .iter()
        .filter(|value| **value < delta)
        .count();
    summarize(trace.values(), below, 0)
}
