use crate::config::MahimahiConvention;
use crate::metadata::ThroughputUnit;
use crate::types::{Seconds, Throughput};

/// Delivery events needed to carry `value` for one window of `granularity_secs`.
///
/// Rounds to the nearest whole event, so each window is off by at most half
/// an event. Negative or non-finite inputs yield zero.
pub fn window_events(
    value: Throughput,
    unit: ThroughputUnit,
    granularity_secs: Seconds,
    convention: MahimahiConvention,
) -> u64 {
    let bytes = unit.to_bytes_per_sec(value) * granularity_secs;
    let events = (bytes / f64::from(convention.event_size_bytes)).round();
    if events.is_finite() && events > 0.0 {
        events as u64
    } else {
        0
    }
}

/// Estimated on-disk size of a schedule holding `events` lines.
pub fn estimated_bytes(events: u64, convention: MahimahiConvention) -> u64 {
    events.saturating_mul(u64::from(convention.line_byte_cost))
}

pub fn format_u128_with_commas(value: u128) -> String {
    let raw = value.to_string();
    let mut grouped_reversed = String::with_capacity(raw.len() + (raw.len() / 3));
    for (idx, ch) in raw.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped_reversed.push(',');
        }
        grouped_reversed.push(ch);
    }
    grouped_reversed.chars().rev().collect()
}

/// Human-readable byte count, e.g. `12.3 MiB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_events_rounds_to_nearest_packet() {
        let convention = MahimahiConvention::default();
        // 12 Mbps for 1 s = 1.5 MB = 1000 packets of 1500 bytes.
        assert_eq!(window_events(12.0, ThroughputUnit::Mbps, 1.0, convention), 1000);
        assert_eq!(window_events(12.0, ThroughputUnit::Mbps, 0.1, convention), 100);
        // 0.7 packets rounds up, 0.4 rounds down.
        assert_eq!(window_events(8400.0, ThroughputUnit::Bps, 1.0, convention), 1);
        assert_eq!(window_events(4800.0, ThroughputUnit::Bps, 1.0, convention), 0);
        assert_eq!(window_events(f64::NAN, ThroughputUnit::Bps, 1.0, convention), 0);
    }

    #[test]
    fn formatting_helpers() {
        assert_eq!(format_u128_with_commas(1234567), "1,234,567");
        assert_eq!(format_u128_with_commas(12), "12");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(20 * 1024 * 1024), "20.0 MiB");
        assert_eq!(estimated_bytes(3, MahimahiConvention::default()), 24);
    }
}
