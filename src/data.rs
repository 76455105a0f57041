use serde::{Deserialize, Serialize};

use crate::errors::TraceError;
use crate::metadata::{Direction, ThroughputUnit};

pub use crate::types::{RunName, Seconds, Throughput};

/// One raw `(timestamp, value)` observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub timestamp: Seconds,
    pub value: Throughput,
}

impl RawSample {
    pub const fn new(timestamp: Seconds, value: Throughput) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered raw sample sequence for one run of a trace.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTrace {
    name: RunName,
    unit: ThroughputUnit,
    samples: Vec<RawSample>,
    direction: Option<Direction>,
}

impl RawTrace {
    /// Build a raw trace, sorting samples stably by timestamp.
    ///
    /// Negative or non-finite values and non-finite timestamps are rejected.
    pub fn new(
        name: impl Into<RunName>,
        unit: ThroughputUnit,
        mut samples: Vec<RawSample>,
    ) -> Result<Self, TraceError> {
        let name = name.into();
        if let Some(bad) = samples
            .iter()
            .find(|s| !s.timestamp.is_finite() || !s.value.is_finite() || s.value < 0.0)
        {
            return Err(TraceError::MalformedTrace {
                trace: name,
                details: format!(
                    "sample ({}, {}) must have a finite timestamp and a finite value >= 0",
                    bad.timestamp, bad.value
                ),
            });
        }
        samples.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Ok(Self {
            name,
            unit,
            samples,
            direction: None,
        })
    }

    /// Tag the link direction this run was captured on.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn unit(&self) -> ThroughputUnit {
        self.unit
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Seconds between the first and last sample (0 for fewer than two samples).
    pub fn span_secs(&self) -> Seconds {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }
}

/// Fixed-granularity throughput series with no gaps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CookedTrace {
    granularity_secs: Seconds,
    unit: ThroughputUnit,
    values: Vec<Throughput>,
}

impl CookedTrace {
    /// Build a cooked trace; `granularity_secs` must be > 0 and every value finite.
    pub fn new(
        granularity_secs: Seconds,
        unit: ThroughputUnit,
        values: Vec<Throughput>,
    ) -> Result<Self, TraceError> {
        if !granularity_secs.is_finite() || granularity_secs <= 0.0 {
            return Err(TraceError::InvalidConfiguration(format!(
                "granularity_secs must be > 0 (got {granularity_secs})"
            )));
        }
        if values.iter().any(|value| !value.is_finite()) {
            return Err(TraceError::InvalidConfiguration(
                "cooked values must be finite".to_string(),
            ));
        }
        Ok(Self {
            granularity_secs,
            unit,
            values,
        })
    }

    pub fn granularity_secs(&self) -> Seconds {
        self.granularity_secs
    }

    pub fn unit(&self) -> ThroughputUnit {
        self.unit
    }

    pub fn values(&self) -> &[Throughput] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Covered duration: `len * granularity_secs`.
    pub fn length_secs(&self) -> Seconds {
        self.values.len() as f64 * self.granularity_secs
    }

    /// Start time of bucket `index`.
    pub fn time_of(&self, index: usize) -> Seconds {
        index as f64 * self.granularity_secs
    }

    /// Reinterpret the buckets as raw samples stamped at their start times.
    pub fn to_raw(&self, name: impl Into<RunName>) -> Result<RawTrace, TraceError> {
        let samples = self
            .values
            .iter()
            .enumerate()
            .map(|(idx, value)| RawSample::new(self.time_of(idx), *value))
            .collect();
        RawTrace::new(name, self.unit, samples)
    }
}

/// Summary statistics over a cooked or prospective cooked trace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DryRunReport {
    /// Number of buckets.
    pub count: usize,
    pub min: Throughput,
    pub max: Throughput,
    pub mean: Throughput,
    /// Share of buckets whose aggregated value was below delta (0-1).
    pub fraction_below_delta: f64,
    /// Buckets that held no raw samples.
    pub gap_count: usize,
}

/// Output of one processor run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProcessOutcome {
    /// Materialized trace.
    Cooked(CookedTrace),
    /// Statistics only; nothing was materialized.
    DryRun(DryRunReport),
}

impl ProcessOutcome {
    /// The cooked trace, if this was not a dry run.
    pub fn cooked(self) -> Option<CookedTrace> {
        match self {
            Self::Cooked(trace) => Some(trace),
            Self::DryRun(_) => None,
        }
    }

    /// The dry-run report, if this was a dry run.
    pub fn report(self) -> Option<DryRunReport> {
        match self {
            Self::Cooked(_) => None,
            Self::DryRun(report) => Some(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_trace_sorts_samples_and_reports_span() {
        let raw = RawTrace::new(
            "run",
            ThroughputUnit::Mbps,
            vec![
                RawSample::new(4.0, 6.0),
                RawSample::new(0.0, 5.0),
                RawSample::new(2.0, 0.0),
            ],
        )
        .unwrap();
        let stamps: Vec<f64> = raw.samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 2.0, 4.0]);
        assert_eq!(raw.span_secs(), 4.0);
    }

    #[test]
    fn raw_trace_rejects_negative_and_nan_values() {
        let negative = RawTrace::new(
            "run",
            ThroughputUnit::Mbps,
            vec![RawSample::new(0.0, -1.0)],
        );
        assert!(matches!(negative, Err(TraceError::MalformedTrace { .. })));
        let nan = RawTrace::new(
            "run",
            ThroughputUnit::Mbps,
            vec![RawSample::new(f64::NAN, 1.0)],
        );
        assert!(nan.is_err());
    }

    #[test]
    fn cooked_trace_round_trips_through_raw_timestamps() {
        let cooked = CookedTrace::new(0.5, ThroughputUnit::Kbps, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(cooked.length_secs(), 1.5);
        let raw = cooked.to_raw("again").unwrap();
        let stamps: Vec<f64> = raw.samples().iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![0.0, 0.5, 1.0]);
        assert_eq!(raw.unit(), ThroughputUnit::Kbps);
    }

    #[test]
    fn cooked_trace_rejects_bad_granularity() {
        assert!(CookedTrace::new(0.0, ThroughputUnit::Mbps, vec![1.0]).is_err());
        assert!(CookedTrace::new(1.0, ThroughputUnit::Mbps, vec![f64::INFINITY]).is_err());
    }
}
