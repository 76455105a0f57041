use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::mahimahi::{
    DEFAULT_BATCH_SIZE_BOUND, DEFAULT_EVENT_SIZE_BYTES, DEFAULT_LINE_BYTE_COST,
};
use crate::constants::cooked::DEFAULT_MAX_FILE_BYTES;
use crate::constants::processor::{
    BUCKET_EPSILON, DEFAULT_DELTA, DEFAULT_GRANULARITY_SECS, MAX_BUCKETS,
};
use crate::errors::TraceError;
use crate::types::{Seconds, Throughput};

/// How gaps and near-zero buckets are resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FillPolicy {
    /// Linear interpolation between the nearest valid neighbours.
    Interpolate,
    /// Repeat the last valid value.
    HoldLast,
    /// Leave values as they are; gaps become literal zeros.
    Zero,
}

/// Trace processor configuration.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Target bucket width in seconds.
    pub granularity_secs: Seconds,
    /// Optional cap; output then has exactly `floor(cap / granularity)` buckets.
    pub max_duration_secs: Option<Seconds>,
    /// Buckets below this value are treated as missing.
    pub delta: Throughput,
    /// Explicit fill policy; `None` defers to the network variant's default.
    pub fill_policy: Option<FillPolicy>,
    /// Report statistics instead of materializing a trace.
    pub dry_run: bool,
    /// Optional `(min, max)` clamp in Mbps, applied after filling in the trace's own unit.
    pub clip_range_mbps: Option<(Throughput, Throughput)>,
    /// Size bound of one cooked file; longer runs are chunked. `None` disables chunking.
    pub max_file_bytes: Option<u64>,
    /// Rebuild cooked files even when they already exist.
    pub force_regenerate: bool,
    /// Log summary statistics for each processed run.
    pub print_stats: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            granularity_secs: DEFAULT_GRANULARITY_SECS,
            max_duration_secs: None,
            delta: DEFAULT_DELTA,
            fill_policy: None,
            dry_run: false,
            clip_range_mbps: None,
            max_file_bytes: Some(DEFAULT_MAX_FILE_BYTES),
            force_regenerate: false,
            print_stats: false,
        }
    }
}

impl ProcessorConfig {
    /// Override bucket width.
    pub fn with_granularity_secs(mut self, granularity_secs: Seconds) -> Self {
        self.granularity_secs = granularity_secs;
        self
    }

    /// Cap the output duration.
    pub fn with_max_duration_secs(mut self, max_duration_secs: Seconds) -> Self {
        self.max_duration_secs = Some(max_duration_secs);
        self
    }

    /// Override the near-zero threshold.
    pub fn with_delta(mut self, delta: Throughput) -> Self {
        self.delta = delta;
        self
    }

    /// Force a fill policy regardless of network type.
    pub fn with_fill_policy(mut self, fill_policy: FillPolicy) -> Self {
        self.fill_policy = Some(fill_policy);
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Clamp filled values into `[min, max]` Mbps.
    pub fn with_clip_range_mbps(mut self, min: Throughput, max: Throughput) -> Self {
        self.clip_range_mbps = Some((min, max));
        self
    }

    /// Bound the size of each cooked file, or disable chunking with `None`.
    pub fn with_max_file_bytes(mut self, max_file_bytes: Option<u64>) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Enable or disable regeneration of existing cooked files.
    pub fn with_force_regenerate(mut self, force_regenerate: bool) -> Self {
        self.force_regenerate = force_regenerate;
        self
    }

    /// Enable or disable per-run statistics logging.
    pub fn with_print_stats(mut self, print_stats: bool) -> Self {
        self.print_stats = print_stats;
        self
    }

    /// Fail fast on parameters the processor cannot honour.
    pub fn validate(&self) -> Result<(), TraceError> {
        if !self.granularity_secs.is_finite() || self.granularity_secs <= 0.0 {
            return Err(TraceError::InvalidConfiguration(format!(
                "granularity_secs must be > 0 (got {})",
                self.granularity_secs
            )));
        }
        if !self.delta.is_finite() || self.delta < 0.0 {
            return Err(TraceError::InvalidConfiguration(format!(
                "delta must be >= 0 (got {})",
                self.delta
            )));
        }
        if let Some(max) = self.max_duration_secs {
            if !max.is_finite() || max <= 0.0 {
                return Err(TraceError::InvalidConfiguration(format!(
                    "max_duration_secs must be > 0 (got {max})"
                )));
            }
            let buckets = (max / self.granularity_secs + BUCKET_EPSILON).floor();
            if buckets < 1.0 {
                return Err(TraceError::InvalidConfiguration(format!(
                    "max_duration_secs {max} is shorter than one {} s bucket",
                    self.granularity_secs
                )));
            }
            if buckets > MAX_BUCKETS as f64 {
                return Err(TraceError::InvalidConfiguration(format!(
                    "max_duration_secs {max} at {} s granularity needs {buckets} buckets (limit {MAX_BUCKETS})",
                    self.granularity_secs
                )));
            }
        }
        if let Some((min, max)) = self.clip_range_mbps
            && (!min.is_finite() || !max.is_finite() || min > max)
        {
            return Err(TraceError::InvalidConfiguration(format!(
                "clip range [{min}, {max}] Mbps is invalid"
            )));
        }
        if self.max_file_bytes == Some(0) {
            return Err(TraceError::InvalidConfiguration(
                "max_file_bytes must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Custom elementwise transform applied by the data loader.
pub type ValueTransform = Arc<dyn Fn(Throughput) -> Throughput + Send + Sync + 'static>;

/// Elementwise filter applied after scaling.
#[derive(Clone)]
pub enum ValueFilter {
    /// Raise values below the floor to the floor.
    Floor(Throughput),
    /// Lower values above the ceiling to the ceiling.
    Ceiling(Throughput),
    /// Clamp into `[min, max]`.
    Clamp(Throughput, Throughput),
    /// Arbitrary transform.
    Custom(ValueTransform),
}

impl ValueFilter {
    /// Apply the filter to one value.
    pub fn apply(&self, value: Throughput) -> Throughput {
        match self {
            Self::Floor(min) => value.max(*min),
            Self::Ceiling(max) => value.min(*max),
            Self::Clamp(min, max) => value.clamp(*min, *max),
            Self::Custom(transform) => transform(value),
        }
    }
}

impl fmt::Debug for ValueFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Floor(min) => f.debug_tuple("Floor").field(min).finish(),
            Self::Ceiling(max) => f.debug_tuple("Ceiling").field(max).finish(),
            Self::Clamp(min, max) => f.debug_tuple("Clamp").field(min).field(max).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Data loader options.
#[derive(Clone, Debug)]
pub struct LoaderOptions {
    /// Optional `[start, end)` window in seconds.
    pub clip_secs: Option<(Seconds, Seconds)>,
    /// Multiplicative factor applied to every value.
    pub scale: f64,
    /// Optional elementwise filter applied after scaling.
    pub filter: Option<ValueFilter>,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            clip_secs: None,
            scale: 1.0,
            filter: None,
        }
    }
}

impl LoaderOptions {
    /// Restrict output to `[start, end)` seconds.
    pub fn with_clip_secs(mut self, start: Seconds, end: Seconds) -> Self {
        self.clip_secs = Some((start, end));
        self
    }

    /// Override the scale factor.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Attach an elementwise filter.
    pub fn with_filter(mut self, filter: ValueFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Mahimahi interval/size conventions.
///
/// Mahimahi replays one fixed-size packet per schedule line; the exact
/// packet size is a convention, so it is configurable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MahimahiConvention {
    /// Bytes delivered per schedule line.
    pub event_size_bytes: u32,
    /// Rough bytes per written line, used only for size estimates.
    pub line_byte_cost: u32,
}

impl Default for MahimahiConvention {
    fn default() -> Self {
        Self {
            event_size_bytes: DEFAULT_EVENT_SIZE_BYTES,
            line_byte_cost: DEFAULT_LINE_BYTE_COST,
        }
    }
}

/// Format converter options.
#[derive(Clone, Debug)]
pub struct ConverterOptions {
    /// Maximum estimated bytes per output file.
    pub batch_size_bound: u64,
    /// Partition oversize schedules across several files instead of failing.
    pub split: bool,
    /// Target emulator conventions.
    pub convention: MahimahiConvention,
    /// Directory receiving schedule files.
    pub output_dir: PathBuf,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            batch_size_bound: DEFAULT_BATCH_SIZE_BOUND,
            split: false,
            convention: MahimahiConvention::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl ConverterOptions {
    /// Create options writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Override the per-file size bound.
    pub fn with_batch_size_bound(mut self, batch_size_bound: u64) -> Self {
        self.batch_size_bound = batch_size_bound;
        self
    }

    /// Enable or disable split output.
    pub fn with_split(mut self, split: bool) -> Self {
        self.split = split;
        self
    }

    /// Override emulator conventions.
    pub fn with_convention(mut self, convention: MahimahiConvention) -> Self {
        self.convention = convention;
        self
    }

    pub fn validate(&self) -> Result<(), TraceError> {
        if self.convention.event_size_bytes == 0 {
            return Err(TraceError::InvalidConfiguration(
                "event_size_bytes must be > 0".to_string(),
            ));
        }
        if self.convention.line_byte_cost == 0 {
            return Err(TraceError::InvalidConfiguration(
                "line_byte_cost must be > 0".to_string(),
            ));
        }
        if self.batch_size_bound == 0 {
            return Err(TraceError::InvalidConfiguration(
                "batch_size_bound must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processor_defaults_match_documented_values() {
        let config = ProcessorConfig::default();
        assert_eq!(config.granularity_secs, 1.0);
        assert_eq!(config.delta, 0.01);
        assert!(config.fill_policy.is_none());
        assert!(!config.dry_run);
        assert!(config.clip_range_mbps.is_none());
        assert_eq!(config.max_file_bytes, Some(20 * 1024 * 1024));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn processor_validation_rejects_bad_parameters() {
        let bad = [
            ProcessorConfig::default().with_granularity_secs(0.0),
            ProcessorConfig::default().with_granularity_secs(-1.0),
            ProcessorConfig::default().with_delta(-0.5),
            ProcessorConfig::default().with_max_duration_secs(0.0),
            ProcessorConfig::default().with_clip_range_mbps(10.0, 1.0),
            ProcessorConfig::default().with_max_file_bytes(Some(0)),
            ProcessorConfig::default()
                .with_granularity_secs(1.0)
                .with_max_duration_secs(0.5),
            ProcessorConfig::default()
                .with_granularity_secs(1e-9)
                .with_max_duration_secs(1e6),
        ];
        for config in bad {
            assert!(matches!(
                config.validate(),
                Err(TraceError::InvalidConfiguration(_))
            ));
        }
    }

    #[test]
    fn value_filters_apply_elementwise() {
        assert_eq!(ValueFilter::Floor(1.0).apply(0.5), 1.0);
        assert_eq!(ValueFilter::Ceiling(1.0).apply(3.0), 1.0);
        assert_eq!(ValueFilter::Clamp(1.0, 2.0).apply(5.0), 2.0);
        let doubled = ValueFilter::Custom(Arc::new(|v: f64| v * 2.0));
        assert_eq!(doubled.apply(4.0), 8.0);
        assert_eq!(format!("{doubled:?}"), "Custom(..)");
    }

    #[test]
    fn converter_validation_rejects_zero_sizes() {
        let options = ConverterOptions::default().with_convention(MahimahiConvention {
            event_size_bytes: 0,
            line_byte_cost: 8,
        });
        assert!(options.validate().is_err());
        assert!(
            ConverterOptions::default()
                .with_batch_size_bound(0)
                .validate()
                .is_err()
        );
        assert!(ConverterOptions::default().validate().is_ok());
    }
}
