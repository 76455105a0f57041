//! Resampling of raw traces onto a fixed-granularity grid.
//!
//! All network variants share one algorithm:
//! 1. bucket samples into `granularity_secs`-wide intervals measured from the
//!    first timestamp, averaging samples that share a bucket;
//! 2. fit the bucket count to `max_duration_secs` when a cap is set;
//! 3. resolve gaps and buckets below `delta` with the fill policy;
//! 4. clamp into `clip_range_mbps` (converted to the trace unit) when set.
//!
//! Runs needing more than `MAX_BUCKETS` buckets are rejected before any
//! bucket storage is allocated.
//!
//! Variants only contribute the raw parser and the default fill policy.

use tracing::{debug, warn};

use crate::config::{FillPolicy, ProcessorConfig};
use crate::constants::processor::{BUCKET_EPSILON, MAX_BUCKETS};
use crate::data::{CookedTrace, ProcessOutcome, RawSample, RawTrace};
use crate::errors::TraceError;
use crate::metadata::{ThroughputUnit, TraceMetadata};
use crate::metrics::summarize;
use crate::source::formats::{NetworkType, convert_unit};
use crate::types::{Seconds, Throughput};

/// Processor bound to one network variant.
#[derive(Clone, Debug)]
pub struct TraceProcessor {
    network: NetworkType,
    config: ProcessorConfig,
}

impl TraceProcessor {
    /// Create a processor, rejecting invalid configuration up front.
    pub fn new(network: NetworkType, config: ProcessorConfig) -> Result<Self, TraceError> {
        config.validate()?;
        Ok(Self { network, config })
    }

    /// Create a processor for the network declared by `metadata`.
    pub fn for_metadata(
        metadata: &TraceMetadata,
        config: ProcessorConfig,
    ) -> Result<Self, TraceError> {
        Self::new(metadata.network, config)
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Configured fill policy, or the variant default when none is set.
    pub fn fill_policy(&self) -> FillPolicy {
        self.config
            .fill_policy
            .unwrap_or_else(|| self.network.default_fill_policy())
    }

    /// Normalize one run.
    pub fn process(&self, raw: &RawTrace) -> Result<ProcessOutcome, TraceError> {
        normalize(raw, &self.config, self.fill_policy())
    }
}

/// Normalize `raw` with `config`; an unset fill policy means `Interpolate`.
pub fn process(raw: &RawTrace, config: &ProcessorConfig) -> Result<ProcessOutcome, TraceError> {
    normalize(
        raw,
        config,
        config.fill_policy.unwrap_or(FillPolicy::Interpolate),
    )
}

fn normalize(
    raw: &RawTrace,
    config: &ProcessorConfig,
    policy: FillPolicy,
) -> Result<ProcessOutcome, TraceError> {
    config.validate()?;
    if raw.is_empty() {
        return Err(TraceError::EmptyTrace {
            trace: raw.name().to_string(),
        });
    }
    let granularity = config.granularity_secs;
    // `validate` bounds the cap to 1..=MAX_BUCKETS. A cap truncates long
    // inputs and pads short ones with gaps for the fill policy.
    let cap = config
        .max_duration_secs
        .map(|cap| bucket_index(cap, granularity));
    let buckets = bucketize(raw, granularity, cap)?;

    let gap_count = buckets.iter().filter(|bucket| bucket.is_none()).count();
    let below_delta = buckets
        .iter()
        .filter(|bucket| matches!(bucket, Some(value) if *value < config.delta))
        .count();
    debug!(
        "[nettraces:processor] run '{}': {} samples -> {} buckets ({} gaps, {} below delta, policy {:?})",
        raw.name(),
        raw.samples().len(),
        buckets.len(),
        gap_count,
        below_delta,
        policy
    );

    let mut values = fill(&buckets, config.delta, policy, raw.name());
    if let Some((min_mbps, max_mbps)) = config.clip_range_mbps {
        let unit = raw.unit();
        let min = convert_unit(min_mbps, ThroughputUnit::Mbps, unit);
        let max = convert_unit(max_mbps, ThroughputUnit::Mbps, unit);
        for value in &mut values {
            *value = value.clamp(min, max);
        }
    }

    if config.dry_run {
        let report = summarize(&values, below_delta, gap_count).ok_or_else(|| {
            TraceError::EmptyTrace {
                trace: raw.name().to_string(),
            }
        })?;
        return Ok(ProcessOutcome::DryRun(report));
    }
    Ok(ProcessOutcome::Cooked(CookedTrace::new(
        granularity,
        raw.unit(),
        values,
    )?))
}

/// Bucket index of an offset; the epsilon keeps `i * g` from landing in bucket `i - 1`.
fn bucket_index(offset: Seconds, granularity: Seconds) -> usize {
    ((offset / granularity) + BUCKET_EPSILON).floor().max(0.0) as usize
}

/// Mean value per bucket; `None` marks a gap. Samples are sorted by `RawTrace`.
///
/// With `cap` the grid has exactly `cap` buckets and later samples are dropped.
fn bucketize(
    raw: &RawTrace,
    granularity: Seconds,
    cap: Option<usize>,
) -> Result<Vec<Option<Throughput>>, TraceError> {
    let samples: &[RawSample] = raw.samples();
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Ok(Vec::new());
    };
    let origin = first.timestamp;
    let count = match cap {
        Some(cap) => cap,
        None => {
            let needed = ((last.timestamp - origin) / granularity + BUCKET_EPSILON).floor() + 1.0;
            if needed > MAX_BUCKETS as f64 {
                return Err(TraceError::InvalidConfiguration(format!(
                    "run '{}' spans {} s; {granularity} s granularity needs {needed} buckets (limit {MAX_BUCKETS})",
                    raw.name(),
                    raw.span_secs()
                )));
            }
            needed as usize
        }
    };
    let mut sums = vec![0.0; count];
    let mut hits = vec![0usize; count];
    for sample in samples {
        let idx = bucket_index(sample.timestamp - origin, granularity);
        if idx >= count {
            break;
        }
        sums[idx] += sample.value;
        hits[idx] += 1;
    }
    Ok(sums
        .into_iter()
        .zip(hits)
        .map(|(sum, hits)| (hits > 0).then(|| sum / hits as f64))
        .collect())
}

fn fill(
    buckets: &[Option<Throughput>],
    delta: Throughput,
    policy: FillPolicy,
    run: &str,
) -> Vec<Throughput> {
    if policy == FillPolicy::Zero {
        return buckets.iter().map(|bucket| bucket.unwrap_or(0.0)).collect();
    }

    let valid: Vec<Option<Throughput>> = buckets
        .iter()
        .map(|bucket| bucket.filter(|value| *value >= delta))
        .collect();
    let Some(first_valid) = valid.iter().flatten().next().copied() else {
        warn!(
            "[nettraces:processor] run '{}' has no bucket at or above delta {}; flooring all {} buckets",
            run,
            delta,
            buckets.len()
        );
        return vec![delta; buckets.len()];
    };

    if policy == FillPolicy::HoldLast {
        hold_last(&valid, first_valid)
    } else {
        interpolate(&valid, first_valid)
    }
}

fn hold_last(valid: &[Option<Throughput>], first_valid: Throughput) -> Vec<Throughput> {
    let mut last = first_valid;
    valid
        .iter()
        .map(|bucket| {
            if let Some(value) = bucket {
                last = *value;
            }
            last
        })
        .collect()
}

fn interpolate(valid: &[Option<Throughput>], first_valid: Throughput) -> Vec<Throughput> {
    let mut next: Vec<Option<(usize, Throughput)>> = vec![None; valid.len()];
    let mut upcoming = None;
    for (idx, bucket) in valid.iter().enumerate().rev() {
        if let Some(value) = bucket {
            upcoming = Some((idx, *value));
        }
        next[idx] = upcoming;
    }

    let mut previous: Option<(usize, Throughput)> = None;
    let mut out = Vec::with_capacity(valid.len());
    for (idx, bucket) in valid.iter().enumerate() {
        let value = match (bucket, previous, next[idx]) {
            (Some(value), _, _) => {
                previous = Some((idx, *value));
                *value
            }
            (None, Some((left_idx, left)), Some((right_idx, right))) => {
                let ratio = (idx - left_idx) as f64 / (right_idx - left_idx) as f64;
                left + (right - left) * ratio
            }
            (None, Some((_, left)), None) => left,
            (None, None, Some((_, right))) => right,
            (None, None, None) => first_valid,
        };
        out.push(value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DryRunReport;
    use crate::metadata::ThroughputUnit;

    fn raw(samples: &[(f64, f64)]) -> RawTrace {
        RawTrace::new(
            "test_run",
            ThroughputUnit::Mbps,
            samples
                .iter()
                .map(|(t, v)| RawSample::new(*t, *v))
                .collect(),
        )
        .unwrap()
    }

    fn cooked(outcome: ProcessOutcome) -> CookedTrace {
        outcome.cooked().expect("expected cooked trace")
    }

    fn report(outcome: ProcessOutcome) -> DryRunReport {
        outcome.report().expect("expected dry-run report")
    }

    #[test]
    fn interpolates_gap_and_zero_between_valid_neighbours() {
        let config = ProcessorConfig::default().with_fill_policy(FillPolicy::Interpolate);
        let trace = cooked(process(&raw(&[(0.0, 5.0), (2.0, 0.0), (4.0, 6.0)]), &config).unwrap());
        assert_eq!(trace.values(), &[5.0, 5.25, 5.5, 5.75, 6.0]);
        assert!(trace.values().iter().all(|value| *value >= 0.01));
        assert_eq!(trace.length_secs(), 5.0);
    }

    #[test]
    fn hold_last_repeats_previous_value_and_backfills_leading_gaps() {
        let config = ProcessorConfig::default().with_fill_policy(FillPolicy::HoldLast);
        let trace = cooked(
            process(
                &raw(&[(0.0, 0.0), (1.0, 3.0), (3.0, 0.001), (4.0, 7.0)]),
                &config,
            )
            .unwrap(),
        );
        assert_eq!(trace.values(), &[3.0, 3.0, 3.0, 3.0, 7.0]);
    }

    #[test]
    fn zero_policy_keeps_holes() {
        let config = ProcessorConfig::default().with_fill_policy(FillPolicy::Zero);
        let trace = cooked(process(&raw(&[(0.0, 5.0), (2.0, 0.0), (4.0, 6.0)]), &config).unwrap());
        assert_eq!(trace.values(), &[5.0, 0.0, 0.0, 0.0, 6.0]);
    }

    #[test]
    fn samples_sharing_a_bucket_are_averaged() {
        let config = ProcessorConfig::default();
        let trace = cooked(
            process(
                &raw(&[(10.0, 2.0), (10.4, 4.0), (10.9, 6.0), (11.2, 8.0)]),
                &config,
            )
            .unwrap(),
        );
        assert_eq!(trace.values(), &[4.0, 8.0]);
    }

    #[test]
    fn sub_second_granularity_keeps_exact_multiples_in_their_bucket() {
        let config = ProcessorConfig::default().with_granularity_secs(0.1);
        let samples: Vec<(f64, f64)> = (0..30).map(|i| (i as f64 * 0.1, 1.0 + i as f64)).collect();
        let trace = cooked(process(&raw(&samples), &config).unwrap());
        assert_eq!(trace.len(), 30);
        assert_eq!(trace.values()[29], 30.0);
    }

    #[test]
    fn cap_truncates_long_input_and_drops_partial_bucket() {
        let samples: Vec<(f64, f64)> = (0..100).map(|i| (i as f64, 2.0)).collect();
        let config = ProcessorConfig::default().with_max_duration_secs(42.7);
        let trace = cooked(process(&raw(&samples), &config).unwrap());
        assert_eq!(trace.len(), 42);
    }

    #[test]
    fn cap_pads_short_input_by_holding_the_last_value() {
        let config = ProcessorConfig::default()
            .with_max_duration_secs(6.0)
            .with_fill_policy(FillPolicy::Interpolate);
        let trace = cooked(process(&raw(&[(0.0, 1.0), (2.0, 3.0)]), &config).unwrap());
        assert_eq!(trace.values(), &[1.0, 2.0, 3.0, 3.0, 3.0, 3.0]);

        let zero = ProcessorConfig::default()
            .with_max_duration_secs(4.0)
            .with_fill_policy(FillPolicy::Zero);
        let trace = cooked(process(&raw(&[(0.0, 1.0)]), &zero).unwrap());
        assert_eq!(trace.values(), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn cap_shorter_than_a_bucket_is_rejected() {
        let config = ProcessorConfig::default()
            .with_granularity_secs(2.0)
            .with_max_duration_secs(1.0);
        assert!(matches!(
            config.validate(),
            Err(TraceError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            process(&raw(&[(0.0, 1.0)]), &config),
            Err(TraceError::InvalidConfiguration(_))
        ));
        assert!(TraceProcessor::new(NetworkType::Wifi, config).is_err());
    }

    #[test]
    fn oversized_bucket_grid_is_rejected_without_allocating() {
        let config = ProcessorConfig::default().with_granularity_secs(1e-9);
        assert!(config.validate().is_ok());
        assert!(matches!(
            process(&raw(&[(0.0, 1.0), (1e6, 2.0)]), &config),
            Err(TraceError::InvalidConfiguration(details)) if details.contains("buckets")
        ));

        let capped = ProcessorConfig::default()
            .with_granularity_secs(1e-9)
            .with_max_duration_secs(1e6);
        assert!(matches!(
            process(&raw(&[(0.0, 1.0)]), &capped),
            Err(TraceError::InvalidConfiguration(_))
        ));

        let truncated = ProcessorConfig::default().with_max_duration_secs(10.0);
        let trace = cooked(process(&raw(&[(0.0, 1.0), (1e12, 2.0)]), &truncated).unwrap());
        assert_eq!(trace.values(), &[1.0; 10]);
    }

    #[test]
    fn invalid_configuration_fails_before_processing() {
        let empty = raw(&[]);
        let config = ProcessorConfig::default().with_granularity_secs(0.0);
        assert!(matches!(
            process(&empty, &config),
            Err(TraceError::InvalidConfiguration(_))
        ));
        let config = ProcessorConfig::default().with_delta(-0.1);
        assert!(matches!(
            process(&raw(&[(0.0, 1.0)]), &config),
            Err(TraceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn empty_trace_is_reported() {
        assert!(matches!(
            process(&raw(&[]), &ProcessorConfig::default()),
            Err(TraceError::EmptyTrace { trace }) if trace == "test_run"
        ));
    }

    #[test]
    fn trace_entirely_below_delta_is_floored() {
        let config = ProcessorConfig::default().with_fill_policy(FillPolicy::HoldLast);
        let trace = cooked(process(&raw(&[(0.0, 0.0), (2.0, 0.001)]), &config).unwrap());
        assert_eq!(trace.values(), &[0.01, 0.01, 0.01]);
    }

    #[test]
    fn dry_run_reports_pre_fill_gaps_and_post_fill_extrema() {
        let config = ProcessorConfig::default().with_dry_run(true);
        let report = report(process(&raw(&[(0.0, 5.0), (2.0, 0.0), (4.0, 6.0)]), &config).unwrap());
        assert_eq!(report.count, 5);
        assert_eq!(report.gap_count, 2);
        assert!((report.fraction_below_delta - 0.2).abs() < 1e-12);
        assert_eq!(report.min, 5.0);
        assert_eq!(report.max, 6.0);
        assert!((report.mean - 5.5).abs() < 1e-12);
    }

    #[test]
    fn clip_range_clamps_after_fill() {
        let config = ProcessorConfig::default().with_clip_range_mbps(0.01, 4.0);
        let trace = cooked(process(&raw(&[(0.0, 2.0), (1.0, 9.0)]), &config).unwrap());
        assert_eq!(trace.values(), &[2.0, 4.0]);
    }

    #[test]
    fn clip_range_is_converted_into_the_trace_unit() {
        let config = ProcessorConfig::default().with_clip_range_mbps(0.01, 2000.0);
        let kbps = RawTrace::new(
            "kbps_run",
            ThroughputUnit::Kbps,
            vec![
                RawSample::new(0.0, 50_000.0),
                RawSample::new(1.0, 3_000_000.0),
                RawSample::new(2.0, 5.0),
            ],
        )
        .unwrap();
        let trace = cooked(process(&kbps, &config).unwrap());
        assert_eq!(trace.unit(), ThroughputUnit::Kbps);
        assert_eq!(trace.values(), &[50_000.0, 2_000_000.0, 10.0]);

        let bps = RawTrace::new(
            "bps_run",
            ThroughputUnit::Bps,
            vec![RawSample::new(0.0, 50e6), RawSample::new(1.0, 60e6)],
        )
        .unwrap();
        let trace = cooked(process(&bps, &config).unwrap());
        assert_eq!(trace.values(), &[50e6, 60e6]);
    }

    #[test]
    fn processing_is_idempotent_on_cooked_output() {
        let samples = [
            (0.3, 4.0),
            (0.9, 0.0),
            (3.2, 12.0),
            (7.5, 0.002),
            (9.1, 3.0),
            (12.0, 8.0),
        ];
        for policy in [FillPolicy::Interpolate, FillPolicy::HoldLast] {
            let config = ProcessorConfig::default()
                .with_fill_policy(policy)
                .with_max_duration_secs(15.0);
            let first = cooked(process(&raw(&samples), &config).unwrap());
            let again = cooked(process(&first.to_raw("again").unwrap(), &config).unwrap());
            assert_eq!(first, again, "policy {policy:?}");
        }
    }

    #[test]
    fn length_tracks_input_span_within_one_bucket() {
        for (span, granularity) in [(4.0, 1.0), (10.5, 0.5), (59.9, 2.0), (3.0, 0.25)] {
            let config = ProcessorConfig::default().with_granularity_secs(granularity);
            let trace = cooked(process(&raw(&[(100.0, 1.0), (100.0 + span, 1.0)]), &config).unwrap());
            assert!(
                (trace.length_secs() - span).abs() <= granularity + 1e-9,
                "span {span} granularity {granularity} length {}",
                trace.length_secs()
            );
        }
    }

    #[test]
    fn processor_uses_variant_default_fill_policy_unless_overridden() {
        let cellular = TraceProcessor::new(NetworkType::Cellular, ProcessorConfig::default()).unwrap();
        assert_eq!(cellular.fill_policy(), FillPolicy::HoldLast);
        let trace = cooked(cellular.process(&raw(&[(0.0, 2.0), (2.0, 6.0)])).unwrap());
        assert_eq!(trace.values(), &[2.0, 2.0, 6.0]);

        let forced = TraceProcessor::new(
            NetworkType::Cellular,
            ProcessorConfig::default().with_fill_policy(FillPolicy::Interpolate),
        )
        .unwrap();
        let trace = cooked(forced.process(&raw(&[(0.0, 2.0), (2.0, 6.0)])).unwrap());
        assert_eq!(trace.values(), &[2.0, 4.0, 6.0]);
    }

    #[test]
    fn processor_construction_validates_config() {
        assert!(
            TraceProcessor::new(
                NetworkType::Wifi,
                ProcessorConfig::default().with_granularity_secs(-1.0)
            )
            .is_err()
        );
    }
}
