use nettraces::config::{ConverterOptions, LoaderOptions, MahimahiConvention, ProcessorConfig};
use nettraces::converter::{AutoConfirm, ConversionOutcome, Schedule, convert};
use nettraces::data::{CookedTrace, ProcessOutcome, RawSample, RawTrace};
use nettraces::loader::DataLoader;
use nettraces::metadata::ThroughputUnit;
use nettraces::processor::process;
use tempfile::tempdir;

/// Deterministic irregular trace: jittered timestamps and a few dropouts.
fn irregular_trace(name: &str, samples: usize, seed: u64) -> RawTrace {
    let mut state = seed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as f64 / (1u64 << 31) as f64
    };
    let mut t = 0.0;
    let mut out = Vec::with_capacity(samples);
    for _ in 0..samples {
        t += 0.2 + next() * 1.6;
        let value = if next() < 0.1 { 0.0 } else { 1.0 + next() * 50.0 };
        out.push(RawSample::new(t, value));
    }
    RawTrace::new(name, ThroughputUnit::Mbps, out).unwrap()
}

fn cooked(outcome: ProcessOutcome) -> CookedTrace {
    outcome.cooked().expect("not a dry run")
}

#[test]
fn cooked_length_tracks_span_and_cap() {
    for seed in 1..6 {
        let raw = irregular_trace("run", 200, seed);
        let span = raw.span_secs();
        for g in [0.5, 1.0, 2.5] {
            let config = ProcessorConfig::default().with_granularity_secs(g);
            let trace = cooked(process(&raw, &config).unwrap());
            assert!((trace.length_secs() - span).abs() <= g, "g={g} span={span}");

            let cap = span / 2.0;
            let capped = cooked(process(&raw, &config.clone().with_max_duration_secs(cap)).unwrap());
            assert!((capped.length_secs() - cap).abs() <= g, "g={g} cap={cap}");
        }
    }
}

#[test]
fn processing_a_cooked_trace_again_is_identity() {
    let raw = irregular_trace("run", 120, 42);
    let config = ProcessorConfig::default();
    let first = cooked(process(&raw, &config).unwrap());
    let second = cooked(process(&first.to_raw("again").unwrap(), &config).unwrap());
    assert_eq!(first, second);
}

#[test]
fn cooked_values_have_no_gaps_or_sub_delta_values() {
    for seed in 10..14 {
        let raw = irregular_trace("run", 150, seed);
        let config = ProcessorConfig::default();
        let trace = cooked(process(&raw, &config).unwrap());
        assert!(trace.values().iter().all(|value| *value >= config.delta));
    }
}

#[test]
fn interpolation_scenario_yields_five_valid_values() {
    let raw = RawTrace::new(
        "scenario",
        ThroughputUnit::Mbps,
        vec![
            RawSample::new(0.0, 5.0),
            RawSample::new(2.0, 0.0),
            RawSample::new(4.0, 6.0),
        ],
    )
    .unwrap();
    let trace = cooked(process(&raw, &ProcessorConfig::default()).unwrap());
    assert_eq!(trace.len(), 5);
    assert!(trace.values().iter().all(|value| *value >= 0.01));
}

#[test]
fn scaling_multiplies_every_loaded_value() {
    let raw = irregular_trace("run", 80, 7);
    let trace = cooked(process(&raw, &ProcessorConfig::default()).unwrap());
    for scale in [0.0, 0.5, 3.0] {
        let loaded = DataLoader::new(LoaderOptions::default().with_scale(scale))
            .load(&trace)
            .unwrap();
        let expected: Vec<f64> = trace.values().iter().map(|value| value * scale).collect();
        assert_eq!(loaded, expected);
    }
}

#[test]
fn clip_window_from_long_trace_returns_requested_seconds() {
    let trace = CookedTrace::new(1.0, ThroughputUnit::Mbps, vec![3.0; 100]).unwrap();
    let loaded = DataLoader::new(LoaderOptions::default().with_clip_secs(10.0, 20.0))
        .load(&trace)
        .unwrap();
    assert_eq!(loaded.len(), 10);
}

#[test]
fn schedule_volume_matches_trace_volume_within_one_event_per_window() {
    let convention = MahimahiConvention::default();
    for seed in 20..24 {
        let raw = irregular_trace("run", 100, seed);
        let trace = cooked(process(&raw, &ProcessorConfig::default()).unwrap());
        let schedule = Schedule::from_trace("run", &trace, convention);
        let event_bytes = f64::from(convention.event_size_bytes);
        for (value, events) in trace.values().iter().zip(schedule.events()) {
            let bytes = trace.unit().to_bytes_per_sec(*value) * trace.granularity_secs();
            assert!((*events as f64 * event_bytes - bytes).abs() <= event_bytes / 2.0 + 1e-6);
        }
    }
}

#[test]
fn hour_long_trace_splits_into_files_matching_the_estimate() {
    let temp = tempdir().unwrap();
    let values: Vec<f64> = (0..3600).map(|idx| 1.0 + (idx % 60) as f64 / 10.0).collect();
    let trace = CookedTrace::new(1.0, ThroughputUnit::Mbps, values).unwrap();
    let traces = vec![("hour".to_string(), trace)];

    let options = ConverterOptions::new(temp.path());
    let converter = nettraces::FormatConverter::new(options.clone()).unwrap();
    let (_, estimate) = converter.estimate(&traces).unwrap();
    assert!(estimate.total_bytes > 1024 * 1024);

    let options = options.with_split(true).with_batch_size_bound(1024 * 1024);
    let ConversionOutcome::Written(files) = convert(&traces, options, &mut AutoConfirm).unwrap()
    else {
        panic!("expected written schedules");
    };
    assert!(files.len() >= 2);
    let events: u64 = files.iter().map(|file| file.events).sum();
    assert_eq!(events, estimate.total_events);
    for file in &files {
        let size = std::fs::metadata(&file.path).unwrap().len();
        assert!(size > 0);
    }
}
