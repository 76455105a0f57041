use std::path::Path;

use crate::config::LoaderOptions;
use crate::constants::processor::BUCKET_EPSILON;
use crate::data::CookedTrace;
use crate::errors::TraceError;
use crate::store::read_cooked;
use crate::types::Throughput;

/// Turns cooked traces into plain value arrays for simulators.
///
/// Loading never mutates the trace and never touches the filesystem unless
/// [`DataLoader::load_path`] is used.
#[derive(Clone, Debug, Default)]
pub struct DataLoader {
    options: LoaderOptions,
}

impl DataLoader {
    pub fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Window, scale, then filter the values of `trace`.
    pub fn load(&self, trace: &CookedTrace) -> Result<Vec<Throughput>, TraceError> {
        let scale = self.options.scale;
        if !scale.is_finite() {
            return Err(TraceError::InvalidConfiguration(format!(
                "scale must be finite (got {scale})"
            )));
        }
        let window = match self.options.clip_secs {
            Some((start, end)) => clip_range(trace, start, end)?,
            None => 0..trace.len(),
        };
        Ok(trace.values()[window]
            .iter()
            .map(|value| {
                let scaled = value * scale;
                match &self.options.filter {
                    Some(filter) => filter.apply(scaled),
                    None => scaled,
                }
            })
            .collect())
    }

    /// Read a cooked file and load it.
    pub fn load_path(&self, path: &Path) -> Result<Vec<Throughput>, TraceError> {
        self.load(&read_cooked(path)?)
    }
}

/// Bucket index range covering `[start, end)` seconds.
fn clip_range(
    trace: &CookedTrace,
    start: f64,
    end: f64,
) -> Result<std::ops::Range<usize>, TraceError> {
    if !start.is_finite() || !end.is_finite() || end <= start {
        return Err(TraceError::InvalidConfiguration(format!(
            "clip window must satisfy start < end (got [{start}, {end}))"
        )));
    }
    let span = trace.length_secs();
    if start < 0.0 || end > span + BUCKET_EPSILON {
        return Err(TraceError::OutOfRangeWindow { start, end, span });
    }
    let g = trace.granularity_secs();
    let first = ((start / g + BUCKET_EPSILON).floor() as usize).min(trace.len());
    let count = ((end - start) / g - BUCKET_EPSILON).ceil() as usize;
    let last = (first + count).min(trace.len());
    Ok(first..last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValueFilter;
    use crate::metadata::ThroughputUnit;
    use std::sync::Arc;

    fn ramp(len: usize, granularity_secs: f64) -> CookedTrace {
        CookedTrace::new(
            granularity_secs,
            ThroughputUnit::Mbps,
            (0..len).map(|idx| idx as f64).collect(),
        )
        .unwrap()
    }

    #[test]
    fn clip_of_ten_seconds_returns_ten_values() {
        let loader = DataLoader::new(LoaderOptions::default().with_clip_secs(10.0, 20.0));
        let values = loader.load(&ramp(100, 1.0)).unwrap();
        assert_eq!(values.len(), 10);
        assert_eq!(values.first(), Some(&10.0));
        assert_eq!(values.last(), Some(&19.0));
    }

    #[test]
    fn fractional_window_rounds_length_up() {
        let loader = DataLoader::new(LoaderOptions::default().with_clip_secs(1.0, 2.25));
        let values = loader.load(&ramp(20, 0.5)).unwrap();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn scale_multiplies_every_value() {
        let trace = ramp(8, 1.0);
        let values = DataLoader::new(LoaderOptions::default().with_scale(2.5))
            .load(&trace)
            .unwrap();
        let expected: Vec<f64> = trace.values().iter().map(|value| value * 2.5).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn filter_runs_after_scale() {
        let loader = DataLoader::new(
            LoaderOptions::default()
                .with_scale(10.0)
                .with_filter(ValueFilter::Clamp(5.0, 30.0)),
        );
        assert_eq!(loader.load(&ramp(5, 1.0)).unwrap(), vec![5.0, 10.0, 20.0, 30.0, 30.0]);

        let loader = DataLoader::new(
            LoaderOptions::default().with_filter(ValueFilter::Custom(Arc::new(|v: f64| v + 1.0))),
        );
        assert_eq!(loader.load(&ramp(2, 1.0)).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn window_outside_span_is_rejected() {
        let trace = ramp(10, 1.0);
        for (start, end) in [(5.0, 11.0), (-1.0, 3.0)] {
            let loader = DataLoader::new(LoaderOptions::default().with_clip_secs(start, end));
            assert!(matches!(
                loader.load(&trace),
                Err(TraceError::OutOfRangeWindow { .. })
            ));
        }
        let whole = DataLoader::new(LoaderOptions::default().with_clip_secs(0.0, 10.0));
        assert_eq!(whole.load(&trace).unwrap().len(), 10);
    }

    #[test]
    fn inverted_window_and_bad_scale_are_configuration_errors() {
        let trace = ramp(10, 1.0);
        let inverted = DataLoader::new(LoaderOptions::default().with_clip_secs(4.0, 4.0));
        assert!(matches!(
            inverted.load(&trace),
            Err(TraceError::InvalidConfiguration(_))
        ));
        let nan = DataLoader::new(LoaderOptions::default().with_scale(f64::NAN));
        assert!(matches!(
            nan.load(&trace),
            Err(TraceError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn load_does_not_modify_the_trace() {
        let trace = ramp(4, 1.0);
        let before = trace.clone();
        DataLoader::new(LoaderOptions::default().with_scale(3.0))
            .load(&trace)
            .unwrap();
        assert_eq!(trace, before);
    }
}
