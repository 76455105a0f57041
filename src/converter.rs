//! Cooked traces to Mahimahi delivery schedules.
//!
//! A schedule file holds one millisecond timestamp per line; each line is a
//! delivery opportunity for one `event_size_bytes` packet. Conversion runs in
//! three phases:
//! - build per-window event counts (cheap, proportional to window count)
//! - estimate output size and ask the [`Confirm`] collaborator
//! - stream timestamps to disk, partitioning into several files when the
//!   per-file bound would be exceeded and splitting is enabled
//!
//! Timestamps are never rebased, so concatenating the split files of one
//! trace reproduces its unsplit schedule line for line.

use std::fmt;
use std::io::{BufRead, Write};
use std::ops::Range;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConverterOptions, MahimahiConvention};
use crate::constants::mahimahi::{MILLIS_PER_SEC, SCHEDULE_EXTENSION};
use crate::data::CookedTrace;
use crate::errors::TraceError;
use crate::heuristics::{estimated_bytes, format_bytes, format_u128_with_commas, window_events};
use crate::transport::fs::write_atomically;
use crate::types::{EventMillis, Seconds};

/// Per-window event counts for one trace.
#[derive(Clone, Debug, PartialEq)]
pub struct Schedule {
    stem: String,
    granularity_secs: Seconds,
    events: Vec<u64>,
}

impl Schedule {
    /// Derive event counts for every window of `trace`.
    pub fn from_trace(
        stem: impl Into<String>,
        trace: &CookedTrace,
        convention: MahimahiConvention,
    ) -> Self {
        let granularity_secs = trace.granularity_secs();
        let events = trace
            .values()
            .iter()
            .map(|value| window_events(*value, trace.unit(), granularity_secs, convention))
            .collect();
        Self {
            stem: stem.into(),
            granularity_secs,
            events,
        }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Event count per window.
    pub fn events(&self) -> &[u64] {
        &self.events
    }

    pub fn total_events(&self) -> u64 {
        self.events.iter().sum()
    }

    /// `[start, end)` of window `index` in whole milliseconds.
    pub fn window_bounds_ms(&self, index: usize) -> (EventMillis, EventMillis) {
        let at = |idx: usize| (idx as f64 * self.granularity_secs * MILLIS_PER_SEC).round() as u64;
        (at(index), at(index + 1))
    }

    /// Timestamps of every event in `windows`, in order.
    ///
    /// The `k` events of a window are spread evenly from its start.
    pub fn timestamps(&self, windows: Range<usize>) -> impl Iterator<Item = EventMillis> + '_ {
        windows.flat_map(move |idx| {
            let (start, end) = self.window_bounds_ms(idx);
            let span = end.saturating_sub(start);
            let count = self.events[idx];
            (0..count).map(move |j| start + j * span / count)
        })
    }
}

/// Size estimate for one trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceEstimate {
    pub stem: String,
    pub windows: usize,
    pub events: u64,
    pub bytes: u64,
}

/// Size estimate for a whole conversion, shown before anything is written.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConversionEstimate {
    pub traces: Vec<TraceEstimate>,
    pub total_events: u64,
    pub total_bytes: u64,
}

impl ConversionEstimate {
    fn from_schedules(schedules: &[Schedule], convention: MahimahiConvention) -> Self {
        let traces: Vec<TraceEstimate> = schedules
            .iter()
            .map(|schedule| {
                let events = schedule.total_events();
                TraceEstimate {
                    stem: schedule.stem.clone(),
                    windows: schedule.events.len(),
                    events,
                    bytes: estimated_bytes(events, convention),
                }
            })
            .collect();
        let total_events = traces.iter().map(|trace| trace.events).sum();
        let total_bytes = traces.iter().map(|trace| trace.bytes).sum();
        Self {
            traces,
            total_events,
            total_bytes,
        }
    }
}

impl fmt::Display for ConversionEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for trace in &self.traces {
            writeln!(
                f,
                "  {}: {} windows, {} events, ~{}",
                trace.stem,
                trace.windows,
                format_u128_with_commas(u128::from(trace.events)),
                format_bytes(trace.bytes)
            )?;
        }
        write!(
            f,
            "  total: {} events, ~{}",
            format_u128_with_commas(u128::from(self.total_events)),
            format_bytes(self.total_bytes)
        )
    }
}

/// Decides whether a conversion may proceed after seeing its estimate.
pub trait Confirm {
    fn confirm(&mut self, estimate: &ConversionEstimate) -> bool;
}

/// Accepts every conversion.
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&mut self, _estimate: &ConversionEstimate) -> bool {
        true
    }
}

/// Interactive `y/N` prompt. Anything but `y`/`yes` (or a read failure)
/// declines.
pub struct PromptConfirm<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptConfirm<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> Confirm for PromptConfirm<R, W> {
    fn confirm(&mut self, estimate: &ConversionEstimate) -> bool {
        if writeln!(self.output, "Conversion estimate:\n{estimate}")
            .and_then(|()| write!(self.output, "Proceed? [y/N] "))
            .and_then(|()| self.output.flush())
            .is_err()
        {
            return false;
        }
        let mut answer = String::new();
        if self.input.read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

/// One schedule file written by the converter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WrittenSchedule {
    pub path: PathBuf,
    pub events: u64,
}

/// Result of [`FormatConverter::convert`].
#[derive(Clone, Debug, PartialEq)]
pub enum ConversionOutcome {
    Written(Vec<WrittenSchedule>),
    /// The confirmation was declined; nothing was written.
    Declined(ConversionEstimate),
}

/// Greedy contiguous partition of windows so each group's estimate fits
/// within `bound_bytes`. A single window above the bound gets its own group.
pub fn partition_windows(
    events: &[u64],
    convention: MahimahiConvention,
    bound_bytes: u64,
) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    let mut group_bytes = 0u64;
    for (idx, count) in events.iter().enumerate() {
        let bytes = estimated_bytes(*count, convention);
        if idx > start && group_bytes.saturating_add(bytes) > bound_bytes {
            groups.push(start..idx);
            start = idx;
            group_bytes = 0;
        }
        group_bytes = group_bytes.saturating_add(bytes);
    }
    if start < events.len() || groups.is_empty() {
        groups.push(start..events.len());
    }
    groups
}

/// Writes Mahimahi schedules for cooked traces.
#[derive(Clone, Debug)]
pub struct FormatConverter {
    options: ConverterOptions,
}

impl FormatConverter {
    pub fn new(options: ConverterOptions) -> Result<Self, TraceError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Build schedules and the estimate without writing anything.
    pub fn estimate(
        &self,
        traces: &[(String, CookedTrace)],
    ) -> Result<(Vec<Schedule>, ConversionEstimate), TraceError> {
        let convention = self.options.convention;
        let mut schedules = Vec::with_capacity(traces.len());
        for (stem, trace) in traces {
            if trace.is_empty() {
                return Err(TraceError::EmptyTrace {
                    trace: stem.clone(),
                });
            }
            schedules.push(Schedule::from_trace(stem.as_str(), trace, convention));
        }
        let estimate = ConversionEstimate::from_schedules(&schedules, convention);
        Ok((schedules, estimate))
    }

    /// Estimate, confirm, then write one schedule per trace (or several
    /// when splitting).
    pub fn convert(
        &self,
        traces: &[(String, CookedTrace)],
        confirm: &mut dyn Confirm,
    ) -> Result<ConversionOutcome, TraceError> {
        let (schedules, estimate) = self.estimate(traces)?;
        let bound = self.options.batch_size_bound;
        info!(
            "[nettraces:convert] {} trace(s): {} events, ~{}",
            estimate.traces.len(),
            format_u128_with_commas(u128::from(estimate.total_events)),
            format_bytes(estimate.total_bytes)
        );

        if !self.options.split
            && let Some(oversize) = estimate.traces.iter().find(|trace| trace.bytes > bound)
        {
            return Err(TraceError::SizeLimitExceeded {
                trace: oversize.stem.clone(),
                estimated_bytes: oversize.bytes,
                bound_bytes: bound,
            });
        }

        if !confirm.confirm(&estimate) {
            info!("[nettraces:convert] conversion declined; nothing written");
            return Ok(ConversionOutcome::Declined(estimate));
        }

        let mut written = Vec::new();
        for (schedule, trace_estimate) in schedules.iter().zip(&estimate.traces) {
            let groups = if trace_estimate.bytes > bound {
                partition_windows(&schedule.events, self.options.convention, bound)
            } else {
                vec![0..schedule.events.len()]
            };
            if groups.len() > 1 {
                warn!(
                    "[nettraces:convert] '{}' exceeds {} per file; splitting into {} files",
                    schedule.stem,
                    format_bytes(bound),
                    groups.len()
                );
            }
            for (part, windows) in groups.iter().enumerate() {
                let file_name = if groups.len() > 1 {
                    format!("{}_{part}.{SCHEDULE_EXTENSION}", schedule.stem)
                } else {
                    format!("{}.{SCHEDULE_EXTENSION}", schedule.stem)
                };
                let path = self.options.output_dir.join(file_name);
                let events = write_schedule(&path, schedule, windows.clone())?;
                debug!(
                    "[nettraces:convert] wrote {} events to {}",
                    events,
                    path.display()
                );
                written.push(WrittenSchedule { path, events });
            }
        }
        Ok(ConversionOutcome::Written(written))
    }
}

/// Convenience wrapper over [`FormatConverter`].
pub fn convert(
    traces: &[(String, CookedTrace)],
    options: ConverterOptions,
    confirm: &mut dyn Confirm,
) -> Result<ConversionOutcome, TraceError> {
    FormatConverter::new(options)?.convert(traces, confirm)
}

fn write_schedule(
    path: &std::path::Path,
    schedule: &Schedule,
    windows: Range<usize>,
) -> Result<u64, TraceError> {
    let mut events = 0u64;
    write_atomically(path, |file| {
        for timestamp in schedule.timestamps(windows) {
            writeln!(file, "{timestamp}")?;
            events += 1;
        }
        Ok(())
    })?;
    Ok(events)
}
