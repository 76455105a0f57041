//! On-disk cooked traces.
//!
//! Layout: `<cooked_dir>/<name>_<dl|ul>_<run>.csv`. Each file starts with a
//! preamble line carrying the trace attributes, followed by a CSV table:
//!
//! ```text
//! # granularity_secs=1 unit=mbps
//! time_secs,throughput
//! 0,5
//! 1,5.25
//! ```
//!
//! A run larger than the configured file bound is written as consecutive
//! chunks, each a complete cooked file whose times restart at 0; the run
//! index keeps counting across chunks.

use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::cooked::{
    COLUMN_THROUGHPUT, COLUMN_TIME, KEY_GRANULARITY, KEY_UNIT, PREAMBLE_PREFIX,
};
use crate::constants::layout::COOKED_EXTENSION;
use crate::data::CookedTrace;
use crate::errors::TraceError;
use crate::metadata::{Direction, ThroughputUnit};
use crate::transport::fs::{list_files, write_atomically};
use crate::types::{Seconds, Throughput};

#[derive(Serialize, Deserialize)]
struct CookedRow {
    time_secs: Seconds,
    throughput: Throughput,
}

/// Directory of cooked trace files.
#[derive(Clone, Debug)]
pub struct CookedTraceStore {
    root: PathBuf,
}

impl CookedTraceStore {
    /// Create a store rooted at `root` (created lazily on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of run `run` of trace `name` in `direction`.
    pub fn path_for(&self, name: &str, direction: Direction, run: usize) -> PathBuf {
        self.root.join(format!(
            "{name}_{}_{run}.{COOKED_EXTENSION}",
            direction.label()
        ))
    }

    /// Persist one cooked run; returns the written path.
    pub fn write(
        &self,
        name: &str,
        direction: Direction,
        run: usize,
        trace: &CookedTrace,
    ) -> Result<PathBuf, TraceError> {
        let path = self.path_for(name, direction, run);
        write_cooked(&path, trace)?;
        debug!(
            "[nettraces:store] wrote {} buckets to {}",
            trace.len(),
            path.display()
        );
        Ok(path)
    }

    /// Persist one cooked run as files of at most `max_file_bytes` each,
    /// numbered from `first_index`. A single row larger than the bound still
    /// gets its own file. `None` writes one file.
    pub fn write_chunked(
        &self,
        name: &str,
        direction: Direction,
        first_index: usize,
        trace: &CookedTrace,
        max_file_bytes: Option<u64>,
    ) -> Result<Vec<PathBuf>, TraceError> {
        let Some(bound) = max_file_bytes else {
            return Ok(vec![self.write(name, direction, first_index, trace)?]);
        };
        let ranges = chunk_ranges(trace, bound)?;
        if ranges.len() > 1 {
            debug!(
                "[nettraces:store] splitting {} buckets of '{}' into {} files of <= {} bytes",
                trace.len(),
                name,
                ranges.len(),
                bound
            );
        }
        let mut paths = Vec::with_capacity(ranges.len());
        for (offset, range) in ranges.into_iter().enumerate() {
            let chunk = CookedTrace::new(
                trace.granularity_secs(),
                trace.unit(),
                trace.values()[range].to_vec(),
            )?;
            paths.push(self.write(name, direction, first_index + offset, &chunk)?);
        }
        Ok(paths)
    }

    /// Cooked files belonging to `name`, in run order.
    pub fn list(&self, name: &str) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = list_files(&self.root, &format!("{name}_"), COOKED_EXTENSION)
            .into_iter()
            .filter(|path| run_suffix(path, name).is_some())
            .collect();
        paths.sort_by_key(|path| {
            let suffix = run_suffix(path, name);
            (suffix.map(|(label, _)| label.to_string()), suffix.map(|(_, run)| run))
        });
        paths
    }

    /// True when at least one cooked file exists for `name`.
    pub fn exists(&self, name: &str) -> bool {
        !self.list(name).is_empty()
    }

    /// Remove every cooked file of `name`; returns how many were removed.
    pub fn remove(&self, name: &str) -> Result<usize, TraceError> {
        let paths = self.list(name);
        for path in &paths {
            fs::remove_file(path)?;
            debug!("[nettraces:store] removed {}", path.display());
        }
        Ok(paths.len())
    }

    /// Read a cooked file.
    pub fn read(&self, path: &Path) -> Result<CookedTrace, TraceError> {
        read_cooked(path)
    }
}

/// `(direction label, run index)` when `path` is `<name>_<dl|ul>_<run>.csv`.
fn run_suffix<'a>(path: &'a Path, name: &str) -> Option<(&'a str, usize)> {
    let stem = path.file_stem()?.to_str()?;
    let rest = stem.strip_prefix(name)?.strip_prefix('_')?;
    let (label, run) = rest.split_once('_')?;
    if label != Direction::Downlink.label() && label != Direction::Uplink.label() {
        return None;
    }
    Some((label, run.parse().ok()?))
}

fn preamble(trace: &CookedTrace) -> String {
    format!(
        "{PREAMBLE_PREFIX} {KEY_GRANULARITY}={} {KEY_UNIT}={}",
        trace.granularity_secs(),
        trace.unit()
    )
}

/// Encoded byte length of each value as a CSV field.
fn field_lengths(values: impl Iterator<Item = f64>) -> Result<Vec<usize>, TraceError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    let mut lengths = Vec::new();
    let mut written = 0;
    for value in values {
        writer.serialize([value])?;
        writer.flush()?;
        let total = writer.get_ref().len();
        // Drop the record terminator.
        lengths.push(total - written - 1);
        written = total;
    }
    Ok(lengths)
}

/// Contiguous value ranges whose encoded files each fit `bound` bytes.
fn chunk_ranges(trace: &CookedTrace, bound: u64) -> Result<Vec<Range<usize>>, TraceError> {
    let len = trace.len();
    if len == 0 {
        return Ok(vec![0..0]);
    }
    // Chunk times restart at 0, so row `j` of any chunk carries time `j * g`.
    let times = field_lengths((0..len).map(|idx| trace.time_of(idx)))?;
    let values = field_lengths(trace.values().iter().copied())?;
    let header = (preamble(trace).len() + COLUMN_TIME.len() + COLUMN_THROUGHPUT.len() + 3) as u64;

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < len {
        let mut size = header;
        let mut end = start;
        while end < len {
            // Comma plus newline.
            let row = (times[end - start] + values[end] + 2) as u64;
            if end > start && size + row > bound {
                break;
            }
            size += row;
            end += 1;
        }
        ranges.push(start..end);
        start = end;
    }
    Ok(ranges)
}

/// Write `trace` to `path` in the cooked CSV encoding.
pub fn write_cooked(path: &Path, trace: &CookedTrace) -> Result<(), TraceError> {
    write_atomically(path, |file| {
        use std::io::Write;
        writeln!(file, "{}", preamble(trace))?;
        let mut writer = csv::Writer::from_writer(file);
        for (idx, value) in trace.values().iter().enumerate() {
            writer.serialize(CookedRow {
                time_secs: trace.time_of(idx),
                throughput: *value,
            })?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Read a cooked CSV file written by `write_cooked`.
pub fn read_cooked(path: &Path) -> Result<CookedTrace, TraceError> {
    let body = fs::read_to_string(path)?;
    let file = path.display().to_string();
    let (preamble, table) = body
        .split_once('\n')
        .filter(|(first, _)| first.starts_with(PREAMBLE_PREFIX))
        .ok_or_else(|| TraceError::Parse {
            file: file.clone(),
            line: 1,
            details: format!("missing '{PREAMBLE_PREFIX} {KEY_GRANULARITY}=..' preamble"),
        })?;

    let mut granularity = None;
    let mut unit = None;
    for field in preamble
        .trim_start_matches(PREAMBLE_PREFIX)
        .split_whitespace()
    {
        match field.split_once('=') {
            Some((KEY_GRANULARITY, value)) => {
                granularity = Some(value.parse::<f64>().map_err(|err| TraceError::Parse {
                    file: file.clone(),
                    line: 1,
                    details: format!("{KEY_GRANULARITY}: {err}"),
                })?);
            }
            Some((KEY_UNIT, value)) => unit = Some(value.parse::<ThroughputUnit>()?),
            _ => {}
        }
    }
    let (Some(granularity), Some(unit)) = (granularity, unit) else {
        return Err(TraceError::Parse {
            file,
            line: 1,
            details: format!("preamble must define {KEY_GRANULARITY} and {KEY_UNIT}"),
        });
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(table.as_bytes());
    let headers = reader.headers()?.clone();
    if headers.get(0) != Some(COLUMN_TIME) || headers.get(1) != Some(COLUMN_THROUGHPUT) {
        return Err(TraceError::Parse {
            file,
            line: 2,
            details: format!("expected header '{COLUMN_TIME},{COLUMN_THROUGHPUT}'"),
        });
    }
    let mut values = Vec::new();
    for row in reader.deserialize::<CookedRow>() {
        values.push(row?.throughput);
    }
    CookedTrace::new(granularity, unit, values)
}
