//! Network-specific raw formats.
//!
//! Each `NetworkType` variant knows how its captures are laid out on disk,
//! which unit they record natively, and which fill policy suits its outages.
//! Everything after parsing is shared (see `crate::processor`).

use serde::{Deserialize, Serialize};

use crate::config::FillPolicy;
use crate::constants::formats::{CELLULAR_PACKET_BYTES, COMMENT_PREFIX};
use crate::constants::mahimahi::MILLIS_PER_SEC;
use crate::data::RawSample;
use crate::errors::TraceError;
use crate::metadata::{ThroughputUnit, TraceMetadata};
use crate::types::Seconds;

/// Network type of a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Two-column `timestamp value` lines (iperf-style exports).
    Wifi,
    /// Mahimahi-style packet delivery timestamps in milliseconds.
    Cellular,
    /// JSON lines with `timestamp` and `throughput_bps`.
    Satellite,
    /// CSV with a `timestamp,throughput` header.
    #[default]
    Fixed,
}

impl NetworkType {
    /// Fill policy used when the processor config does not force one.
    ///
    /// Cellular and fixed-line outages are step-like, so the last rate is held;
    /// WiFi and satellite rates drift and are interpolated.
    pub const fn default_fill_policy(self) -> FillPolicy {
        match self {
            Self::Wifi | Self::Satellite => FillPolicy::Interpolate,
            Self::Cellular | Self::Fixed => FillPolicy::HoldLast,
        }
    }

    /// Unit the raw format records before conversion to the metadata unit.
    pub const fn default_unit(self) -> ThroughputUnit {
        match self {
            Self::Wifi | Self::Fixed => ThroughputUnit::Mbps,
            Self::Cellular | Self::Satellite => ThroughputUnit::Bps,
        }
    }

    /// Parse one archive entry into samples expressed in `metadata.unit`.
    pub fn parse_raw(
        self,
        file: &str,
        body: &str,
        metadata: &TraceMetadata,
    ) -> Result<Vec<RawSample>, TraceError> {
        let native = match self {
            Self::Wifi => parse_columns(file, body, metadata.granularity_secs)?,
            Self::Cellular => parse_delivery_times(file, body, metadata.granularity_secs)?,
            Self::Satellite => parse_json_lines(file, body)?,
            Self::Fixed => parse_csv(file, body)?,
        };
        let from = self.default_unit();
        Ok(native
            .into_iter()
            .map(|sample| {
                RawSample::new(
                    sample.timestamp,
                    convert_unit(sample.value, from, metadata.unit),
                )
            })
            .collect())
    }
}

/// Re-express `value` from one unit in another.
pub fn convert_unit(value: f64, from: ThroughputUnit, to: ThroughputUnit) -> f64 {
    if from == to {
        return value;
    }
    to.from_bits_per_sec(from.to_bits_per_sec(value))
}

fn data_lines(body: &str) -> impl Iterator<Item = (usize, &str)> {
    body.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with(COMMENT_PREFIX))
}

fn parse_error(file: &str, line: usize, details: impl Into<String>) -> TraceError {
    TraceError::Parse {
        file: file.to_string(),
        line,
        details: details.into(),
    }
}

/// Generic whitespace/comma separated columns.
///
/// Two or more columns are read as `timestamp value`; a single column is a
/// value at `row * granularity_secs`. A non-numeric first row is a header.
pub fn parse_columns(
    file: &str,
    body: &str,
    granularity_secs: Seconds,
) -> Result<Vec<RawSample>, TraceError> {
    let mut samples = Vec::new();
    let mut first_row = true;
    for (line_no, line) in data_lines(body) {
        let fields: Vec<&str> = line
            .split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter(|field| !field.is_empty())
            .collect();
        let parsed: Result<Vec<f64>, _> = fields.iter().map(|field| field.parse::<f64>()).collect();
        let numbers = match parsed {
            Ok(numbers) => numbers,
            Err(_) if first_row => {
                first_row = false;
                continue;
            }
            Err(err) => return Err(parse_error(file, line_no, err.to_string())),
        };
        first_row = false;
        let sample = match numbers.as_slice() {
            [value] => RawSample::new(samples.len() as f64 * granularity_secs, *value),
            [timestamp, value, ..] => RawSample::new(*timestamp, *value),
            [] => continue,
        };
        samples.push(sample);
    }
    Ok(samples)
}

/// Packet delivery timestamps (ms, one 1500-byte packet per line) aggregated
/// into `window_secs` windows, yielding bits per second at each window start.
/// Windows between the first and last delivery with no packets yield 0.
fn parse_delivery_times(
    file: &str,
    body: &str,
    window_secs: Seconds,
) -> Result<Vec<RawSample>, TraceError> {
    let window_ms = window_secs * MILLIS_PER_SEC;
    let mut windows: Vec<u64> = Vec::new();
    let mut first_window: Option<u64> = None;
    let mut stamps = Vec::new();
    for (line_no, line) in data_lines(body) {
        let millis = line
            .parse::<f64>()
            .map_err(|err| parse_error(file, line_no, err.to_string()))?;
        if !millis.is_finite() || millis < 0.0 {
            return Err(parse_error(
                file,
                line_no,
                format!("delivery time {millis} must be a non-negative millisecond offset"),
            ));
        }
        let window = (millis / window_ms).floor() as u64;
        first_window = Some(first_window.map_or(window, |first| first.min(window)));
        stamps.push(window);
    }
    let Some(first_window) = first_window else {
        return Ok(Vec::new());
    };
    for window in stamps {
        let offset = (window - first_window) as usize;
        if offset >= windows.len() {
            windows.resize(offset + 1, 0);
        }
        windows[offset] += 1;
    }
    Ok(windows
        .into_iter()
        .enumerate()
        .map(|(offset, packets)| {
            let start = (first_window + offset as u64) as f64 * window_secs;
            let bits = packets as f64 * CELLULAR_PACKET_BYTES * 8.0;
            RawSample::new(start, bits / window_secs)
        })
        .collect())
}

#[derive(Deserialize)]
struct SatelliteRecord {
    #[serde(alias = "time")]
    timestamp: f64,
    #[serde(alias = "bps")]
    throughput_bps: f64,
}

fn parse_json_lines(file: &str, body: &str) -> Result<Vec<RawSample>, TraceError> {
    data_lines(body)
        .map(|(line_no, line)| {
            serde_json::from_str::<SatelliteRecord>(line)
                .map(|record| RawSample::new(record.timestamp, record.throughput_bps))
                .map_err(|err| parse_error(file, line_no, err.to_string()))
        })
        .collect()
}

#[derive(Deserialize)]
struct FixedRow {
    #[serde(alias = "time")]
    timestamp: f64,
    #[serde(alias = "tput")]
    throughput: f64,
}

fn parse_csv(file: &str, body: &str) -> Result<Vec<RawSample>, TraceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(COMMENT_PREFIX as u8))
        .from_reader(body.as_bytes());
    let mut samples = Vec::new();
    for (idx, row) in reader.deserialize::<FixedRow>().enumerate() {
        let row = row.map_err(|err| {
            let line = err
                .position()
                .map(|pos| pos.line() as usize)
                .unwrap_or(idx + 2);
            parse_error(file, line, err.to_string())
        })?;
        samples.push(RawSample::new(row.timestamp, row.throughput));
    }
    Ok(samples)
}
