use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::errors::TraceError;
use crate::source::formats::NetworkType;
use crate::types::TraceName;

/// Whether an archive holds unprocessed captures or already fixed-granularity data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// Captured samples at arbitrary timing; parsed by the network variant.
    Raw,
    /// Fixed-granularity series; parsed with the generic column reader.
    Cooked,
}

/// Link direction a trace was captured on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client to network.
    Uplink,
    /// Network to client.
    Downlink,
}

impl Direction {
    /// Short label used in cooked file names (`ul` / `dl`).
    pub const fn label(self) -> &'static str {
        match self {
            Self::Uplink => "ul",
            Self::Downlink => "dl",
        }
    }

    /// Direction named by an archive entry path, if any.
    ///
    /// Path tokens `downlink`/`down`/`dl` and `uplink`/`up`/`ul` are
    /// recognized; a path naming both directions (or neither) yields `None`.
    pub fn from_entry_name(entry: &str) -> Option<Self> {
        let mut found = None;
        for token in entry
            .split(|c: char| !c.is_ascii_alphanumeric())
            .map(str::to_ascii_lowercase)
        {
            let direction = match token.as_str() {
                "downlink" | "down" | "dl" => Self::Downlink,
                "uplink" | "up" | "ul" => Self::Uplink,
                _ => continue,
            };
            match found {
                Some(previous) if previous != direction => return None,
                _ => found = Some(direction),
            }
        }
        found
    }
}

/// Directions captured in one archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureDirection {
    Uplink,
    Downlink,
    /// Runs of both directions; each archive entry names its own direction.
    Both,
}

impl CaptureDirection {
    /// Directions to cook, downlink first.
    pub const fn directions(self) -> &'static [Direction] {
        match self {
            Self::Uplink => &[Direction::Uplink],
            Self::Downlink => &[Direction::Downlink],
            Self::Both => &[Direction::Downlink, Direction::Uplink],
        }
    }

    /// The only direction, unless the archive holds both.
    pub const fn single(self) -> Option<Direction> {
        match self {
            Self::Uplink => Some(Direction::Uplink),
            Self::Downlink => Some(Direction::Downlink),
            Self::Both => None,
        }
    }
}

impl From<Direction> for CaptureDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Uplink => Self::Uplink,
            Direction::Downlink => Self::Downlink,
        }
    }
}

/// Throughput unit declared by a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThroughputUnit {
    /// Bits per second.
    #[serde(alias = "Bps", alias = "BPS")]
    Bps,
    /// Kilobits per second.
    #[serde(alias = "Kbps", alias = "KBPS")]
    Kbps,
    /// Megabits per second.
    #[serde(alias = "Mbps", alias = "MBPS")]
    Mbps,
    /// Gigabits per second.
    #[serde(alias = "Gbps", alias = "GBPS")]
    Gbps,
}

impl ThroughputUnit {
    /// Bits per second represented by `1.0` in this unit.
    pub const fn bits_per_sec_factor(self) -> f64 {
        match self {
            Self::Bps => 1.0,
            Self::Kbps => 1e3,
            Self::Mbps => 1e6,
            Self::Gbps => 1e9,
        }
    }

    /// Convert a value in this unit to bits per second.
    pub fn to_bits_per_sec(self, value: f64) -> f64 {
        value * self.bits_per_sec_factor()
    }

    /// Convert a value in this unit to bytes per second.
    pub fn to_bytes_per_sec(self, value: f64) -> f64 {
        self.to_bits_per_sec(value) / 8.0
    }

    /// Convert a bits-per-second value into this unit.
    pub fn from_bits_per_sec(self, bits_per_sec: f64) -> f64 {
        bits_per_sec / self.bits_per_sec_factor()
    }

    /// Canonical lowercase name (`mbps`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bps => "bps",
            Self::Kbps => "kbps",
            Self::Mbps => "mbps",
            Self::Gbps => "gbps",
        }
    }
}

impl fmt::Display for ThroughputUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThroughputUnit {
    type Err = TraceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bps" => Ok(Self::Bps),
            "kbps" => Ok(Self::Kbps),
            "mbps" => Ok(Self::Mbps),
            "gbps" => Ok(Self::Gbps),
            other => Err(TraceError::InvalidConfiguration(format!(
                "unknown throughput unit '{other}'"
            ))),
        }
    }
}

/// Static description of one trace in the dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// Registered name; also the archive and cooked file stem.
    pub name: TraceName,
    /// Who captured or published the trace.
    pub source: String,
    /// Short human label.
    pub label: String,
    /// Raw captures or already cooked series.
    #[serde(rename = "type")]
    pub kind: TraceKind,
    /// Free-form description.
    pub description: String,
    /// Capture date.
    pub date: NaiveDate,
    /// Native sample spacing of the archived data, in seconds.
    pub granularity_secs: f64,
    /// Unit of throughput values.
    pub unit: ThroughputUnit,
    /// Captured link direction(s).
    pub direction: CaptureDirection,
    /// Network type; selects the raw parser and fill default.
    #[serde(default)]
    pub network: NetworkType,
    /// Where to fetch the archive when it is not present locally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Name of the processing routine that produced the cooked form.
    pub processor_script: String,
}

impl TraceMetadata {
    /// Load and validate one metadata JSON file.
    pub fn load(path: &Path) -> Result<Self, TraceError> {
        let body = fs::read_to_string(path)?;
        let metadata: Self = serde_json::from_str(&body)?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Check record invariants (`granularity_secs > 0`, non-empty name).
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.name.trim().is_empty() {
            return Err(TraceError::InvalidConfiguration(
                "metadata name must not be empty".to_string(),
            ));
        }
        if !self.granularity_secs.is_finite() || self.granularity_secs <= 0.0 {
            return Err(TraceError::InvalidConfiguration(format!(
                "metadata '{}' has granularity_secs {} (must be > 0)",
                self.name, self.granularity_secs
            )));
        }
        Ok(())
    }
}
