use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::TraceName;

/// Error type for configuration, trace data, conversion, and IO failures.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("trace '{trace}' has no samples")]
    EmptyTrace { trace: TraceName },
    #[error("clip window [{start}, {end}) s is outside the recorded span of {span} s")]
    OutOfRangeWindow { start: f64, end: f64, span: f64 },
    #[error(
        "schedule for '{trace}' needs ~{estimated_bytes} bytes, over the {bound_bytes} byte bound (enable split output)"
    )]
    SizeLimitExceeded {
        trace: TraceName,
        estimated_bytes: u64,
        bound_bytes: u64,
    },
    #[error("trace '{trace}' is malformed: {details}")]
    MalformedTrace { trace: TraceName, details: String },
    #[error("failed parsing '{file}' line {line}: {details}")]
    Parse {
        file: String,
        line: usize,
        details: String,
    },
    #[error("trace '{0}' is not registered")]
    UnknownTrace(TraceName),
    #[error("raw archive {} is missing and metadata has no download_url", path.display())]
    MissingArchive { path: PathBuf },
    #[error("failed downloading '{url}': {reason}")]
    Download { url: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),
}
