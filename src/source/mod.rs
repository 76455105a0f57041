//! Raw trace archives.
//!
//! Ownership model:
//! - `RawTraceReader` owns the raw archive directory and the fetcher used to
//!   obtain archives that are not present locally.
//! - `ArchiveFetcher` is the download collaborator; the reader never retries.
//! - `RawArchive` is the in-memory result: description text plus one
//!   `RawTrace` per data file (a run).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::constants::layout::{DESCRIPTION_STEMS, RAW_ARCHIVE_EXTENSION};
use crate::data::RawTrace;
use crate::errors::TraceError;
use crate::metadata::{Direction, TraceKind, TraceMetadata};

/// Network-specific raw format parsers.
pub mod formats;

/// Download collaborator used when an archive is missing locally.
pub trait ArchiveFetcher: Send + Sync {
    /// Fetch `url` into `target`. Implementations must not leave a partial
    /// file at `target` on failure.
    fn fetch(&self, url: &str, target: &Path) -> Result<(), TraceError>;
}

/// Fetcher that refuses every download.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFetcher;

impl ArchiveFetcher for NoFetcher {
    fn fetch(&self, url: &str, _target: &Path) -> Result<(), TraceError> {
        Err(TraceError::Download {
            url: url.to_string(),
            reason: "downloads are disabled".to_string(),
        })
    }
}

/// HTTP fetcher when the `download` feature is enabled, otherwise `NoFetcher`.
pub fn default_fetcher() -> Arc<dyn ArchiveFetcher> {
    #[cfg(feature = "download")]
    {
        Arc::new(crate::transport::http::HttpFetcher::default())
    }
    #[cfg(not(feature = "download"))]
    {
        Arc::new(NoFetcher)
    }
}

/// Contents of one raw archive.
#[derive(Clone, Debug)]
pub struct RawArchive {
    /// Human-readable description bundled with the data, if any.
    pub description: Option<String>,
    /// One raw trace per data file, in entry-name order, each tagged with its
    /// direction.
    pub runs: Vec<RawTrace>,
}

impl RawArchive {
    /// Runs captured on `direction`, in entry-name order.
    pub fn runs_for(&self, direction: Direction) -> impl Iterator<Item = &RawTrace> {
        self.runs
            .iter()
            .filter(move |run| run.direction() == Some(direction))
    }
}

/// Reads `<raw_dir>/<name>.zip` archives into raw traces.
#[derive(Clone)]
pub struct RawTraceReader {
    raw_dir: PathBuf,
    fetcher: Arc<dyn ArchiveFetcher>,
}

impl RawTraceReader {
    /// Create a reader over `raw_dir` using the default fetcher.
    pub fn new(raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            fetcher: default_fetcher(),
        }
    }

    /// Replace the download collaborator.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Local archive path for `name`.
    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.raw_dir
            .join(format!("{name}.{RAW_ARCHIVE_EXTENSION}"))
    }

    /// Return the local archive path, downloading it first when absent.
    pub fn ensure_archive(&self, metadata: &TraceMetadata) -> Result<PathBuf, TraceError> {
        let path = self.archive_path(&metadata.name);
        if path.is_file() {
            return Ok(path);
        }
        let Some(url) = metadata.download_url.as_deref() else {
            return Err(TraceError::MissingArchive { path });
        };
        std::fs::create_dir_all(&self.raw_dir)?;
        info!(
            "[nettraces:source] archive for '{}' missing; fetching {}",
            metadata.name, url
        );
        self.fetcher.fetch(url, &path)?;
        Ok(path)
    }

    /// Fetch if needed, then read the archive for `metadata`.
    pub fn read(&self, metadata: &TraceMetadata) -> Result<RawArchive, TraceError> {
        let path = self.ensure_archive(metadata)?;
        Self::read_archive(&path, metadata)
    }

    /// Read an archive at `path` using the parser selected by `metadata`.
    pub fn read_archive(path: &Path, metadata: &TraceMetadata) -> Result<RawArchive, TraceError> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file))?;
        let mut entries = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let mut entry = archive.by_index(idx)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            if is_hidden_entry(&name) {
                continue;
            }
            let mut body = String::new();
            entry.read_to_string(&mut body)?;
            entries.push((name, body));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(
            "[nettraces:source] {} holds {} file entries",
            path.display(),
            entries.len()
        );

        let mut descriptions = Vec::new();
        let mut runs = Vec::new();
        for (name, body) in entries {
            let stem = entry_stem(&name);
            if is_description(stem) {
                descriptions.push(body);
                continue;
            }
            let Some(direction) = entry_direction(&name, metadata)? else {
                debug!(
                    "[nettraces:source] entry '{}' belongs to the other direction; skipping",
                    name
                );
                continue;
            };
            let samples = match metadata.kind {
                TraceKind::Raw => metadata.network.parse_raw(&name, &body, metadata)?,
                TraceKind::Cooked => {
                    formats::parse_columns(&name, &body, metadata.granularity_secs)?
                }
            };
            if samples.is_empty() {
                warn!(
                    "[nettraces:source] entry '{}' in {} holds no samples; skipping",
                    name,
                    path.display()
                );
                continue;
            }
            runs.push(
                RawTrace::new(format!("{}/{}", metadata.name, stem), metadata.unit, samples)?
                    .with_direction(direction),
            );
        }

        if runs.is_empty() {
            return Err(TraceError::EmptyTrace {
                trace: metadata.name.clone(),
            });
        }
        Ok(RawArchive {
            description: (!descriptions.is_empty()).then(|| descriptions.join("\n")),
            runs,
        })
    }
}

/// Direction of a data entry; `None` when the entry names a direction the
/// metadata does not capture.
fn entry_direction(
    name: &str,
    metadata: &TraceMetadata,
) -> Result<Option<Direction>, TraceError> {
    let named = Direction::from_entry_name(name);
    match (metadata.direction.single(), named) {
        (Some(declared), Some(named)) if named != declared => Ok(None),
        (Some(declared), _) => Ok(Some(declared)),
        (None, Some(named)) => Ok(Some(named)),
        (None, None) => Err(TraceError::MalformedTrace {
            trace: metadata.name.clone(),
            details: format!(
                "entry '{name}' does not name a direction (expected an uplink/downlink path token)"
            ),
        }),
    }
}

fn entry_stem(name: &str) -> &str {
    let file = name.rsplit('/').next().unwrap_or(name);
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

fn is_description(stem: &str) -> bool {
    let lowered = stem.to_ascii_lowercase();
    DESCRIPTION_STEMS
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn is_hidden_entry(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || name
            .rsplit('/')
            .next()
            .map(|file| file.starts_with('.'))
            .unwrap_or(false)
}
