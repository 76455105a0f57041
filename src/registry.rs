//! Explicit set of known traces.
//!
//! The registry is an ordinary value handed to the pipeline; two pipelines
//! built from different registries never observe each other's traces.

use indexmap::IndexMap;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::constants::layout::METADATA_EXTENSION;
use crate::errors::TraceError;
use crate::metadata::TraceMetadata;
use crate::types::TraceName;

/// Known traces keyed by name, in registration order.
#[derive(Clone, Debug, Default)]
pub struct MetadataRegistry {
    traces: IndexMap<TraceName, TraceMetadata>,
}

impl MetadataRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` metadata file directly under `dir`, sorted by file name.
    ///
    /// A file that fails to parse aborts the load; silently skipping it would
    /// drop a trace from the dataset.
    pub fn from_dir(dir: &Path) -> Result<Self, TraceError> {
        let mut paths = Vec::new();
        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
        {
            let path = entry.path();
            let is_metadata = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case(METADATA_EXTENSION))
                .unwrap_or(false);
            if is_metadata {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();

        let mut registry = Self::new();
        for path in paths {
            let metadata = TraceMetadata::load(&path)?;
            debug!(
                "[nettraces:registry] loaded metadata '{}' from {}",
                metadata.name,
                path.display()
            );
            registry.insert(metadata);
        }
        Ok(registry)
    }

    /// Register `metadata`, replacing an entry with the same name.
    pub fn insert(&mut self, metadata: TraceMetadata) -> Option<TraceMetadata> {
        let previous = self.traces.insert(metadata.name.clone(), metadata);
        if let Some(previous) = &previous {
            warn!(
                "[nettraces:registry] replaced metadata for '{}'",
                previous.name
            );
        }
        previous
    }

    /// Look up a trace by name.
    pub fn get(&self, name: &str) -> Result<&TraceMetadata, TraceError> {
        self.traces
            .get(name)
            .ok_or_else(|| TraceError::UnknownTrace(name.to_string()))
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &TraceName> {
        self.traces.keys()
    }

    /// Registered metadata in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &TraceMetadata> {
        self.traces.values()
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }
}
