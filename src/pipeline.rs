//! Registry -> reader -> processor -> store orchestration.
//!
//! Directory layout under the dataset root:
//!
//! ```text
//! <root>/metadata/<name>.json
//! <root>/raw_traces/<name>.zip
//! <root>/cooked_traces/<name>_<dl|ul>_<run>.csv
//! ```
//!
//! Runs are numbered per direction, downlink first. A run larger than
//! `max_file_bytes` takes several consecutive numbers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ProcessorConfig;
use crate::constants::layout::{COOKED_TRACE_DIR, METADATA_DIR, RAW_TRACE_DIR};
use crate::data::{CookedTrace, DryRunReport, ProcessOutcome};
use crate::errors::TraceError;
use crate::metadata::Direction;
use crate::metrics::cooked_report;
use crate::processor::TraceProcessor;
use crate::registry::MetadataRegistry;
use crate::source::{ArchiveFetcher, RawTraceReader};
use crate::store::CookedTraceStore;
use crate::types::{RunName, TraceName};

/// One cooked run persisted by the pipeline.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CookedRun {
    pub run: RunName,
    pub direction: Direction,
    /// One file, or several when the run exceeded the file size bound.
    pub paths: Vec<PathBuf>,
    /// Present when `print_stats` is enabled.
    pub stats: Option<DryRunReport>,
}

/// What happened to one trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum RunOutcome {
    /// Cooked files already existed and regeneration was not forced.
    Skipped { paths: Vec<PathBuf> },
    Cooked(Vec<CookedRun>),
    /// Dry run: one report per run, nothing written.
    DryRun(Vec<(RunName, DryRunReport)>),
}

/// Result of processing one registered trace.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TraceRunReport {
    pub trace: TraceName,
    /// Description text bundled with the raw archive.
    pub description: Option<String>,
    pub outcome: RunOutcome,
}

/// Processes registered traces into the cooked store.
#[derive(Clone)]
pub struct TracePipeline {
    registry: MetadataRegistry,
    config: ProcessorConfig,
    reader: RawTraceReader,
    store: CookedTraceStore,
}

impl TracePipeline {
    /// Pipeline over the standard layout below `root` with an explicit registry.
    pub fn new(
        root: &Path,
        registry: MetadataRegistry,
        config: ProcessorConfig,
    ) -> Result<Self, TraceError> {
        config.validate()?;
        Ok(Self {
            registry,
            config,
            reader: RawTraceReader::new(root.join(RAW_TRACE_DIR)),
            store: CookedTraceStore::new(root.join(COOKED_TRACE_DIR)),
        })
    }

    /// Load the registry from `<root>/metadata` and build a pipeline.
    pub fn from_root(root: &Path, config: ProcessorConfig) -> Result<Self, TraceError> {
        let registry = MetadataRegistry::from_dir(&root.join(METADATA_DIR))?;
        info!(
            "[nettraces:pipeline] {} trace(s) registered under {}",
            registry.len(),
            root.display()
        );
        Self::new(root, registry, config)
    }

    /// Replace the archive download collaborator.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ArchiveFetcher>) -> Self {
        self.reader = self.reader.with_fetcher(fetcher);
        self
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn store(&self) -> &CookedTraceStore {
        &self.store
    }

    /// Process one registered trace.
    pub fn process_trace(&self, name: &str) -> Result<TraceRunReport, TraceError> {
        let metadata = self.registry.get(name)?;
        let dry_run = self.config.dry_run;

        if !dry_run && !self.config.force_regenerate {
            let existing = self.store.list(name);
            if !existing.is_empty() {
                info!(
                    "[nettraces:pipeline] cooked files for '{}' already exist; use force regenerate to rebuild",
                    name
                );
                return Ok(TraceRunReport {
                    trace: metadata.name.clone(),
                    description: None,
                    outcome: RunOutcome::Skipped { paths: existing },
                });
            }
        }

        let processor = TraceProcessor::for_metadata(metadata, self.config.clone())?;
        let archive = self.reader.read(metadata)?;
        info!(
            "[nettraces:pipeline] '{}': {} run(s), network={:?}, fill={:?}",
            name,
            archive.runs.len(),
            metadata.network,
            processor.fill_policy()
        );

        let directions = metadata.direction.directions();
        let outcome = if dry_run {
            let mut reports = Vec::with_capacity(archive.runs.len());
            for &direction in directions {
                for raw in archive.runs_for(direction) {
                    if let ProcessOutcome::DryRun(report) = processor.process(raw)? {
                        info!(
                            "[nettraces:pipeline] dry run {} ({}): {:?}",
                            raw.name(),
                            direction.label(),
                            report
                        );
                        reports.push((raw.name().to_string(), report));
                    }
                }
            }
            RunOutcome::DryRun(reports)
        } else {
            // Cook everything before touching existing files, so a failing
            // run leaves the previous cooked output in place.
            let mut cooked_runs = Vec::with_capacity(archive.runs.len());
            for &direction in directions {
                for raw in archive.runs_for(direction) {
                    if let Some(cooked) = processor.process(raw)?.cooked() {
                        cooked_runs.push((direction, raw.name().to_string(), cooked));
                    }
                }
            }

            let removed = self.store.remove(name)?;
            if removed > 0 {
                debug!(
                    "[nettraces:pipeline] removed {} stale cooked file(s) for '{}'",
                    removed, name
                );
            }
            let mut runs = Vec::with_capacity(cooked_runs.len());
            for &direction in directions {
                let mut next_index = 0;
                let in_direction = cooked_runs.iter().filter(|(dir, _, _)| *dir == direction);
                for (_, run, cooked) in in_direction {
                    let paths = self.store.write_chunked(
                        name,
                        direction,
                        next_index,
                        cooked,
                        self.config.max_file_bytes,
                    )?;
                    next_index += paths.len();
                    let stats = if self.config.print_stats {
                        self.log_stats(run, cooked)
                    } else {
                        None
                    };
                    runs.push(CookedRun {
                        run: run.clone(),
                        direction,
                        paths,
                        stats,
                    });
                }
            }
            info!(
                "[nettraces:pipeline] wrote {} cooked file(s) for '{}'",
                runs.iter().map(|run| run.paths.len()).sum::<usize>(),
                name
            );
            RunOutcome::Cooked(runs)
        };

        Ok(TraceRunReport {
            trace: metadata.name.clone(),
            description: archive.description,
            outcome,
        })
    }

    fn log_stats(&self, run: &str, cooked: &CookedTrace) -> Option<DryRunReport> {
        let stats = cooked_report(cooked, self.config.delta)?;
        info!(
            "[nettraces:pipeline] stats {}: count={} min={:.3} max={:.3} mean={:.3} below_delta={:.1}%",
            run,
            stats.count,
            stats.min,
            stats.max,
            stats.mean,
            stats.fraction_below_delta * 100.0
        );
        Some(stats)
    }

    /// Process every registered trace in parallel, in registration order.
    ///
    /// Traces share no mutable state, so the result matches processing them
    /// one by one. Failures are reported per trace.
    pub fn process_all(&self) -> Vec<(TraceName, Result<TraceRunReport, TraceError>)> {
        let names: Vec<TraceName> = self.registry.names().cloned().collect();
        names
            .into_par_iter()
            .map(|name| {
                let result = self.process_trace(&name);
                (name, result)
            })
            .collect()
    }
}
