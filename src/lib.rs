#![doc = include_str!("../README.md")]

/// Processor, loader, and converter configuration types.
pub mod config;
/// Centralized constants used across the processor, store, and converter.
pub mod constants;
/// Mahimahi schedule generation (`mm_trace_gen`).
pub mod converter;
/// Raw and cooked trace types.
pub mod data;
/// Reusable app runners shared by downstream crates.
pub mod example_apps;
/// Size estimation and formatting helpers.
pub mod heuristics;
/// Cooked trace to numeric array loading.
pub mod loader;
/// Trace metadata records and units.
pub mod metadata;
/// Summary statistics helpers.
pub mod metrics;
/// Registry -> reader -> processor -> store orchestration.
pub mod pipeline;
/// Fixed-granularity resampling and gap filling.
pub mod processor;
/// Set of known traces.
pub mod registry;
/// Raw trace archives and network-specific parsers.
pub mod source;
/// Cooked trace persistence.
pub mod store;
/// Filesystem and HTTP helpers.
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use config::{
    ConverterOptions, FillPolicy, LoaderOptions, MahimahiConvention, ProcessorConfig, ValueFilter,
};
pub use converter::{
    AutoConfirm, Confirm, ConversionEstimate, ConversionOutcome, FormatConverter, PromptConfirm,
    Schedule, WrittenSchedule, convert,
};
pub use data::{CookedTrace, DryRunReport, ProcessOutcome, RawSample, RawTrace};
pub use errors::TraceError;
pub use loader::DataLoader;
pub use metadata::{
    CaptureDirection, Direction, ThroughputUnit, TraceKind, TraceMetadata,
};
pub use pipeline::{CookedRun, RunOutcome, TracePipeline, TraceRunReport};
pub use processor::{TraceProcessor, process};
pub use registry::MetadataRegistry;
pub use source::formats::NetworkType;
pub use source::{ArchiveFetcher, NoFetcher, RawArchive, RawTraceReader};
pub use store::CookedTraceStore;
pub use types::{EventMillis, RunName, Seconds, Throughput, TraceName};
