/// Constants used by the trace processor and its default configuration.
pub mod processor {
    /// Default width of one cooked bucket, in seconds.
    pub const DEFAULT_GRANULARITY_SECS: f64 = 1.0;
    /// Default near-zero threshold below which a bucket is treated as missing.
    pub const DEFAULT_DELTA: f64 = 0.01;
    /// Slack added before flooring bucket offsets so `i * g / g` lands on `i`.
    pub const BUCKET_EPSILON: f64 = 1e-9;
    /// Throughput clip range used by the command-line runner, in Mbps (min, max).
    pub const DEFAULT_CLIP_RANGE_MBPS: (f64, f64) = (0.01, 2000.0);
    /// Upper bound on buckets in one processed run (about 800 MB of `f64`s).
    pub const MAX_BUCKETS: usize = 100_000_000;
}

/// Constants used by the on-disk dataset layout.
pub mod layout {
    /// Directory (under the dataset root) holding one metadata JSON per trace.
    pub const METADATA_DIR: &str = "metadata";
    /// Directory holding raw `<name>.zip` archives.
    pub const RAW_TRACE_DIR: &str = "raw_traces";
    /// Directory holding cooked CSV files.
    pub const COOKED_TRACE_DIR: &str = "cooked_traces";
    /// Extension of metadata files.
    pub const METADATA_EXTENSION: &str = "json";
    /// Extension of raw trace archives.
    pub const RAW_ARCHIVE_EXTENSION: &str = "zip";
    /// Extension of cooked trace files.
    pub const COOKED_EXTENSION: &str = "csv";
    /// Extension used for in-flight writes before the final rename.
    pub const PARTIAL_EXTENSION: &str = "part";
    /// Archive entry stems (lowercased) treated as the human-readable description.
    pub const DESCRIPTION_STEMS: [&str; 2] = ["readme", "description"];
}

/// Constants used by the cooked CSV encoding.
pub mod cooked {
    /// Prefix of the preamble line carrying trace attributes.
    pub const PREAMBLE_PREFIX: &str = "#";
    /// Preamble key for bucket width.
    pub const KEY_GRANULARITY: &str = "granularity_secs";
    /// Preamble key for the throughput unit.
    pub const KEY_UNIT: &str = "unit";
    /// Column header for bucket start time.
    pub const COLUMN_TIME: &str = "time_secs";
    /// Column header for bucket throughput.
    pub const COLUMN_THROUGHPUT: &str = "throughput";
    /// Default size bound of one cooked file (20 MiB).
    pub const DEFAULT_MAX_FILE_BYTES: u64 = 20 * 1024 * 1024;
}

/// Constants used by the Mahimahi schedule converter.
pub mod mahimahi {
    /// Bytes delivered per schedule line (one MTU-sized packet).
    pub const DEFAULT_EVENT_SIZE_BYTES: u32 = 1500;
    /// Rough per-line byte cost used for size estimates (digits plus newline).
    pub const DEFAULT_LINE_BYTE_COST: u32 = 8;
    /// Default per-file size bound (20 MiB).
    pub const DEFAULT_BATCH_SIZE_BOUND: u64 = 20 * 1024 * 1024;
    /// Extension of schedule files.
    pub const SCHEDULE_EXTENSION: &str = "mm";
    /// Milliseconds per second.
    pub const MILLIS_PER_SEC: f64 = 1000.0;
}

/// Constants used by the network-specific raw parsers.
pub mod formats {
    /// Comment prefix accepted by line-oriented raw formats.
    pub const COMMENT_PREFIX: char = '#';
    /// Bytes represented by one cellular delivery line.
    pub const CELLULAR_PACKET_BYTES: f64 = 1500.0;
}
