/// Registered trace name (also the metadata/archive file stem).
/// Examples: `trace1`, `starlink_2024_dl`
pub type TraceName = String;
/// Name of one data file (run) inside a raw archive.
/// Examples: `trace1/run_01`, `trace1/walk_downtown`
pub type RunName = String;
/// Seconds since the first sample of a trace (or since an arbitrary epoch for raw input).
/// Example: `12.5`
pub type Seconds = f64;
/// Throughput value expressed in the trace's declared unit.
/// Example: `37.2` (Mbps)
pub type Throughput = f64;
/// Millisecond offset of one delivery event in a Mahimahi schedule.
/// Example: `1042`
pub type EventMillis = u64;
