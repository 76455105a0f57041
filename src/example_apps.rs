use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{ConverterOptions, FillPolicy, MahimahiConvention, ProcessorConfig};
use crate::constants::layout::COOKED_TRACE_DIR;
use crate::constants::mahimahi::{DEFAULT_EVENT_SIZE_BYTES, DEFAULT_LINE_BYTE_COST};
use crate::constants::processor::DEFAULT_CLIP_RANGE_MBPS;
use crate::converter::{AutoConfirm, Confirm, ConversionOutcome, FormatConverter, PromptConfirm};
use crate::heuristics::format_u128_with_commas;
use crate::pipeline::{RunOutcome, TracePipeline, TraceRunReport};
use crate::store::{CookedTraceStore, read_cooked};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FillArg {
    Interpolate,
    HoldLast,
    Zero,
}

impl From<FillArg> for FillPolicy {
    fn from(value: FillArg) -> Self {
        match value {
            FillArg::Interpolate => FillPolicy::Interpolate,
            FillArg::HoldLast => FillPolicy::HoldLast,
            FillArg::Zero => FillPolicy::Zero,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "process_trace",
    disable_help_subcommand = true,
    about = "Normalize raw throughput traces into cooked traces",
    long_about = "Read raw trace archives, resample them onto a fixed granularity, fill gaps, and write cooked CSV files.",
    after_help = "The dataset root must contain metadata/; raw_traces/ and cooked_traces/ are created as needed."
)]
struct ProcessTraceCli {
    #[arg(
        short = 't',
        long,
        required_unless_present = "all",
        help = "Registered trace name to process"
    )]
    trace: Option<String>,
    #[arg(long, conflicts_with = "trace", help = "Process every registered trace")]
    all: bool,
    #[arg(long, value_name = "PATH", default_value = ".", help = "Dataset root directory")]
    root: PathBuf,
    #[arg(short = 'p', long = "print-stats", help = "Log statistics for each cooked run")]
    print_stats: bool,
    #[arg(
        short = 'f',
        long = "force-regenerate",
        help = "Rebuild cooked files even if they already exist"
    )]
    force_regenerate: bool,
    #[arg(
        short = 'g',
        long = "granularity-secs",
        default_value_t = 1.0,
        help = "Output bucket width in seconds"
    )]
    granularity_secs: f64,
    #[arg(
        long = "max-duration-secs",
        value_name = "SECS",
        help = "Truncate or pad each run to this duration"
    )]
    max_duration_secs: Option<f64>,
    #[arg(long, default_value_t = 0.01, help = "Values below this are treated as missing")]
    delta: f64,
    #[arg(long = "fill-policy", value_enum, help = "Override the network's default fill policy")]
    fill_policy: Option<FillArg>,
    #[arg(
        short = 'c',
        long = "clip-tput",
        value_name = "MIN,MAX",
        value_parser = parse_clip_range_arg,
        help = "Clamp cooked values into [MIN, MAX] Mbps, converted to the trace unit [default: 0.01,2000]"
    )]
    clip_tput: Option<(f64, f64)>,
    #[arg(
        short = 'm',
        long = "max-trace-len-mb",
        default_value_t = 20.0,
        value_parser = parse_positive_f64,
        help = "Split cooked runs into files of at most this many MiB"
    )]
    max_trace_len_mb: f64,
    #[arg(long = "dry-run", help = "Report statistics without writing cooked files")]
    dry_run: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "mm_trace_gen",
    disable_help_subcommand = true,
    about = "Convert cooked traces into Mahimahi delivery schedules",
    long_about = "Estimate the size of the Mahimahi schedules for the selected cooked traces, ask for confirmation, then write one schedule file per trace (split into several files when requested).",
    after_help = "Select inputs with --trace (resolved under <root>/cooked_traces) and/or repeated --input paths."
)]
struct MmTraceGenCli {
    #[arg(
        short = 't',
        long,
        required_unless_present = "inputs",
        help = "Registered trace whose cooked files should be converted"
    )]
    trace: Option<String>,
    #[arg(
        short = 'i',
        long = "input",
        value_name = "PATH",
        help = "Cooked CSV file to convert, repeat as needed"
    )]
    inputs: Vec<PathBuf>,
    #[arg(long, value_name = "PATH", default_value = ".", help = "Dataset root directory")]
    root: PathBuf,
    #[arg(
        short = 'o',
        long = "output-dir",
        value_name = "DIR",
        default_value = "mm_traces",
        help = "Directory receiving schedule files"
    )]
    output_dir: PathBuf,
    #[arg(
        long = "batch-size-mb",
        default_value_t = 20.0,
        value_parser = parse_positive_f64,
        help = "Maximum estimated size of one output file in MiB"
    )]
    batch_size_mb: f64,
    #[arg(long, help = "Split oversize schedules into several files")]
    split: bool,
    #[arg(
        long = "event-size",
        default_value_t = DEFAULT_EVENT_SIZE_BYTES,
        help = "Bytes delivered per schedule line"
    )]
    event_size: u32,
    #[arg(short = 'y', long, help = "Skip the confirmation prompt")]
    yes: bool,
}

/// Run the `process_trace` app.
pub fn run_process_trace<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<ProcessTraceCli, _>(
        std::iter::once("process_trace".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let (clip_min, clip_max) = cli.clip_tput.unwrap_or(DEFAULT_CLIP_RANGE_MBPS);
    let max_file_bytes = mib_to_bytes(cli.max_trace_len_mb);
    let mut config = ProcessorConfig::default()
        .with_granularity_secs(cli.granularity_secs)
        .with_delta(cli.delta)
        .with_clip_range_mbps(clip_min, clip_max)
        .with_max_file_bytes(Some(max_file_bytes))
        .with_dry_run(cli.dry_run)
        .with_force_regenerate(cli.force_regenerate)
        .with_print_stats(cli.print_stats);
    if let Some(max) = cli.max_duration_secs {
        config = config.with_max_duration_secs(max);
    }
    if let Some(policy) = cli.fill_policy {
        config = config.with_fill_policy(policy.into());
    }

    let pipeline = TracePipeline::from_root(&cli.root, config)?;
    if cli.all {
        let mut failures = 0usize;
        for (name, result) in pipeline.process_all() {
            match result {
                Ok(report) => print_run_report(&report),
                Err(err) => {
                    failures += 1;
                    eprintln!("{name}: {err}");
                }
            }
        }
        if failures > 0 {
            return Err(format!("{failures} trace(s) failed").into());
        }
    } else if let Some(name) = cli.trace {
        print_run_report(&pipeline.process_trace(&name)?);
    }
    Ok(())
}

/// Run the `mm_trace_gen` app.
pub fn run_mm_trace_gen<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<MmTraceGenCli, _>(
        std::iter::once("mm_trace_gen".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut paths = cli.inputs.clone();
    if let Some(name) = &cli.trace {
        let store = CookedTraceStore::new(cli.root.join(COOKED_TRACE_DIR));
        let found = store.list(name);
        if found.is_empty() {
            return Err(format!(
                "no cooked files for '{name}' under {}; run process_trace first",
                store.root().display()
            )
            .into());
        }
        paths.extend(found);
    }

    let mut traces = Vec::with_capacity(paths.len());
    for path in &paths {
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| format!("cannot derive an output name from {}", path.display()))?
            .to_string();
        traces.push((stem, read_cooked(path)?));
    }

    let options = ConverterOptions::new(&cli.output_dir)
        .with_batch_size_bound(mib_to_bytes(cli.batch_size_mb))
        .with_split(cli.split)
        .with_convention(MahimahiConvention {
            event_size_bytes: cli.event_size,
            line_byte_cost: DEFAULT_LINE_BYTE_COST,
        });
    let converter = FormatConverter::new(options)?;

    let mut auto = AutoConfirm;
    let mut prompt = PromptConfirm::new(io::stdin().lock(), io::stderr());
    let confirm: &mut dyn Confirm = if cli.yes { &mut auto } else { &mut prompt };

    match converter.convert(&traces, confirm)? {
        ConversionOutcome::Declined(_) => println!("Aborted; no schedule files written."),
        ConversionOutcome::Written(files) => {
            for file in &files {
                println!(
                    "{} ({} events)",
                    file.path.display(),
                    format_u128_with_commas(u128::from(file.events))
                );
            }
            println!("Wrote {} schedule file(s).", files.len());
        }
    }
    Ok(())
}

fn print_run_report(report: &TraceRunReport) {
    match &report.outcome {
        RunOutcome::Skipped { paths } => println!(
            "{}: {} cooked file(s) already present (use --force-regenerate to rebuild)",
            report.trace,
            paths.len()
        ),
        RunOutcome::Cooked(runs) => {
            for run in runs {
                for path in &run.paths {
                    println!("{} ({}): {}", run.run, run.direction.label(), path.display());
                }
            }
        }
        RunOutcome::DryRun(reports) => {
            for (run, stats) in reports {
                println!(
                    "{run}: count={} min={:.3} max={:.3} mean={:.3} below_delta={:.1}% gaps={}",
                    stats.count,
                    stats.min,
                    stats.max,
                    stats.mean,
                    stats.fraction_below_delta * 100.0,
                    stats.gap_count
                );
            }
        }
    }
}

fn mib_to_bytes(mib: f64) -> u64 {
    ((mib * 1024.0 * 1024.0).round() as u64).max(1)
}

fn parse_positive_f64(raw: &str) -> Result<f64, String> {
    let parsed = raw
        .parse::<f64>()
        .map_err(|_| format!("Could not parse '{raw}' as a number"))?;
    if !parsed.is_finite() || parsed <= 0.0 {
        return Err(format!("value must be greater than zero (got {raw})"));
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

fn parse_clip_range_arg(raw: &str) -> Result<(f64, f64), String> {
    let Some((min, max)) = raw.split_once(',') else {
        return Err("--clip-tput expects MIN,MAX".to_string());
    };
    let min = min
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid clip minimum '{}': must be a float", min.trim()))?;
    let max = max
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid clip maximum '{}': must be a float", max.trim()))?;
    if !(min.is_finite() && max.is_finite()) || min > max {
        return Err(format!("--clip-tput requires MIN <= MAX (got {min},{max})"));
    }
    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_range_arg_parses_pairs() {
        assert_eq!(parse_clip_range_arg("0.01, 2000").unwrap(), (0.01, 2000.0));
        assert!(parse_clip_range_arg("5").is_err());
        assert!(parse_clip_range_arg("10,1").is_err());
        assert!(parse_clip_range_arg("a,1").is_err());
    }

    #[test]
    fn process_trace_cli_defaults() {
        let cli = ProcessTraceCli::try_parse_from(["process_trace", "-t", "trace1"]).unwrap();
        assert_eq!(cli.trace.as_deref(), Some("trace1"));
        assert_eq!(cli.granularity_secs, 1.0);
        assert_eq!(cli.clip_tput, None);
        assert_eq!(cli.max_trace_len_mb, 20.0);
        assert_eq!(mib_to_bytes(cli.max_trace_len_mb), 20 * 1024 * 1024);
        assert!(!cli.dry_run && !cli.force_regenerate && !cli.print_stats);
        assert!(ProcessTraceCli::try_parse_from(["process_trace"]).is_err());
        assert!(ProcessTraceCli::try_parse_from(["process_trace", "--all", "-t", "x"]).is_err());
    }

    #[test]
    fn mm_trace_gen_cli_requires_an_input() {
        assert!(MmTraceGenCli::try_parse_from(["mm_trace_gen"]).is_err());
        let cli = MmTraceGenCli::try_parse_from(["mm_trace_gen", "-i", "a.csv", "--split", "-y"])
            .unwrap();
        assert_eq!(cli.inputs, vec![PathBuf::from("a.csv")]);
        assert_eq!(cli.event_size, DEFAULT_EVENT_SIZE_BYTES);
        assert_eq!(cli.batch_size_mb, 20.0);
        assert!(cli.split && cli.yes);
        assert!(
            MmTraceGenCli::try_parse_from(["mm_trace_gen", "-i", "a.csv", "--batch-size-mb", "0"])
                .is_err()
        );
    }

    #[test]
    fn help_is_not_an_error() {
        assert!(run_mm_trace_gen(["--help".to_string()].into_iter()).is_ok());
    }
}
