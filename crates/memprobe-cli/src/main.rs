// crates/memprobe-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use memprobe_alloc::TrackingAllocator;
use memprobe_core::{BackendKind, MemoryProbe, OutputFormat, Reporter};
use memprobe_workload::{Workload, WorkloadGenerator};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// The census and tracing backends read this allocator's counters.
#[global_allocator]
static GLOBAL: TrackingAllocator = TrackingAllocator::system();

#[derive(Parser, Debug)]
#[command(
    name = "memprobe",
    about = "Process memory probe",
    long_about = "Process memory probe.\n\nAllocates a synthetic workload and reports this process's memory through one of four backends: rusage, process, heap-census, alloc-tracing.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run the workload, then report one sample (plus top sites where the backend has them)
    Sample {
        /// Probe backend
        #[arg(value_enum, long, env = "MEMPROBE_BACKEND", default_value_t = BackendOpt::Process)]
        backend: BackendOpt,

        #[command(flatten)]
        workload: WorkloadArgs,

        /// Number of sites to list for heap-census / alloc-tracing (0 = none)
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Sample before and after the workload and report the difference
    Compare {
        /// Probe backend
        #[arg(value_enum, long, env = "MEMPROBE_BACKEND", default_value_t = BackendOpt::Process)]
        backend: BackendOpt,

        #[command(flatten)]
        workload: WorkloadArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Run the workload once and report a sample from every backend
    All {
        #[command(flatten)]
        workload: WorkloadArgs,

        /// Number of sites to list for heap-census / alloc-tracing (0 = none)
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct WorkloadArgs {
    /// Number of map entries to allocate (must be >= 0)
    #[arg(long, env = "MEMPROBE_SIZE", default_value_t = 10_000, allow_negative_numbers = true)]
    size: i64,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Report format
    #[arg(long, value_enum, default_value_t = FormatOpt::Text)]
    format: FormatOpt,

    /// Write the report to this file instead of stdout
    #[arg(long, conflicts_with = "log")]
    output: Option<PathBuf>,

    /// Emit the report as log events instead of stdout
    #[arg(long, default_value_t = false)]
    log: bool,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum BackendOpt {
    /// Peak resident size from getrusage
    Rusage,
    /// Live resident/virtual size from the process table
    Process,
    /// Live heap bytes by type from the tracking allocator
    HeapCensus,
    /// Outstanding bytes per source line since tracing started
    AllocTracing,
}

impl From<BackendOpt> for BackendKind {
    fn from(b: BackendOpt) -> Self {
        match b {
            BackendOpt::Rusage => Self::Rusage,
            BackendOpt::Process => Self::Process,
            BackendOpt::HeapCensus => Self::HeapCensus,
            BackendOpt::AllocTracing => Self::AllocTracing,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, ValueEnum)]
enum FormatOpt {
    Text,
    Json,
}

impl From<FormatOpt> for OutputFormat {
    fn from(f: FormatOpt) -> Self {
        match f {
            FormatOpt::Text => Self::Text,
            FormatOpt::Json => Self::Json,
        }
    }
}

type Out = Reporter<Box<dyn Write>>;

fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Sample {
            backend,
            workload,
            top,
            output,
        } => sample(backend.into(), workload.size, top, &output),

        Cmd::Compare {
            backend,
            workload,
            output,
        } => compare(backend.into(), workload.size, &output),

        Cmd::All {
            workload,
            top,
            output,
        } => all(workload.size, top, &output),
    }
}

/// Initialize tracing with an env-driven filter (default INFO).
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(io::stderr)
        .compact();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

/// Ensure the parent directory for a file exists.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating parent directory {}", dir.display()))?;
        }
    }
    Ok(())
}

fn open_reporter(args: &OutputArgs) -> Result<Out> {
    let format = OutputFormat::from(args.format);
    if args.log {
        return Ok(Reporter::log(format));
    }
    let sink: Box<dyn Write> = match &args.output {
        Some(path) => {
            ensure_parent_dir(path)?;
            let f = File::create(path).with_context(|| format!("create {}", path.display()))?;
            Box::new(BufWriter::new(f))
        }
        None => Box::new(io::stdout()),
    };
    Ok(Reporter::new(sink, format))
}

/// Build and allocate the workload; logs a summary so it is visible even if
/// probing fails afterwards.
fn run_workload(size: i64) -> Result<Workload> {
    let generator = WorkloadGenerator::new(size).context("building workload")?;
    let workload = generator.eat();
    info!(
        entries = workload.len(),
        joined_bytes = workload.joined().len(),
        "workload allocated"
    );
    Ok(workload)
}

fn report_sites(out: &mut Out, probe: &mut MemoryProbe, top: usize) -> Result<()> {
    if top == 0 || !probe.kind().has_sites() {
        return Ok(());
    }
    let sites = probe
        .top_sites(top)
        .with_context(|| format!("{} site snapshot", probe.kind()))?;
    out.heading(&format!("[ Top {top} ]"))?;
    out.report_top(&sites, top)?;
    Ok(())
}

fn sample(backend: BackendKind, size: i64, top: usize, output: &OutputArgs) -> Result<()> {
    info!(%backend, size, "sampling");
    let mut probe = MemoryProbe::new(backend);
    // Tracing must be live before the workload allocates; a failure here is
    // reported after the workload so both outcomes are visible.
    let started = probe.start();

    let workload = run_workload(size)?;
    started.with_context(|| format!("starting {backend} backend"))?;

    let sample = probe
        .sample()
        .with_context(|| format!("{backend} backend sample"))?;
    let mut out = open_reporter(output)?;
    out.report(&sample)?;
    report_sites(&mut out, &mut probe, top)?;
    out.flush()?;

    drop(workload);
    Ok(())
}

fn compare(backend: BackendKind, size: i64, output: &OutputArgs) -> Result<()> {
    info!(%backend, size, "comparing");
    let mut probe = MemoryProbe::new(backend);
    let started = probe.start();
    let before = started.and_then(|()| probe.sample());

    let workload = run_workload(size)?;
    let before = before.with_context(|| format!("{backend} backend sample before workload"))?;
    let after = probe
        .sample()
        .with_context(|| format!("{backend} backend sample after workload"))?;

    let mut out = open_reporter(output)?;
    out.report(&before)?;
    out.report(&after)?;
    out.report_delta(&before, &after)?;
    out.flush()?;

    drop(workload);
    Ok(())
}

fn all(size: i64, top: usize, output: &OutputArgs) -> Result<()> {
    info!(size, "sampling every backend");
    let mut probes: Vec<MemoryProbe> = BackendKind::ALL.into_iter().map(MemoryProbe::new).collect();
    let mut failed = Vec::new();
    for probe in &mut probes {
        if let Err(e) = probe.start() {
            warn!(backend = %probe.kind(), error = %e, "backend could not start");
        }
    }

    let workload = run_workload(size)?;
    let mut out = open_reporter(output)?;
    for probe in &mut probes {
        let kind = probe.kind();
        match probe.sample() {
            Ok(sample) => {
                out.report(&sample)?;
                report_sites(&mut out, probe, top)?;
            }
            Err(e) => {
                warn!(backend = %kind, error = %e, "backend unavailable");
                failed.push(kind);
            }
        }
    }
    out.flush()?;
    drop(workload);

    ensure_any_sampled(probes.len(), &failed)
}

/// `all` fails only when no backend at all produced a sample.
fn ensure_any_sampled(attempted: usize, failed: &[BackendKind]) -> Result<()> {
    if attempted > 0 && failed.len() >= attempted {
        let names: Vec<&str> = failed.iter().map(|k| k.as_str()).collect();
        bail!("no backend could sample this process (tried {})", names.join(", "));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sample_defaults() {
        let cli = Cli::try_parse_from(["memprobe", "sample", "--backend", "process", "--size", "10000"])
            .unwrap();
        let Cmd::Sample {
            backend,
            workload,
            top,
            output,
        } = cli.cmd
        else {
            panic!("expected sample");
        };
        assert_eq!(backend, BackendOpt::Process);
        assert_eq!(workload.size, 10_000);
        assert_eq!(top, 10);
        assert_eq!(output.format, FormatOpt::Text);
        assert!(output.output.is_none());
        assert!(!output.log);
    }

    #[test]
    fn backend_names_are_kebab_case() {
        for (name, kind) in [
            ("rusage", BackendKind::Rusage),
            ("process", BackendKind::Process),
            ("heap-census", BackendKind::HeapCensus),
            ("alloc-tracing", BackendKind::AllocTracing),
        ] {
            let cli = Cli::try_parse_from(["memprobe", "compare", "--backend", name]).unwrap();
            let Cmd::Compare { backend, .. } = cli.cmd else {
                panic!("expected compare");
            };
            assert_eq!(BackendKind::from(backend), kind);
            assert_eq!(kind.as_str(), name);
        }
    }

    #[test]
    fn negative_size_parses_then_fails_in_workload() {
        let cli = Cli::try_parse_from(["memprobe", "all", "--size", "-5"]).unwrap();
        let Cmd::All { workload, .. } = cli.cmd else {
            panic!("expected all");
        };
        assert_eq!(workload.size, -5);
        let err = run_workload(workload.size).unwrap_err();
        assert!(format!("{err:#}").contains("invalid argument"));
    }

    #[test]
    fn non_numeric_size_is_rejected() {
        assert!(Cli::try_parse_from(["memprobe", "sample", "--size", "lots"]).is_err());
    }

    #[test]
    fn output_and_log_conflict() {
        assert!(
            Cli::try_parse_from(["memprobe", "sample", "--output", "r.txt", "--log"]).is_err()
        );
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("memprobe-cli-{name}-{}", std::process::id()))
    }

    fn file_output(path: &Path, format: FormatOpt) -> OutputArgs {
        OutputArgs {
            format,
            output: Some(path.to_path_buf()),
            log: false,
        }
    }

    #[test]
    fn all_fails_only_when_every_backend_failed() {
        assert!(ensure_any_sampled(4, &[]).is_ok());
        assert!(ensure_any_sampled(4, &[BackendKind::Rusage, BackendKind::Process]).is_ok());
        let err = ensure_any_sampled(4, &BackendKind::ALL).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no backend could sample"));
        assert!(msg.contains("heap-census"));
        assert!(ensure_any_sampled(1, &[BackendKind::Process]).is_err());
    }

    #[test]
    fn compare_writes_before_after_and_delta() {
        let dir = scratch_dir("compare");
        let path = dir.join("compare.txt");
        compare(BackendKind::HeapCensus, 20_000, &file_output(&path, FormatOpt::Text)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3, "{text}");
        assert!(lines[0].starts_with("[heap-census] resident="));
        assert!(lines[1].starts_with("[heap-census] resident="));
        assert!(lines[2].starts_with("[heap-census] resident +"), "{}", lines[2]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn all_reports_every_backend_that_sampled() {
        let dir = scratch_dir("all");
        let path = dir.join("all.jsonl");
        all(500, 0, &file_output(&path, FormatOpt::Json)).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let backends: Vec<String> = text
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["backend"].as_str().unwrap().to_owned()
            })
            .collect();
        // The tracking allocator is installed here, so both allocator
        // backends always sample; the OS ones depend on the host.
        assert!(backends.contains(&"heap-census".to_owned()));
        assert!(backends.contains(&"alloc-tracing".to_owned()));
        assert!(backends.len() <= BackendKind::ALL.len());
        let order: Vec<&str> = BackendKind::ALL
            .iter()
            .map(|k| k.as_str())
            .filter(|k| backends.iter().any(|b| b == k))
            .collect();
        assert_eq!(backends, order);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_sink_receives_report() {
        let dir = scratch_dir("sample");
        let path = dir.join("nested").join("report.jsonl");
        sample(BackendKind::HeapCensus, 100, 3, &file_output(&path, FormatOpt::Json)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(!lines.is_empty() && lines.len() <= 4);
        assert!(lines[0].contains("\"backend\":\"heap-census\""));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
