mod classify;
mod config;
mod extract;
mod parser;
mod render;
mod runner;
mod schema;
mod snapshot;
mod store;

use clap::Parser;
use config::{BenchmarkConfig, ConfigError, HarnessConfig};
use parser::ParseError;
use render::RenderError;
use runner::{RunError, RunOptions};
use schema::MetricSchema;
use snapshot::{Snapshot, SnapshotError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use store::MetricsStore;
use tracing_subscriber::EnvFilter;

/// A Rust CLI tool that builds native benchmark programs, runs them,
/// parses their output into metrics, and renders comparison charts.
#[derive(Parser, Debug)]
#[command(name = "benchplot", version, about)]
pub struct Cli {
    /// Benchmarks to run (default: every benchmark in the config)
    #[arg(value_name = "BENCHMARK")]
    benchmarks: Vec<String>,

    /// Config file path
    #[arg(short, long, default_value = "benchplot.toml")]
    config: PathBuf,

    /// Output directory (overrides config)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Kill the benchmark after this many seconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Parse a saved stdout transcript instead of building and running.
    /// A `.json` snapshot is re-rendered without reparsing
    #[arg(long, value_name = "FILE")]
    transcript: Option<PathBuf>,

    /// Run the existing executable without rebuilding it
    #[arg(long)]
    skip_build: bool,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-line parse decisions, child process details)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors on stderr
    #[arg(short, long)]
    quiet: bool,
}

/// Top-level failure, tagged with the stage that produced it.
#[derive(Debug)]
enum HarnessError {
    Config(ConfigError),
    Usage(String),
    Run {
        benchmark: String,
        source: RunError,
    },
    Transcript {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(ParseError),
    Render(RenderError),
    Snapshot(SnapshotError),
}

impl std::fmt::Display for HarnessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HarnessError::Config(e) => write!(f, "config: {e}"),
            HarnessError::Usage(msg) => write!(f, "{msg}"),
            HarnessError::Run { benchmark, source } => {
                write!(f, "{} stage failed for {benchmark}: {source}", source.stage())
            }
            HarnessError::Transcript { path, source } => {
                write!(f, "failed to read transcript {}: {}", path.display(), source)
            }
            HarnessError::Parse(e) => write!(f, "parse stage failed: {e}"),
            HarnessError::Render(e) => write!(f, "render stage failed: {e}"),
            HarnessError::Snapshot(e) => write!(f, "snapshot failed: {e}"),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HarnessError::Config(e) => Some(e),
            HarnessError::Usage(_) => None,
            HarnessError::Run { source, .. } => Some(source),
            HarnessError::Transcript { source, .. } => Some(source),
            HarnessError::Parse(e) => Some(e),
            HarnessError::Render(e) => Some(e),
            HarnessError::Snapshot(e) => Some(e),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(&cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> Result<(), HarnessError> {
    let mut config = HarnessConfig::load(&cli.config).map_err(HarnessError::Config)?;
    if let Some(dir) = &cli.output_dir {
        config.harness.output_dir = dir.clone();
    }
    if let Some(secs) = cli.timeout {
        config.harness.timeout_secs = Some(secs);
    }

    let selected = select_benchmarks(&config, &cli.benchmarks)?;
    if cli.transcript.is_some() && selected.len() != 1 {
        return Err(HarnessError::Usage(format!(
            "--transcript needs exactly one benchmark, {} selected",
            selected.len()
        )));
    }

    if cli.dry_run {
        print_settings(&config, &selected);
        return Ok(());
    }

    for bench in selected {
        let schema = bench.schema();
        let store = match &cli.transcript {
            Some(path) => parse_saved_transcript(&config, &schema, path)?,
            None => run_live(&config, bench, &schema, cli.skip_build).await?,
        };
        let chart = publish(&config.harness.output_dir, bench, &schema, &store)?;
        println!("Plot saved to {}", chart.display());
    }
    Ok(())
}

/// Benchmarks named on the command line, in that order, or all of them.
fn select_benchmarks<'c>(
    config: &'c HarnessConfig,
    names: &[String],
) -> Result<Vec<&'c BenchmarkConfig>, HarnessError> {
    if names.is_empty() {
        if config.benchmarks.is_empty() {
            return Err(HarnessError::Usage(
                "no benchmarks configured".to_string(),
            ));
        }
        return Ok(config.benchmarks.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            config.benchmark(name).ok_or_else(|| {
                let known: Vec<&str> = config.benchmarks.iter().map(|b| b.name.as_str()).collect();
                HarnessError::Usage(format!(
                    "unknown benchmark {name:?} (configured: {})",
                    known.join(", ")
                ))
            })
        })
        .collect()
}

async fn run_live(
    config: &HarnessConfig,
    bench: &BenchmarkConfig,
    schema: &MetricSchema,
    skip_build: bool,
) -> Result<MetricsStore, HarnessError> {
    let opts = RunOptions {
        build: &config.build,
        workdir: &config.harness.workdir,
        output_dir: &config.harness.output_dir,
        timeout: config.harness.timeout_secs.map(Duration::from_secs),
        orphan_rows: config.harness.orphan_rows,
        save_transcript: config.harness.save_transcript,
        skip_build,
    };
    let outcome = runner::run_benchmark(bench, schema, &opts)
        .await
        .map_err(|e| HarnessError::Run {
            benchmark: bench.name.clone(),
            source: e,
        })?;
    if let Some(path) = &outcome.transcript {
        tracing::info!(path = %path.display(), "transcript saved");
    }
    if outcome.report.malformed > 0 || outcome.report.orphans > 0 {
        tracing::warn!(
            benchmark = %bench.name,
            malformed = outcome.report.malformed,
            orphans = outcome.report.orphans,
            "some output rows were skipped"
        );
    }
    Ok(outcome.store)
}

fn parse_saved_transcript(
    config: &HarnessConfig,
    schema: &MetricSchema,
    path: &Path,
) -> Result<MetricsStore, HarnessError> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let saved = snapshot::read(path).map_err(HarnessError::Snapshot)?;
        if saved.kind != schema.kind {
            return Err(HarnessError::Usage(format!(
                "{} holds a {} snapshot, expected {}",
                path.display(),
                saved.kind,
                schema.kind
            )));
        }
        tracing::info!(path = %path.display(), generated_at = %saved.generated_at, "loaded snapshot");
        return Ok(saved.to_store());
    }

    let text = std::fs::read_to_string(path).map_err(|e| HarnessError::Transcript {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (store, _) = parser::parse_transcript(schema, config.harness.orphan_rows, &text)
        .map_err(HarnessError::Parse)?;
    Ok(store)
}

/// Render the chart and write the snapshot beside it.
fn publish(
    output_dir: &Path,
    bench: &BenchmarkConfig,
    schema: &MetricSchema,
    store: &MetricsStore,
) -> Result<PathBuf, HarnessError> {
    let chart = render::render(schema, store, output_dir).map_err(HarnessError::Render)?;
    let snapshot_path = snapshot::snapshot_path(output_dir, &schema.chart_file);
    snapshot::write(&snapshot_path, &Snapshot::new(&bench.name, schema, store))
        .map_err(HarnessError::Snapshot)?;
    tracing::debug!(path = %snapshot_path.display(), "snapshot written");
    Ok(chart)
}

fn print_settings(config: &HarnessConfig, selected: &[&BenchmarkConfig]) {
    println!("benchplot v{}", env!("CARGO_PKG_VERSION"));
    println!("Output directory: {}", config.harness.output_dir.display());
    println!("Working directory: {}", config.harness.workdir.display());
    match config.harness.timeout_secs {
        Some(secs) => println!("Timeout: {secs}s"),
        None => println!("Timeout: none"),
    }
    println!("Orphan rows: {:?}", config.harness.orphan_rows);
    for bench in selected {
        let schema = bench.schema();
        let args = bench.build_args.as_deref().unwrap_or(&config.build.args);
        println!();
        println!("[{}] kind={}", bench.name, bench.kind);
        println!(
            "  build: {} {}",
            config.build.command,
            args.join(" ")
                .replace("{source}", &bench.source.to_string_lossy())
                .replace("{executable}", &bench.executable.to_string_lossy())
        );
        println!("  run:   {}", config.harness.workdir.join(&bench.executable).display());
        println!(
            "  chart: {}",
            config.harness.output_dir.join(&schema.chart_file).display()
        );
    }
    println!("\nDry run: config validated, nothing was run.");
}
