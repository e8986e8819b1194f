//! Workload generator for exercising CP maps spread over consensus groups.
//!
//! This binary provisions the maps, optionally preloads them, runs the
//! weighted operation mix from many concurrent workers, prints the aggregated
//! operation report and verifies that every map still holds data.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use cp_store::{CpSubsystem, MemoryCpSubsystem};
use cp_workload::{
    write_report, CpMapBenchmark, KeyMode, MapSelection, OperationWeights, RunReport,
    WorkloadConfig,
};

/// CLI entry point wrapper.
#[derive(Parser, Debug)]
#[command(name = "cp-workload")]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    Run(RunArgs),
}

/// CLI options for running the workload.
#[derive(Parser, Debug, Clone)]
struct RunArgs {
    /// Name used to prefix report log lines.
    #[arg(long, default_value = "CpMapTest")]
    name: String,

    /// Number of CP groups hosting the maps (0 = the default group only).
    #[arg(long, default_value_t = 0)]
    cp_groups: usize,

    /// Number of distinct maps.
    #[arg(long, default_value_t = 1)]
    maps: usize,

    /// Number of distinct keys per map; the key domain is [0, keys).
    #[arg(long, default_value_t = 1)]
    keys: usize,

    /// Number of distinct values workers choose from.
    #[arg(long, default_value_t = 100)]
    values_count: usize,

    /// Size in bytes of each value.
    #[arg(long, default_value_t = 100)]
    value_size_bytes: usize,

    /// Key size in bytes for prefixed keys (keys are half as many characters).
    #[arg(long, default_value_t = 100)]
    key_size_bytes: usize,

    #[arg(long, value_enum, default_value_t = KeyMode::Int)]
    key_mode: KeyMode,

    #[arg(long, value_enum, default_value_t = MapSelection::Random)]
    map_selection: MapSelection,

    /// Preload every key of every map before the workload starts.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    fill_on_prepare: bool,

    /// Number of concurrent workers.
    #[arg(long, default_value_t = 10)]
    threads: usize,

    /// Seed for values, keys and worker RNGs.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Total runtime of the workload phase.
    #[arg(long, default_value = "30s")]
    duration: humantime::Duration,

    /// Operations per worker; overrides --duration.
    #[arg(long)]
    iterations: Option<u64>,

    /// Upper bound for the preload phase.
    #[arg(long, default_value = "1h")]
    preload_timeout: humantime::Duration,

    /// Concurrent preload tasks (defaults to available parallelism).
    #[arg(long)]
    preload_threads: Option<usize>,

    /// Pause after setup so the CP subsystem can settle.
    #[arg(long, default_value = "0s")]
    stabilize: humantime::Duration,

    /// When true, any worker error fails the run.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    fail_fast: bool,

    #[arg(long, default_value_t = 0.0)]
    get_weight: f64,

    #[arg(long, default_value_t = 0.0)]
    put_weight: f64,

    #[arg(long, default_value_t = 0.0)]
    put_if_absent_weight: f64,

    #[arg(long, default_value_t = 1.0)]
    set_weight: f64,

    #[arg(long, default_value_t = 0.0)]
    remove_weight: f64,

    #[arg(long, default_value_t = 0.0)]
    delete_weight: f64,

    #[arg(long, default_value_t = 0.0)]
    cas_weight: f64,

    #[arg(long, default_value_t = 0.0)]
    set_then_delete_weight: f64,

    /// Simulated round-trip latency of the in-memory CP subsystem.
    #[arg(long, default_value = "0s")]
    store_latency: humantime::Duration,

    /// Write a JSON run report to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

impl RunArgs {
    fn config(&self) -> WorkloadConfig {
        let defaults = WorkloadConfig::default();
        WorkloadConfig {
            name: self.name.clone(),
            cp_groups: self.cp_groups,
            maps: self.maps,
            keys: self.keys,
            values_count: self.values_count,
            value_size_bytes: self.value_size_bytes,
            key_size_bytes: self.key_size_bytes,
            key_mode: self.key_mode,
            map_selection: self.map_selection,
            fill_on_prepare: self.fill_on_prepare,
            threads: self.threads,
            seed: self.seed,
            duration: self.duration.into(),
            iterations: self.iterations,
            preload_timeout: self.preload_timeout.into(),
            preload_threads: self.preload_threads.unwrap_or(defaults.preload_threads),
            stabilize: self.stabilize.into(),
            fail_fast: self.fail_fast,
            weights: OperationWeights {
                get: self.get_weight,
                put: self.put_weight,
                put_if_absent: self.put_if_absent_weight,
                set: self.set_weight,
                remove: self.remove_weight,
                delete: self.delete_weight,
                cas: self.cas_weight,
                set_then_delete: self.set_then_delete_weight,
            },
        }
    }
}

#[tokio::main]
/// Parse CLI args, initialize logging, and dispatch to the selected subcommand.
async fn main() -> anyhow::Result<()> {
    // Enable ANSI colors only when stdout is a terminal and NO_COLOR is unset.
    let ansi = std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    match args.cmd {
        // Run the workload against the in-process CP subsystem.
        Command::Run(args) => run(args).await,
    }
}

/// Drive every phase of the benchmark and write the optional report.
async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = args.config();
    config.validate()?;

    let store: Arc<dyn CpSubsystem> =
        Arc::new(MemoryCpSubsystem::with_latency(args.store_latency.into()));
    let bench = CpMapBenchmark::setup(config, store.as_ref()).await?;

    let preload = bench.prepare_with_shutdown(interrupted()).await;
    let outcome = bench.run(bench.config().budget()).await?;
    let scanned = bench.scan(&outcome).await;

    // The occupancy goes into the report even when a map came up empty.
    if let Some(out) = &args.out {
        let report = RunReport::new(&bench, preload, &outcome, scanned.as_ref().ok().cloned());
        write_report(out, &report)?;
        tracing::info!(path = %out.display(), "wrote run report");
    }
    scanned?.check(&bench.config().name, &outcome.aggregate)
}

/// Resolves on Ctrl-C; never resolves if the signal handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
