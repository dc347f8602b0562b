use benchmesh::config::RunConfig;
use benchmesh::console::{Context, ContextOptions};
use benchmesh::error::user_friendly_message;
use benchmesh::job::StaticRunner;
use benchmesh::registry::Registry;
use benchmesh::rpc::HttpConnector;
use benchmesh::bench::Coordinator;
use benchmesh::{BenchError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "benchmesh")]
#[command(about = "Run benchmark suites across a pool of remote workers")]
struct Cli {
    /// Path to a TOML run configuration
    #[arg(short, long, env = "BENCHMESH_CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Suite to run; repeat for several, omit to run every registered suite
    #[arg(short, long = "suite")]
    suites: Vec<String>,

    /// Run only this benchmark of the suite
    #[arg(short, long)]
    benchmark: Option<String>,

    /// Number of workers per suite
    #[arg(short, long)]
    workers: Option<usize>,

    /// Client-side parallelism on each worker
    #[arg(short, long)]
    parallelism: Option<u32>,

    /// Total iterations per benchmark, split across workers
    #[arg(short, long, conflicts_with = "duration")]
    iterations: Option<u64>,

    /// Run each benchmark for a fixed time on every worker (e.g. "30s")
    #[arg(short, long, value_parser = humantime::parse_duration)]
    duration: Option<Duration>,

    /// Fail when a benchmark's mean latency reaches this value (e.g. "10ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    max_latency: Option<Duration>,

    /// Argument passed to every worker, as key=value
    #[arg(short, long = "arg", value_parser = parse_key_value)]
    args: Vec<(String, String)>,

    /// Run identifier; generated when absent
    #[arg(long)]
    id: Option<String>,

    /// Show debug logs and worker output
    #[arg(short, long)]
    verbose: bool,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {}", raw))
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)?,
            None => RunConfig::load_default()?,
        };

        if let Some(id) = self.id {
            config = config.with_id(id);
        }
        if !self.suites.is_empty() {
            config.suites = self.suites;
        }
        if let Some(benchmark) = self.benchmark {
            config = config.with_benchmark(benchmark);
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(parallelism) = self.parallelism {
            config = config.with_parallelism(parallelism);
        }
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(duration) = self.duration {
            config = config.with_duration(duration);
        }
        if let Some(max_latency) = self.max_latency {
            config = config.with_max_latency(max_latency);
        }
        for (key, value) in self.args {
            config = config.with_arg(key, value);
        }
        Ok(config)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "benchmesh=debug" } else { "benchmesh=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config: RunConfig, ctx: &Context) -> Result<i32> {
    let registry = Arc::new(Registry::from_map(&config.registry)?);
    let connector = Arc::new(HttpConnector::new()?);
    let coordinator = Coordinator::new(config, registry, StaticRunner::factory(), connector)?;

    tracing::info!(
        id = %coordinator.config().id,
        suites = ?coordinator.suites()?,
        workers = coordinator.config().workers,
        "starting benchmark run"
    );
    coordinator.run(ctx).await
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    init_tracing(verbose);

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", user_friendly_message(&err));
            return ExitCode::FAILURE;
        }
    };

    let ctx = Context::stdout(ContextOptions::default().with_verbose(verbose));
    let outcome = run(config, &ctx).await;
    ctx.close().await;

    match outcome {
        Ok(0) => ExitCode::SUCCESS,
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            if let BenchError::ThresholdViolation { .. } = err {
                tracing::warn!(error = %err, "latency threshold violated");
            }
            eprintln!("Error: {}", user_friendly_message(&err));
            ExitCode::FAILURE
        }
    }
}
