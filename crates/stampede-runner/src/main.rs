//! Stampede
//!
//! Runs concurrent MongoDB sessions against one target and reports
//! aggregate latency and throughput.

use std::path::PathBuf;

use clap::Parser;
use stampede_common::config::{redact_uri, RunnerConfig};
use stampede_common::registry::ModuleRegistry;
use stampede_mongo::{ExecContext, MongoDialer};
use stampede_runner::{init_logging, LoadRunner, RunReport};
use tracing::{info, warn};

/// Stampede - concurrent MongoDB aggregation load generator
#[derive(Parser, Debug)]
#[command(name = "stampede")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/stampede.toml")]
    config: PathBuf,

    /// Override the connection string
    #[arg(long)]
    uri: Option<String>,

    /// Override the number of concurrent sessions
    #[arg(short, long)]
    sessions: Option<usize>,

    /// Override the aggregates issued per session
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Also print metrics in Prometheus text format
    #[arg(long)]
    prometheus: bool,

    /// Print the effective configuration as TOML, then exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = load_config(&args)?;

    if args.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let _log_guard = init_logging(&config.logging, args.verbose)?;

    if let Err(errors) = config.validate() {
        for err in &errors {
            tracing::error!("Config validation error: {}", err);
        }
        anyhow::bail!(
            "Configuration validation failed with {} error(s). \
             See log output above for details.",
            errors.len()
        );
    }

    info!(
        target_uri = %redact_uri(&config.target.uri),
        config = %args.config.display(),
        "Stampede starting"
    );

    let mut registry = ModuleRegistry::new();
    stampede_mongo::register(&mut registry, MongoDialer::default())?;

    let runner = LoadRunner::<MongoDialer>::new(registry, config)?;
    spawn_shutdown_listener(runner.root_context());

    let report = runner.run().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    if args.prometheus {
        print!("{}", runner.metrics().export_prometheus());
    }

    Ok(())
}

/// Cancel the run on SIGINT or SIGTERM
fn spawn_shutdown_listener(root: ExecContext) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for ctrl+c");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, stopping sessions..."),
            _ = terminate => info!("Received SIGTERM, stopping sessions..."),
        }
        root.cancel();
    });
}

fn load_config(args: &Args) -> anyhow::Result<RunnerConfig> {
    let mut config = RunnerConfig::load_or_default(&args.config)?;

    // Apply command line overrides
    if let Some(uri) = &args.uri {
        config.target.uri = uri.clone();
    }
    if let Some(sessions) = args.sessions {
        config.load.sessions = sessions;
    }
    if let Some(iterations) = args.iterations {
        config.load.iterations = iterations;
    }

    // Apply environment variable overrides (highest priority)
    if let Ok(val) = std::env::var("STAMPEDE_URI") {
        config.target.uri = val;
    }
    if let Ok(val) = std::env::var("STAMPEDE_SESSIONS") {
        if let Ok(n) = val.parse() { config.load.sessions = n; }
    }
    if let Ok(val) = std::env::var("STAMPEDE_ITERATIONS") {
        if let Ok(n) = val.parse() { config.load.iterations = n; }
    }
    if let Ok(val) = std::env::var("STAMPEDE_LOG_LEVEL") {
        config.logging.level = val;
    }

    Ok(config)
}

fn print_summary(report: &RunReport) {
    let m = &report.metrics;
    println!();
    println!("  sessions        {} ({} completed, {} connect failed, {} cancelled, {} panicked)",
        report.sessions, report.completed, report.connect_failed, report.cancelled, report.panicked);
    println!("  elapsed         {}", humantime::format_duration(report.elapsed));
    println!("  aggregates      {} ({} failed)", m.aggregates_total, m.aggregates_failed);
    println!("  documents       {}", m.documents_returned);
    println!("  throughput      {:.1} agg/s", report.throughput());
    println!("  latency mean    {:.2} ms", m.latency.mean_ms);
    println!("  latency p50     {:.2} ms", m.latency.p50_ms);
    println!("  latency p95     {:.2} ms", m.latency.p95_ms);
    println!("  latency p99     {:.2} ms", m.latency.p99_ms);
    println!("  latency max     {:.2} ms", m.latency.max_ms);
    println!();
}
