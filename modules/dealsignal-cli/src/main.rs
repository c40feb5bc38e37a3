use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dealsignal_common::Config;

mod exit;
mod health;
mod orchestrator;

use exit::ExitCode;
use orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "dealsignal",
    about = "Prospect-discovery pipeline: collect signals, score them, push qualified prospects to the CRM"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the named collectors (or all enabled ones).
    Collect {
        #[arg(long, value_delimiter = ',')]
        collectors: Option<Vec<String>>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        lookback_days: Option<i64>,
    },
    /// Push pending signals through the gate into the CRM.
    Process {
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Refresh the suppression cache from the CRM.
    Sync {
        #[arg(long)]
        ttl_days: Option<i64>,
        #[arg(long)]
        dry_run: bool,
    },
    /// sync, then collect, then process.
    Full {
        #[arg(long, value_delimiter = ',')]
        collectors: Option<Vec<String>>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        lookback_days: Option<i64>,
        #[arg(long)]
        limit: Option<i64>,
        #[arg(long)]
        ttl_days: Option<i64>,
    },
    /// Dump signal store statistics.
    Stats,
    /// Probe the store, every source, and the CRM schema.
    Health {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("dealsignal=info".parse().expect("static directive")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {e:#}");
            std::process::exit(ExitCode::ConfigError as i32);
        }
    };
    config.log_redacted();

    let orchestrator = match Orchestrator::initialize(config).await {
        Ok(orchestrator) => orchestrator,
        Err(code) => std::process::exit(code as i32),
    };

    // Ctrl-C flips the shared cancel flag; every phase unwinds cooperatively.
    let cancel = orchestrator.cancel_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Cancellation requested, finishing in-flight work");
            cancel.cancel();
        }
    });

    let code = match cli.command {
        Command::Collect {
            collectors,
            dry_run,
            lookback_days,
        } => {
            orchestrator
                .collect(collectors.as_deref(), dry_run, lookback_days)
                .await
        }
        Command::Process { limit, dry_run } => orchestrator.process(limit, dry_run).await,
        Command::Sync { ttl_days, dry_run } => orchestrator.sync(ttl_days, dry_run).await,
        Command::Full {
            collectors,
            dry_run,
            lookback_days,
            limit,
            ttl_days,
        } => {
            orchestrator
                .full(collectors.as_deref(), dry_run, lookback_days, limit, ttl_days)
                .await
        }
        Command::Stats => orchestrator.stats().await,
        Command::Health { json } => orchestrator.health(json).await,
    };

    std::process::exit(code as i32);
}
