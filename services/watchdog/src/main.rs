//! Bot Watchdog - keeps the trading bot's container stack alive
//!
//! Each cycle:
//! 1. Checks the container runtime service, starting it if inactive
//! 2. Checks the bot's compose deployment, restarting it if down
//! 3. Snapshots host memory and disk
//! 4. Probes the exchange API
//! 5. Prints a report

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};

use bot_watchdog::{Collaborators, ReportFormat, Watchdog, WatchdogConfig};

#[derive(Parser, Debug)]
#[command(name = "bot-watchdog", version, about = "Watchdog for the trading bot container stack")]
struct Cli {
    /// Config file (TOML). Defaults to <config_dir>/bot-watchdog/watchdog.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single cycle and exit (default)
    Once,
    /// Run cycles serially on a fixed interval until Ctrl-C
    Watch {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the reports
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let mut config = WatchdogConfig::load(cli.config.as_deref())?;
    if cli.json {
        config.report.format = ReportFormat::Json;
    }

    match cli.command.unwrap_or(Command::Once) {
        Command::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Command::Once => {
            let watchdog = build(config)?;
            watchdog.run_cycle().await;
        }
        Command::Watch { interval_secs } => {
            if interval_secs == 0 {
                anyhow::bail!("--interval-secs must be positive");
            }
            let watchdog = build(config)?;
            info!("Watching every {}s", interval_secs);
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            watchdog
                .watch(Duration::from_secs(interval_secs), shutdown)
                .await;
        }
    }

    Ok(())
}

fn build(config: WatchdogConfig) -> anyhow::Result<Watchdog> {
    info!(
        "Watching runtime {} and deployment {}",
        config.runtime_service,
        config.deployment.dir.display()
    );
    let deps = Collaborators::from_config(&config)?;
    Ok(Watchdog::new(config, deps))
}
