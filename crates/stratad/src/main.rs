//! stratad — the Strata daemon.
//!
//! Assembles the control plane in one process:
//! - Tag store and job store (redb)
//! - Provider capability set
//! - Orchestrator managers
//! - Job engine worker pool
//!
//! # Usage
//!
//! ```text
//! stratad --config /etc/strata/strata.toml check-config
//! stratad --config /etc/strata/strata.toml standalone --data-dir /var/lib/strata
//! stratad --config strata.toml run-jobs --requests requests.json
//! ```

mod standalone;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use strata_core::StrataConfig;

#[derive(Parser)]
#[command(name = "stratad", about = "Strata control plane daemon")]
struct Cli {
    /// Path to strata.toml.
    #[arg(long, global = true, default_value = "/etc/strata/strata.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the job engine until interrupted.
    Standalone {
        /// Overrides `storage.data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Submit a JSON array of job requests, wait for them, and print the
    /// finished job records.
    RunJobs {
        /// File holding the requests.
        #[arg(long)]
        requests: PathBuf,

        /// Overrides `storage.data_dir`.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Parse and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,stratad=debug,strata=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = StrataConfig::from_file(&cli.config)?;

    match cli.command {
        Command::Standalone { data_dir } => {
            standalone::run(config, data_dir).await
        }
        Command::RunJobs { requests, data_dir } => {
            standalone::run_jobs(config, data_dir, &requests).await
        }
        Command::CheckConfig => {
            info!(path = ?cli.config, instance = %config.instance.name, "configuration is valid");
            Ok(())
        }
    }
}
