// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! `graph-sync` operator CLI.
//!
//! Configuration comes from the environment (see [`graph_sync::config`]).

use clap::{Parser, Subcommand};
use graph_sync::model_hash::compute_file_hash;
use graph_sync::{SyncConfig, SyncError, SyncService};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "graph-sync", version, about = "Two-node graph sync and failover")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service (health monitor and scheduler) until Ctrl-C.
    Run,
    /// Run one sync cycle and print the result as JSON.
    Sync,
    /// Print health, watermarks and node counts as JSON.
    Status,
    /// Print the SHA-256 digest of a model file.
    Hash { path: PathBuf },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "graph-sync failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command) -> Result<ExitCode, SyncError> {
    match command {
        Command::Hash { path } => {
            println!("{}", compute_file_hash(&path).await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Sync => {
            let service = SyncService::open(SyncConfig::from_env()?).await?;
            let result = service.sync_now().await?;
            service.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(if result.overall_success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Status => {
            let service = SyncService::open(SyncConfig::from_env()?).await?;
            service.monitor().check_once().await;
            let status = service.status().await;
            service.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Run => {
            let service = SyncService::open(SyncConfig::from_env()?).await?;
            service.start().await?;
            info!(node_id = %service.node_id(), "graph-sync running; Ctrl-C to stop");

            tokio::signal::ctrl_c().await?;
            info!("Shutdown signal received");
            service.shutdown().await;
            Ok(ExitCode::SUCCESS)
        }
    }
}
