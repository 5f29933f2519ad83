//! Ledger CLI - diagnostics for the LedgerLite host bridge
//!
//! Validates bridge configuration and runs the send pipeline end-to-end
//! against an in-process host.

mod cli;
mod commands;
mod config;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::check_config::run_check_config;
use crate::commands::simulate::run_simulate;
use crate::config::{load_config, resolve_config_path};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "ledger=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config);
    let config = load_config(config_path.as_deref())?;

    match cli.command {
        Commands::CheckConfig { json } => {
            run_check_config(config_path.as_deref(), &config, json)?;
        }
        Commands::Simulate(args) => run_simulate(&args, &config).await?,
    }

    Ok(())
}
