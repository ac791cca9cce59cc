//! parley: terminal client for Parley's realtime change feeds and presence.
//!
//! Loads the config, connects to the hosted project (or in-process
//! backends with `--offline`), and runs one command until Ctrl-C, after
//! which presence goes offline and every subscription is dropped.

mod backend;
mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::backend::Backend;
use crate::cli::Cli;

/// Filter used when neither the CLI, the config, nor RUST_LOG names one.
const DEFAULT_FILTER: &str = "parley=info";

/// Pick the first non-blank directive: CLI flag, config, RUST_LOG, default.
fn log_directive(cli_level: Option<&str>, config_level: Option<&str>, env: Option<&str>) -> String {
    [cli_level, config_level, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|level| !level.is_empty())
        .unwrap_or(DEFAULT_FILTER)
        .to_string()
}

fn init_logging(cli_level: Option<&str>, config_level: Option<&str>) {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = log_directive(cli_level, config_level, env.as_deref());
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = parley_config::load_config(cli.config.as_deref());
    let config_level = config.as_ref().ok().map(|c| c.logging.level.clone());
    init_logging(cli.log_level.as_deref(), config_level.as_deref());

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config");
            return ExitCode::FAILURE;
        }
    };

    let mut backend = match Backend::build(&config, cli.offline).await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start");
            return ExitCode::FAILURE;
        }
    };

    let outcome = commands::run(cli.command, &mut backend).await;
    let shutdown = backend.shutdown().await;

    match outcome.and(shutdown) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "parley exited with an error");
            ExitCode::FAILURE
        }
    }
}
