//! revdoc CLI Binary
//!
//! Command-line access to a sled-backed revdoc store.

use anyhow::Context;
use clap::Parser;
use revdoc::cli::{map_error, Cli, RunContext};
use revdoc::config::ConfigLoader;
use revdoc::logging::{init_logging, LoggingConfig};
use std::process::ExitCode;
use tracing::{error, info};

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<String> {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    init_logging(Some(&logging_config)).context("Failed to initialize logging")?;
    info!("revdoc CLI starting");

    let context = RunContext::new(&cli.workspace, cli.config.as_deref(), cli.store.clone())
        .map_err(|e| {
            error!("Error opening store: {}", e);
            anyhow::anyhow!(map_error(&e))
        })?;

    let output = context.execute(&cli.command).map_err(|e| {
        error!("Command failed: {}", e);
        anyhow::anyhow!(map_error(&e))
    })?;
    info!("Command completed successfully");
    Ok(output)
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = match cli.config {
        Some(ref config_path) => ConfigLoader::load_from_file(config_path)
            .map(|c| c.logging)
            .unwrap_or_default(),
        None => ConfigLoader::load(&cli.workspace)
            .map(|c| c.logging)
            .unwrap_or_default(),
    };

    // Quiet unless asked: command output goes to stdout.
    if cli.log_level.is_none() && !cli.verbose {
        config.level = "warn".to_string();
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }

    config
}
