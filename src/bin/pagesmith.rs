//! pagesmith CLI Binary

use anyhow::Context;
use clap::Parser;
use pagesmith::cli::{Cli, RunContext};
use pagesmith::config::ConfigLoader;
use pagesmith::error::CommandError;
use pagesmith::logging::{init_logging, LoggingConfig};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    match run(cli).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            let command_error = e.downcast_ref::<CommandError>();
            if let Some(CommandError::Pipeline { summary, .. }) = command_error {
                println!("{}", summary);
            }
            let code = command_error.map_or(1, CommandError::exit_code);
            error!("Command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            process::exit(code);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let context = RunContext::new(cli.workspace.clone(), cli.config.clone())
        .with_context(|| format!("loading configuration for {}", cli.workspace.display()))?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight requests");
            on_signal.cancel();
        }
    });

    info!("pagesmith starting");
    let output = context.execute(&cli.command, cancel).await?;
    Ok(output)
}

/// Logging config from the config file, overridden by CLI flags.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    if !cli.verbose && cli.log_level.is_none() {
        return LoggingConfig {
            level: "off".to_string(),
            ..LoggingConfig::default()
        };
    }

    let loaded = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(&cli.workspace),
    };
    let mut config = loaded.map(|c| c.logging).unwrap_or_default();

    if let Some(level) = &cli.log_level {
        config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.format = format.clone();
    }
    config
}
