//! Stencil - fingerprinted build cache for generated projects
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use stencil::cli::{commands, Cli, Commands};
use stencil::config::ConfigManager;
use stencil::error::StencilResult;
use stencil::logging::{self, LogFormat};
use std::process::ExitCode;
use tracing::debug;

/// Exit code of `stencil poll` when the artifact is not built yet
const EXIT_NOT_READY: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> StencilResult<ExitCode> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    logging::init(cli.verbose, LogFormat::from_config(&config.general.log_format));
    debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Generate(args) => commands::generate(args, &config).await?,
        Commands::Start(args) => commands::start(args, &config, cli.config.as_deref()).await?,
        Commands::Poll(args) => {
            if !commands::poll(args, &config).await? {
                return Ok(ExitCode::from(EXIT_NOT_READY));
            }
        }
        Commands::Fingerprint(args) => commands::fingerprint(args).await?,
        Commands::Config(args) => commands::config(args, &config, &config_manager).await?,
    }

    Ok(ExitCode::SUCCESS)
}
