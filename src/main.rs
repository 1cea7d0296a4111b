//! `dashpass`: the dashboard server binary.
//!
//! Usage:
//!   dashpass serve [--config configuration.toml] [--host H] [--port P]
//!   dashpass providers [--config configuration.toml]

use clap::{Parser, Subcommand};
use dashpass::config::{Config, ConfigError, DEFAULT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// Single-sign-on dashboard.
#[derive(Parser, Debug)]
#[command(name = "dashpass", version, about = "Single-sign-on dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Path to the configuration file.
        #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Listen host (overrides `server.host`).
        #[arg(long)]
        host: Option<String>,

        /// Listen port (overrides `server.port`).
        #[arg(long)]
        port: Option<u16>,
    },
    /// List the configured login providers.
    Providers {
        /// Path to the configuration file.
        #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Option<Config> {
    match Config::load(path) {
        Ok(config) => Some(config),
        Err(e @ ConfigError::Missing(_)) => {
            tracing::error!("{e}; copy configuration.example.toml to get started");
            None
        }
        Err(e) => {
            tracing::error!("{e}");
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => {
            let Some(mut config) = load_config(&config) else {
                return ExitCode::FAILURE;
            };
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Err(e) = config.validate() {
                tracing::error!("{e}");
                return ExitCode::FAILURE;
            }
            if let Err(e) = dashpass::gateway::run_gateway(config).await {
                tracing::error!("Gateway failed: {e:#}");
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Command::Providers { config } => {
            let Some(config) = load_config(&config) else {
                return ExitCode::FAILURE;
            };
            for (name, provider) in &config.providers {
                println!("{name:<16} {:<8} {}", provider.kind(), provider.title().unwrap_or(name));
            }
            ExitCode::SUCCESS
        }
    }
}
