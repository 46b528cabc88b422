//! barge — single-peer content-addressed block retrieval.

use anyhow::{Context, Result};
use clap::Parser;

use barge_core::config::BargeConfig;

mod cli;
mod cmd;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load config
    if let Err(e) = BargeConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = BargeConfig::load().context("failed to load config")?;

    match cli.command {
        Command::Bsget {
            hash,
            peer,
            output,
            concurrency,
        } => {
            if let Some(n) = concurrency {
                config.retrieval.concurrency = n;
            }
            config.validate()?;
            cmd::bsget::cmd_bsget(&hash, &peer, output.as_deref(), &config.retrieval).await
        }
        Command::Serve { listen, files } => {
            cmd::serve::cmd_serve(&config, listen.as_deref(), &files).await
        }
    }
}
