//! `barge serve [--listen <maddr>] <file>...`

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use barge_core::addr::listen_addr;
use barge_core::config::BargeConfig;
use barge_core::identity::PeerIdentity;
use barge_services::{BlockStore, Provider};

pub async fn cmd_serve(config: &BargeConfig, listen: Option<&str>, files: &[PathBuf]) -> Result<()> {
    let identity = PeerIdentity::load_or_generate(&config.identity.key_path)
        .context("failed to load identity")?;
    tracing::info!(peer_id = %identity.peer_id(), "identity ready");

    let provider = Provider::new(identity.peer_id(), BlockStore::new());
    let mut roots = Vec::with_capacity(files.len());
    for path in files {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read file: {}", path.display()))?;
        let dag = provider
            .import(&data, config.serve.chunk_size)
            .with_context(|| format!("failed to import {}", path.display()))?;
        roots.push((path, dag.root));
    }

    let listen = listen.unwrap_or(config.serve.listen.as_str());
    let bind = listen_addr(listen)?;
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    let local = listener.local_addr()?;
    let dial = provider.dial_addr(local);

    for (path, root) in &roots {
        println!("{root}  {}", path.display());
    }
    println!("serving at {dial}");
    tracing::info!(addr = %dial, blocks = provider.store().count(), "provider listening");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(provider.serve(listener, shutdown.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    shutdown.cancel();
    server.await.context("provider task failed")?;
    Ok(())
}
