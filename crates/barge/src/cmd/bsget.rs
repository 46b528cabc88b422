//! `barge bsget <hash> <peer> [-o <path>]`

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use barge_core::addr::parse_content_hash;
use barge_core::config::RetrievalConfig;
use barge_core::PeerAddr;
use barge_services::{materialize, retrieve, ByteCounter};

pub async fn cmd_bsget(
    hash: &str,
    peer: &str,
    output: Option<&Path>,
    config: &RetrievalConfig,
) -> Result<()> {
    // Both are address errors, raised before any connection attempt.
    let root = parse_content_hash(hash)?;
    let peer = PeerAddr::parse(peer)?;

    let progress = Arc::new(ByteCounter::new());
    let (retrieval, store) = retrieve(root, &peer, config, progress).await?;

    if let Some(path) = output {
        let path_buf = path.to_path_buf();
        tokio::task::spawn_blocking(move || materialize(&store, root, &path_buf))
            .await
            .context("materialize task failed")?
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!("CIDs retrieved successfully");
    println!("  root:    {}", retrieval.root);
    println!("  blocks:  {}", retrieval.blocks);
    println!("  bytes:   {}", retrieval.bytes);
    println!("  elapsed: {:.2}s", retrieval.elapsed.as_secs_f64());
    if let Some(path) = output {
        println!("  output:  {}", path.display());
    }
    Ok(())
}
