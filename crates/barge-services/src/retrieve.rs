//! One retrieval, end to end: connect, walk, report.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use barge_core::config::RetrievalConfig;
use barge_core::{ContentHash, PeerAddr};

use crate::error::RetrieveError;
use crate::progress::ProgressSink;
use crate::session::Session;
use crate::store::BlockStore;
use crate::walker::walk;

/// Summary of a successful retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieval {
    pub root: ContentHash,
    pub blocks: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Fetch the whole DAG under `root` from `peer`.
///
/// On success the progress sink is finalized and the populated store is
/// returned alongside the summary. There is no partial result.
pub async fn retrieve(
    root: ContentHash,
    peer: &PeerAddr,
    config: &RetrievalConfig,
    progress: Arc<dyn ProgressSink>,
) -> Result<(Retrieval, BlockStore), RetrieveError> {
    let started = Instant::now();
    let session = Session::connect(peer, config.connect_timeout()).await?;

    let store = BlockStore::new();
    let exchange = session.into_exchange(store.clone(), progress.clone(), config);

    tracing::info!(root = %root, concurrency = config.concurrency, "retrieval started");
    let stats = walk(exchange.clone(), root, config.concurrency, CancellationToken::new()).await?;
    drop(exchange);

    progress.finalize();
    let retrieval = Retrieval {
        root,
        blocks: stats.blocks,
        bytes: store.size(),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        root = %root,
        blocks = retrieval.blocks,
        bytes = retrieval.bytes,
        elapsed_ms = retrieval.elapsed.as_millis() as u64,
        "retrieval complete"
    );
    Ok((retrieval, store))
}
