//! Concurrent DAG walker.
//!
//! One coordinator owns the work queue and a `JoinSet` of at most
//! `concurrency` workers. A worker fetches one block, decodes it, and
//! claims each child in the visited set; only claimed children come back
//! to the coordinator for queueing, so every hash is fetched at most once.
//!
//! The first failure cancels the shared token. No new work starts after
//! that, and the walk returns only once every worker has finished.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use barge_core::{dag, Block, ContentHash};

use crate::error::RetrieveError;
use crate::visited::VisitedSet;

/// Anything that can produce a verified block for a hash.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn fetch(
        &self,
        hash: ContentHash,
        cancel: &CancellationToken,
    ) -> Result<Block, RetrieveError>;
}

/// Totals for a finished walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Unique blocks visited.
    pub blocks: usize,
    /// Sum of their sizes.
    pub bytes: u64,
}

struct Visit {
    bytes: u64,
    children: Vec<ContentHash>,
}

/// Walk the DAG under `root`, fetching each unique block once.
pub async fn walk<S>(
    source: Arc<S>,
    root: ContentHash,
    concurrency: usize,
    cancel: CancellationToken,
) -> Result<WalkStats, RetrieveError>
where
    S: BlockSource + ?Sized + 'static,
{
    let concurrency = concurrency.max(1);
    let visited = VisitedSet::new();
    let mut queue = VecDeque::new();
    let mut workers = JoinSet::new();
    let mut stats = WalkStats::default();
    let mut failure: Option<RetrieveError> = None;

    if visited.visit(root) {
        queue.push_back(root);
    }

    loop {
        while failure.is_none() && !cancel.is_cancelled() && workers.len() < concurrency {
            let Some(hash) = queue.pop_front() else {
                break;
            };
            workers.spawn(visit(
                source.clone(),
                visited.clone(),
                hash,
                cancel.clone(),
            ));
        }

        let Some(joined) = workers.join_next().await else {
            break;
        };

        match joined {
            Ok(Ok(done)) => {
                stats.blocks += 1;
                stats.bytes += done.bytes;
                queue.extend(done.children);
            }
            Ok(Err(RetrieveError::Cancelled)) => {}
            Ok(Err(e)) => {
                if failure.is_none() {
                    tracing::warn!(error = %e, in_flight = workers.len(), "walk failed, cancelling");
                    cancel.cancel();
                    failure = Some(e);
                }
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    std::panic::resume_unwind(join_err.into_panic());
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }
    if cancel.is_cancelled() {
        return Err(RetrieveError::Cancelled);
    }

    tracing::debug!(blocks = stats.blocks, bytes = stats.bytes, "walk complete");
    Ok(stats)
}

async fn visit<S>(
    source: Arc<S>,
    visited: VisitedSet,
    hash: ContentHash,
    cancel: CancellationToken,
) -> Result<Visit, RetrieveError>
where
    S: BlockSource + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(RetrieveError::Cancelled);
    }

    let block = source.fetch(hash, &cancel).await?;
    let node = dag::decode(&block).map_err(|source| RetrieveError::Decode { hash, source })?;

    let children: Vec<ContentHash> = node
        .links
        .iter()
        .map(|link| link.hash)
        .filter(|child| visited.visit(*child))
        .collect();

    tracing::debug!(
        hash = %hash,
        links = node.links.len(),
        new = children.len(),
        bytes = block.len(),
        "block visited"
    );

    Ok(Visit {
        bytes: block.len() as u64,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MissReason;
    use barge_core::{Codec, Link, Node};
    use dashmap::DashMap;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves blocks from a map, counting fetches and peak concurrency.
    #[derive(Default)]
    struct MockSource {
        blocks: HashMap<ContentHash, Block>,
        fetches: DashMap<ContentHash, usize>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    impl MockSource {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        /// Serve `block` under its own hash.
        fn add(&mut self, block: Block) -> ContentHash {
            let hash = *block.hash();
            self.blocks.insert(hash, block);
            hash
        }

        /// Serve `block` under an arbitrary hash, for shapes real hashes
        /// cannot form.
        fn add_as(&mut self, hash: ContentHash, block: Block) {
            self.blocks.insert(hash, block);
        }

        fn total_fetches(&self) -> usize {
            self.fetches.iter().map(|e| *e.value()).sum()
        }

        fn max_fetches_per_hash(&self) -> usize {
            self.fetches.iter().map(|e| *e.value()).max().unwrap_or(0)
        }
    }

    #[async_trait]
    impl BlockSource for MockSource {
        async fn fetch(
            &self,
            hash: ContentHash,
            cancel: &CancellationToken,
        ) -> Result<Block, RetrieveError> {
            *self.fetches.entry(hash).or_default() += 1;
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let outcome = tokio::select! {
                _ = tokio::time::sleep(self.delay) => {
                    self.blocks.get(&hash).cloned().ok_or(RetrieveError::MissingBlock {
                        hash,
                        reason: MissReason::DontHave,
                    })
                }
                _ = cancel.cancelled() => Err(RetrieveError::Cancelled),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        }
    }

    fn node(links: &[ContentHash]) -> Block {
        Node {
            links: links.iter().map(|h| Link::new(*h, 0)).collect(),
            data: bytes::Bytes::new(),
        }
        .to_block()
        .unwrap()
    }

    fn leaf(s: &str) -> Block {
        Block::new(Codec::Raw, s.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn leaf_root_is_one_fetch() {
        let mut source = MockSource::default();
        let root = source.add(leaf("just a leaf"));
        let source = Arc::new(source);

        let stats = walk(source.clone(), root, 2, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats, WalkStats { blocks: 1, bytes: 11 });
        assert_eq!(source.total_fetches(), 1);
    }

    #[tokio::test]
    async fn shared_child_is_fetched_once() {
        let mut source = MockSource::default();
        let z = source.add(leaf("z"));
        let y = source.add(leaf("y"));
        let x_block = node(&[z]);
        let x = source.add(x_block.clone());
        let root_block = node(&[x, y, z]);
        let root = source.add(root_block.clone());
        let source = Arc::new(source);

        let stats = walk(source.clone(), root, 2, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(source.total_fetches(), 4);
        assert_eq!(source.max_fetches_per_hash(), 1);
        assert_eq!(stats.blocks, 4);
        assert_eq!(
            stats.bytes,
            (root_block.len() + x_block.len() + 1 + 1) as u64
        );
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_concurrency() {
        let mut source = MockSource::with_delay(Duration::from_millis(20));
        let leaves: Vec<_> = (0..20).map(|i| source.add(leaf(&format!("leaf {i}")))).collect();
        let root = source.add(node(&leaves));
        let source = Arc::new(source);

        walk(source.clone(), root, 3, CancellationToken::new())
            .await
            .unwrap();

        let peak = source.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak} exceeded the bound");
        assert!(peak > 1, "walk never ran fetches in parallel");
        assert_eq!(source.total_fetches(), 21);
    }

    #[tokio::test]
    async fn concurrency_one_terminates() {
        let mut source = MockSource::default();
        let a = source.add(leaf("a"));
        let b = source.add(leaf("b"));
        let mid = source.add(node(&[a, b]));
        let root = source.add(node(&[mid, a]));
        let source = Arc::new(source);

        let stats = walk(source.clone(), root, 1, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.blocks, 4);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let mut source = MockSource::default();
        let root = source.add(leaf("solo"));

        let stats = walk(Arc::new(source), root, 0, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.blocks, 1);
    }

    #[tokio::test]
    async fn cycles_and_self_links_terminate() {
        let mut source = MockSource::default();
        let root = ContentHash::of(Codec::Node, b"root");
        let a = ContentHash::of(Codec::Node, b"a");
        source.add_as(root, node(&[a]));
        source.add_as(a, node(&[root, a]));
        let source = Arc::new(source);

        let stats = walk(source.clone(), root, 2, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.blocks, 2);
        assert_eq!(source.max_fetches_per_hash(), 1);
    }

    #[tokio::test]
    async fn first_failure_wins_and_workers_drain() {
        let mut source = MockSource::with_delay(Duration::from_millis(10));
        let mut children: Vec<_> = (0..10).map(|i| source.add(leaf(&format!("ok {i}")))).collect();
        let missing = ContentHash::of(Codec::Raw, b"missing");
        children.insert(3, missing);
        let root = source.add(node(&children));
        let source = Arc::new(source);
        let cancel = CancellationToken::new();

        let err = walk(source.clone(), root, 4, cancel.clone())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            RetrieveError::MissingBlock {
                hash: missing,
                reason: MissReason::DontHave
            }
        );
        assert!(cancel.is_cancelled());
        assert_eq!(source.in_flight.load(Ordering::SeqCst), 0);
        assert!(source.total_fetches() < 12);
    }

    #[tokio::test]
    async fn undecodable_node_is_a_decode_error() {
        let mut source = MockSource::default();
        let bad = Block::new(Codec::Node, &b"not a node"[..]);
        let root = source.add(bad);

        let err = walk(Arc::new(source), root, 2, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrieveError::Decode { hash, .. } if hash == root));
    }

    #[tokio::test]
    async fn external_cancel_is_reported() {
        let mut source = MockSource::with_delay(Duration::from_secs(10));
        let root = source.add(leaf("slow"));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(walk(Arc::new(source), root, 2, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        assert_eq!(handle.await.unwrap(), Err(RetrieveError::Cancelled));
    }
}
