//! Content-addressed block store.
//!
//! Blocks are keyed by content hash and held in memory for the lifetime
//! of one command. Entries are immutable: if the hash is present, the bytes
//! are correct. No eviction, no invalidation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use barge_core::{Block, ContentHash};

/// Shared handle to the session's blocks. Clones share storage.
#[derive(Debug, Clone, Default)]
pub struct BlockStore {
    blocks: Arc<DashMap<ContentHash, Block>>,
    bytes: Arc<AtomicU64>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a block is present.
    pub fn has(&self, hash: &ContentHash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Retrieve a block. `Bytes` clones are reference-counted, not copied.
    pub fn get(&self, hash: &ContentHash) -> Option<Block> {
        self.blocks.get(hash).map(|b| b.value().clone())
    }

    /// Store a block. A second put of the same hash is a no-op.
    ///
    /// Returns true if the block was newly inserted.
    pub fn put(&self, block: Block) -> bool {
        match self.blocks.entry(*block.hash()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let len = block.len() as u64;
                tracing::trace!(hash = %block.hash(), bytes = len, "block stored");
                slot.insert(block);
                self.bytes.fetch_add(len, Ordering::Relaxed);
                true
            }
        }
    }

    /// Number of blocks held.
    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    /// Total payload bytes held.
    pub fn size(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}
