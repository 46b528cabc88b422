//! Progress reporting. A byte accumulator; rendering lives elsewhere.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Receives byte counts as blocks arrive from the peer.
pub trait ProgressSink: Send + Sync {
    /// Add `bytes` to the running total. Never decreases it.
    fn add(&self, bytes: u64);

    /// Called once, after a successful retrieval.
    fn finalize(&self);
}

/// The default sink: an atomic counter the caller can read at any time.
#[derive(Debug, Default)]
pub struct ByteCounter {
    bytes: AtomicU64,
    finished: AtomicBool,
}

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl ProgressSink for ByteCounter {
    fn add(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn finalize(&self) {
        self.finished.store(true, Ordering::Release);
    }
}
