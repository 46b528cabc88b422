//! The walk's visited set.

use std::sync::Arc;

use dashmap::DashSet;

use barge_core::ContentHash;

/// Insertion-only set of hashes already claimed by a walk.
///
/// `visit` is an atomic test-and-insert: among any number of concurrent
/// callers with the same hash, exactly one gets `true`.
#[derive(Clone, Default)]
pub struct VisitedSet {
    seen: Arc<DashSet<ContentHash>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `hash`. True if this call inserted it.
    pub fn visit(&self, hash: ContentHash) -> bool {
        self.seen.insert(hash)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.seen.contains(hash)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
