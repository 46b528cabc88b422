//! Wantlist: the blocks requested from the peer and not yet answered.
//!
//! One entry per hash. The first subscriber owns the entry: it sends the
//! want and drives retries. Later subscribers for the same hash join the
//! entry and are answered by the same delivery, so one want goes on the
//! wire no matter how many tasks ask.

use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

use barge_core::ContentHash;

/// How an outstanding want was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Bytes the peer claims hash to the wanted hash. Not yet verified.
    Block(Bytes),
    DontHave,
    /// The owner gave up after this many wants.
    TimedOut { attempts: u32 },
    /// The connection ended with this reason.
    Closed(String),
}

struct WantEntry {
    requested_at: Instant,
    attempts: u32,
    waiters: Vec<oneshot::Sender<Delivery>>,
}

/// A place in line for one hash.
pub struct Subscription {
    pub rx: oneshot::Receiver<Delivery>,
    /// True if this subscriber created the entry and must send the want.
    pub owner: bool,
}

#[derive(Default)]
pub struct Wantlist {
    entries: DashMap<ContentHash, WantEntry>,
}

impl Wantlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the entry for `hash`, creating it with `attempts = 1` if absent.
    pub fn subscribe(&self, hash: ContentHash) -> Subscription {
        let (tx, rx) = oneshot::channel();
        let owner = match self.entries.entry(hash) {
            Entry::Occupied(mut e) => {
                e.get_mut().waiters.push(tx);
                false
            }
            Entry::Vacant(e) => {
                e.insert(WantEntry {
                    requested_at: Instant::now(),
                    attempts: 1,
                    waiters: vec![tx],
                });
                true
            }
        };
        Subscription { rx, owner }
    }

    /// Record a re-sent want. Returns the new attempt count, or None if the
    /// entry was answered in the meantime.
    pub fn retry(&self, hash: &ContentHash) -> Option<u32> {
        let mut entry = self.entries.get_mut(hash)?;
        entry.attempts += 1;
        entry.requested_at = Instant::now();
        Some(entry.attempts)
    }

    /// Answer every waiter on `hash` and remove the entry.
    ///
    /// Returns false if nothing was waiting, i.e. the frame was unsolicited.
    pub fn resolve(&self, hash: &ContentHash, delivery: Delivery) -> bool {
        let Some((_, entry)) = self.entries.remove(hash) else {
            return false;
        };
        tracing::debug!(
            hash = %hash,
            attempts = entry.attempts,
            waiters = entry.waiters.len(),
            elapsed_ms = entry.requested_at.elapsed().as_millis() as u64,
            "want resolved"
        );
        for waiter in entry.waiters {
            // A waiter that stopped listening was cancelled.
            let _ = waiter.send(delivery.clone());
        }
        true
    }

    /// Drop the entry without answering. Joined waiters see their channel
    /// close and start over.
    pub fn abandon(&self, hash: &ContentHash) {
        self.entries.remove(hash);
    }

    /// Answer every outstanding want with `Closed`.
    pub fn close_all(&self, reason: &str) {
        let hashes: Vec<ContentHash> = self.entries.iter().map(|e| *e.key()).collect();
        for hash in hashes {
            self.resolve(&hash, Delivery::Closed(reason.to_string()));
        }
    }

    pub fn attempts(&self, hash: &ContentHash) -> Option<u32> {
        self.entries.get(hash).map(|e| e.attempts)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
