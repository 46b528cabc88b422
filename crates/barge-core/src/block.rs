//! Blocks — immutable payloads identified by their content hash.

use bytes::Bytes;

use crate::hash::{Codec, ContentHash};

/// An immutable byte payload and the hash that names it.
///
/// The only constructors either compute the hash or check it, so a `Block`
/// in hand always satisfies `hash.verify(data)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    hash: ContentHash,
    data: Bytes,
}

impl Block {
    /// Build a block, hashing `data` under `codec`.
    pub fn new(codec: Codec, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let hash = ContentHash::of(codec, &data);
        Self { hash, data }
    }

    /// Accept bytes claimed to have hash `expected`.
    ///
    /// On mismatch, returns the hash the bytes actually have.
    pub fn verified(expected: ContentHash, data: Bytes) -> Result<Self, ContentHash> {
        let actual = ContentHash::of(expected.codec(), &data);
        if actual != expected {
            return Err(actual);
        }
        Ok(Self {
            hash: expected,
            data,
        })
    }

    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
