//! Provider identity — the key a serving peer is known by.
//!
//! A 32-byte key, generated once and stored as hex. The peer id is the
//! identity multihash of the key, so it round-trips through `/p2p/...`
//! multiaddr segments without any key-type machinery. Transport
//! authentication is out of scope; the id is matched, not proven.

use std::path::Path;

use libp2p_identity::PeerId;
use multihash::Multihash;
use rand::RngCore;

/// Multihash code for the identity "hash" (the digest is the input).
const IDENTITY_CODE: u64 = 0x00;

pub struct PeerIdentity {
    key: [u8; 32],
    peer_id: PeerId,
}

impl PeerIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Result<Self, IdentityError> {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Rebuild from stored key bytes.
    pub fn from_key(key: [u8; 32]) -> Result<Self, IdentityError> {
        let mh = Multihash::<64>::wrap(IDENTITY_CODE, &key)
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
        let peer_id = PeerId::from_multihash(mh)
            .map_err(|_| IdentityError::Malformed("key rejected as peer id".into()))?;
        Ok(Self { key, peer_id })
    }

    pub fn key(&self) -> &[u8; 32] {
        &self.key
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    /// Load the key at `path`, generating and writing one if absent.
    pub fn load_or_generate(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| IdentityError::Read(path.display().to_string(), e))?;
            let bytes = hex::decode(text.trim())
                .map_err(|e| IdentityError::Malformed(e.to_string()))?;
            let key: [u8; 32] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| IdentityError::Malformed(format!("{} bytes, expected 32", bytes.len())))?;
            return Self::from_key(key);
        }

        let identity = Self::generate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| IdentityError::Write(path.display().to_string(), e))?;
        }
        std::fs::write(path, hex::encode(identity.key))
            .map_err(|e| IdentityError::Write(path.display().to_string(), e))?;
        Ok(identity)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read identity key {0}: {1}")]
    Read(String, std::io::Error),
    #[error("failed to write identity key {0}: {1}")]
    Write(String, std::io::Error),
    #[error("malformed identity key: {0}")]
    Malformed(String),
}
