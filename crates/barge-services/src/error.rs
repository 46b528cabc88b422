//! Retrieval errors. Every variant but `Cancelled` is fatal for the walk
//! and surfaces to the command verbatim.

use std::fmt;

use barge_core::{AddressError, ContentHash, DecodeError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrieveError {
    #[error("address error: {0}")]
    Address(#[from] AddressError),

    #[error("connection to {peer} failed: {reason}")]
    Connection { peer: String, reason: String },

    #[error("block {hash} unavailable: {reason}")]
    MissingBlock { hash: ContentHash, reason: MissReason },

    #[error("block {expected} failed verification: bytes hash to {actual}")]
    HashMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("block {hash} is not a valid node: {source}")]
    Decode {
        hash: ContentHash,
        #[source]
        source: DecodeError,
    },

    /// The walk was cancelled by an earlier failure. Never the reported
    /// outcome of a walk.
    #[error("cancelled")]
    Cancelled,
}

impl RetrieveError {
    pub fn connection(peer: impl fmt::Display, reason: impl fmt::Display) -> Self {
        RetrieveError::Connection {
            peer: peer.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Why a block is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// The peer answered DONT_HAVE.
    DontHave,
    /// No answer after this many wants.
    TimedOut { attempts: u32 },
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::DontHave => f.write_str("peer does not have it"),
            MissReason::TimedOut { attempts } => {
                write!(f, "no response after {attempts} attempts")
            }
        }
    }
}
