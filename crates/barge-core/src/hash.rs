//! Content hashes — the identity of every block barge moves.
//!
//! A content hash is a codec tag plus the BLAKE3 digest of the block bytes.
//! The codec says how the bytes are interpreted (opaque leaf or link node);
//! the digest says which bytes they are.
//!
//! Binary form, 34 bytes:
//!   version (0x01) | codec | hash code (0x1e) | digest length (0x20) | digest
//!
//! Text form: `f` followed by the lowercase hex of the binary form.

use std::fmt;
use std::str::FromStr;

/// Binary format version.
pub const HASH_VERSION: u8 = 0x01;

/// Hash function code for BLAKE3-256.
pub const BLAKE3_CODE: u8 = 0x1e;

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 32;

/// Length of the binary form.
pub const ENCODED_LEN: usize = 4 + DIGEST_LEN;

/// Prefix of the text form (base16).
pub const TEXT_PREFIX: char = 'f';

/// Hash a byte slice, returning a 32-byte BLAKE3 digest.
pub fn digest(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// How a block's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Codec {
    /// Opaque payload. Always a leaf.
    Raw = 0x55,
    /// Link node in barge's node encoding. See `dag`.
    Node = 0x70,
}

impl TryFrom<u8> for Codec {
    type Error = HashError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x55 => Ok(Codec::Raw),
            0x70 => Ok(Codec::Node),
            other => Err(HashError::UnknownCodec(other)),
        }
    }
}

impl From<Codec> for u8 {
    fn from(c: Codec) -> u8 {
        c as u8
    }
}

/// Codec tag + BLAKE3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    codec: Codec,
    digest: [u8; DIGEST_LEN],
}

impl ContentHash {
    /// Hash `data` under the given codec.
    pub fn of(codec: Codec, data: &[u8]) -> Self {
        Self {
            codec,
            digest: digest(data),
        }
    }

    /// Assemble from parts already known to be valid (e.g. off the wire).
    pub fn from_parts(codec: Codec, digest: [u8; DIGEST_LEN]) -> Self {
        Self { codec, digest }
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Does `data` hash to this value?
    pub fn verify(&self, data: &[u8]) -> bool {
        digest(data) == self.digest
    }

    pub fn to_bytes(&self) -> [u8; ENCODED_LEN] {
        let mut out = [0u8; ENCODED_LEN];
        out[0] = HASH_VERSION;
        out[1] = self.codec.into();
        out[2] = BLAKE3_CODE;
        out[3] = DIGEST_LEN as u8;
        out[4..].copy_from_slice(&self.digest);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.len() != ENCODED_LEN {
            return Err(HashError::BadLength(bytes.len()));
        }
        if bytes[0] != HASH_VERSION {
            return Err(HashError::UnknownVersion(bytes[0]));
        }
        let codec = Codec::try_from(bytes[1])?;
        if bytes[2] != BLAKE3_CODE {
            return Err(HashError::UnknownHashCode(bytes[2]));
        }
        if bytes[3] as usize != DIGEST_LEN {
            return Err(HashError::BadDigestLength(bytes[3]));
        }
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes[4..]);
        Ok(Self { codec, digest })
    }

    /// Short form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.digest[..6])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", TEXT_PREFIX, hex::encode(self.to_bytes()))
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:?}, {})", self.codec, hex::encode(self.digest))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix(TEXT_PREFIX)
            .ok_or_else(|| HashError::UnknownBase(s.chars().next()))?;
        let bytes = hex::decode(rest).map_err(|e| HashError::BadHex(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashError {
    #[error("unsupported base prefix {0:?}, expected 'f'")]
    UnknownBase(Option<char>),

    #[error("invalid hex: {0}")]
    BadHex(String),

    #[error("content hash is {0} bytes, expected {}", ENCODED_LEN)]
    BadLength(usize),

    #[error("unknown content hash version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("unknown codec: 0x{0:02x}")]
    UnknownCodec(u8),

    #[error("unknown hash function code: 0x{0:02x}")]
    UnknownHashCode(u8),

    #[error("digest length {0} does not match BLAKE3-256")]
    BadDigestLength(u8),
}
