//! Barge wire format — the frames exchanged with a peer.
//!
//! These types ARE the protocol. Every field, every size is part of the
//! wire format; changing anything here breaks interop with older peers.
//!
//! A frame is a fixed 39-byte header followed by `length` payload bytes.
//! The header is `#[repr(C, packed)]` with zerocopy derives for
//! allocation-free parsing. There is no unsafe code in this module.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::hash::{Codec, ContentHash, HashError, DIGEST_LEN};

// ── Frame Header ──────────────────────────────────────────────────────────────

/// Precedes every payload on the connection.
///
/// The receiver can route a frame to the waiting want before reading a
/// single payload byte.
///
/// Wire size: 39 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct FrameHeader {
    /// One of the `kind::*` constants.
    pub kind: u8,

    /// Wire format version. Currently 0x01.
    pub version: u8,

    /// Codec of the hash this frame is about. Zero for HELLO.
    pub codec: u8,

    /// Digest of the hash this frame is about. Zero for HELLO.
    pub digest: [u8; DIGEST_LEN],

    /// Payload length in bytes, not including this header.
    pub length: U32,
}

assert_eq_size!(FrameHeader, [u8; 39]);

/// Size of `FrameHeader` on the wire.
pub const HEADER_LEN: usize = 39;

/// Frame kinds.
pub mod kind {
    /// Connection opener. Payload: the sender's peer id bytes (may be empty).
    pub const HELLO: u8 = 0x01;
    /// Request for a block. No payload.
    pub const WANT: u8 = 0x02;
    /// A block. Payload: the block bytes.
    pub const BLOCK: u8 = 0x03;
    /// The sender does not have the block. No payload.
    pub const DONT_HAVE: u8 = 0x04;
}

// ── Constants ─────────────────────────────────────────────────────────────────

/// Current frame format version.
pub const WIRE_VERSION: u8 = 0x01;

/// Maximum payload size in bytes. Builders keep blocks well below this.
pub const MAX_PAYLOAD: usize = 4 * 1024 * 1024;

/// Maximum peer id length carried in HELLO.
pub const MAX_PEER_ID_LEN: usize = 64;

// ── Messages ──────────────────────────────────────────────────────────────────

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello { peer_id: Bytes },
    Want(ContentHash),
    Block { hash: ContentHash, data: Bytes },
    DontHave(ContentHash),
}

impl Message {
    /// Name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Message::Hello { .. } => "hello",
            Message::Want(_) => "want",
            Message::Block { .. } => "block",
            Message::DontHave(_) => "dont_have",
        }
    }

    fn kind(&self) -> u8 {
        match self {
            Message::Hello { .. } => kind::HELLO,
            Message::Want(_) => kind::WANT,
            Message::Block { .. } => kind::BLOCK,
            Message::DontHave(_) => kind::DONT_HAVE,
        }
    }

    fn subject(&self) -> Option<&ContentHash> {
        match self {
            Message::Hello { .. } => None,
            Message::Want(h) | Message::DontHave(h) => Some(h),
            Message::Block { hash, .. } => Some(hash),
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Hello { peer_id } => &peer_id[..],
            Message::Block { data, .. } => &data[..],
            Message::Want(_) | Message::DontHave(_) => &[],
        }
    }

    pub fn header(&self) -> FrameHeader {
        let (codec, digest) = match self.subject() {
            Some(h) => (u8::from(h.codec()), *h.digest()),
            None => (0, [0u8; DIGEST_LEN]),
        };
        FrameHeader {
            kind: self.kind(),
            version: WIRE_VERSION,
            codec,
            digest,
            length: U32::new(self.payload().len() as u32),
        }
    }

    /// Header followed by payload, ready to write.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let payload = self.payload();
        if payload.len() > MAX_PAYLOAD {
            return Err(WireError::PayloadTooLarge(payload.len()));
        }
        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(self.header().as_bytes());
        out.extend_from_slice(payload);
        Ok(out)
    }

    /// Rebuild a message from a checked header and its payload.
    pub fn from_frame(header: &FrameHeader, payload: Bytes) -> Result<Self, WireError> {
        let declared = header.length.get() as usize;
        if payload.len() != declared {
            return Err(WireError::LengthMismatch {
                declared,
                actual: payload.len(),
            });
        }

        match header.kind {
            kind::HELLO => {
                if payload.len() > MAX_PEER_ID_LEN {
                    return Err(WireError::PeerIdTooLong(payload.len()));
                }
                Ok(Message::Hello { peer_id: payload })
            }
            kind::WANT => {
                expect_empty(header.kind, &payload)?;
                Ok(Message::Want(subject(header)?))
            }
            kind::BLOCK => Ok(Message::Block {
                hash: subject(header)?,
                data: payload,
            }),
            kind::DONT_HAVE => {
                expect_empty(header.kind, &payload)?;
                Ok(Message::DontHave(subject(header)?))
            }
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

/// Parse and sanity-check a header before its payload is read.
///
/// Checking here means a hostile length field never drives an allocation.
pub fn parse_header(bytes: &[u8]) -> Result<FrameHeader, WireError> {
    let header = FrameHeader::read_from_prefix(bytes).ok_or(WireError::Truncated(bytes.len()))?;
    if header.version != WIRE_VERSION {
        return Err(WireError::UnknownVersion(header.version));
    }
    if !matches!(
        header.kind,
        kind::HELLO | kind::WANT | kind::BLOCK | kind::DONT_HAVE
    ) {
        return Err(WireError::UnknownKind(header.kind));
    }
    let length = header.length.get() as usize;
    if length > MAX_PAYLOAD {
        return Err(WireError::PayloadTooLarge(length));
    }
    Ok(header)
}

fn subject(header: &FrameHeader) -> Result<ContentHash, WireError> {
    let codec = Codec::try_from(header.codec).map_err(WireError::BadHash)?;
    Ok(ContentHash::from_parts(codec, header.digest))
}

fn expect_empty(kind: u8, payload: &[u8]) -> Result<(), WireError> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(WireError::UnexpectedPayload {
            kind,
            length: payload.len(),
        })
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting wire-format data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("frame header truncated: {0} bytes")]
    Truncated(usize),

    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown wire version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("payload length {0} exceeds maximum {}", MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("header declares {declared} payload bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("frame kind 0x{kind:02x} must not carry a payload ({length} bytes)")]
    UnexpectedPayload { kind: u8, length: usize },

    #[error("peer id of {0} bytes exceeds maximum {}", MAX_PEER_ID_LEN)]
    PeerIdTooLong(usize),

    #[error("bad content hash in frame: {0}")]
    BadHash(HashError),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
