//! DAG nodes — link extraction and construction.
//!
//! `decode` is the only place block bytes are interpreted as links. It is a
//! pure function of the block: identical bytes always give an identical
//! node, and malformed bytes always give an error with nothing partial
//! escaping.
//!
//! Node encoding (codec `Node`):
//!
//!   NodeHeader (9 bytes): magic "BNOD" | version | link_count u32 LE
//!   link_count × LinkRecord (43 bytes) each followed by name_len name bytes
//!   remaining bytes: inline data
//!
//! Raw-codec blocks are leaves: no links, the whole payload is data.

use std::collections::HashSet;

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::little_endian::{U16, U32, U64};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::block::Block;
use crate::hash::{Codec, ContentHash, HashError, DIGEST_LEN};
use crate::wire::MAX_PAYLOAD;

/// Leading bytes of every node block.
pub const NODE_MAGIC: [u8; 4] = *b"BNOD";

/// Current node format version.
pub const NODE_VERSION: u8 = 0x01;

/// Links per interior node when building. A full node of unnamed links is
/// under 8 KiB; named links are bounded only by the wire payload limit.
pub const LINKS_PER_NODE: usize = 174;

/// Default leaf size when building.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
struct NodeHeader {
    magic: [u8; 4],
    version: u8,
    link_count: U32,
}

assert_eq_size!(NodeHeader, [u8; 9]);
const NODE_HEADER_LEN: usize = 9;

#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
struct LinkRecord {
    codec: u8,
    digest: [u8; DIGEST_LEN],
    /// Payload bytes reachable through this link. Advisory.
    size: U64,
    name_len: U16,
}

assert_eq_size!(LinkRecord, [u8; 43]);
const LINK_RECORD_LEN: usize = 43;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A reference from one node to a child block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub hash: ContentHash,
    pub name: Option<String>,
    /// Size hint. May be zero; never used for anything but estimates.
    pub size: u64,
}

impl Link {
    pub fn new(hash: ContentHash, size: u64) -> Self {
        Self {
            hash,
            name: None,
            size,
        }
    }

    pub fn named(hash: ContentHash, name: impl Into<String>, size: u64) -> Self {
        Self {
            hash,
            name: Some(name.into()),
            size,
        }
    }
}

/// Decoded view of a block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub links: Vec<Link>,
    pub data: Bytes,
}

impl Node {
    pub fn is_leaf(&self) -> bool {
        self.links.is_empty()
    }

    /// Serialize in the node encoding.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let link_count = u32::try_from(self.links.len())
            .map_err(|_| EncodeError::TooManyLinks(self.links.len()))?;
        let mut out = Vec::with_capacity(
            NODE_HEADER_LEN + self.links.len() * LINK_RECORD_LEN + self.data.len(),
        );
        let header = NodeHeader {
            magic: NODE_MAGIC,
            version: NODE_VERSION,
            link_count: U32::new(link_count),
        };
        out.extend_from_slice(header.as_bytes());

        for link in &self.links {
            let name = link.name.as_deref().unwrap_or("");
            let name_len =
                u16::try_from(name.len()).map_err(|_| EncodeError::NameTooLong(name.len()))?;
            let record = LinkRecord {
                codec: link.hash.codec().into(),
                digest: *link.hash.digest(),
                size: U64::new(link.size),
                name_len: U16::new(name_len),
            };
            out.extend_from_slice(record.as_bytes());
            out.extend_from_slice(name.as_bytes());
        }

        out.extend_from_slice(&self.data);
        Ok(Bytes::from(out))
    }

    /// Encode and hash as a `Node` block.
    pub fn to_block(&self) -> Result<Block, EncodeError> {
        Ok(Block::new(Codec::Node, self.encode()?))
    }
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Extract a block's links (and inline data).
pub fn decode(block: &Block) -> Result<Node, DecodeError> {
    match block.hash().codec() {
        Codec::Raw => Ok(Node {
            links: Vec::new(),
            data: block.data().clone(),
        }),
        Codec::Node => decode_node(block.data()),
    }
}

/// Decode bytes in the node encoding.
pub fn decode_node(bytes: &Bytes) -> Result<Node, DecodeError> {
    let header = NodeHeader::read_from_prefix(&bytes[..]).ok_or(DecodeError::TooShort(bytes.len()))?;
    if header.magic != NODE_MAGIC {
        return Err(DecodeError::BadMagic(header.magic));
    }
    if header.version != NODE_VERSION {
        return Err(DecodeError::UnknownVersion(header.version));
    }

    let count = header.link_count.get() as usize;
    let mut offset = NODE_HEADER_LEN;

    // Every record needs at least LINK_RECORD_LEN bytes, so a count that
    // cannot fit is rejected before allocating for it.
    if count > (bytes.len() - offset) / LINK_RECORD_LEN {
        return Err(DecodeError::Truncated { link: 0 });
    }

    let mut links = Vec::with_capacity(count);
    for index in 0..count {
        let record = bytes
            .get(offset..offset + LINK_RECORD_LEN)
            .and_then(LinkRecord::read_from)
            .ok_or(DecodeError::Truncated { link: index })?;
        offset += LINK_RECORD_LEN;

        let codec =
            Codec::try_from(record.codec).map_err(|e| DecodeError::BadLink { link: index, source: e })?;
        let hash = ContentHash::from_parts(codec, record.digest);

        let name_len = record.name_len.get() as usize;
        let name_bytes = bytes
            .get(offset..offset + name_len)
            .ok_or(DecodeError::Truncated { link: index })?;
        offset += name_len;

        let name = if name_len == 0 {
            None
        } else {
            let s = std::str::from_utf8(name_bytes)
                .map_err(|_| DecodeError::BadName { link: index })?;
            Some(s.to_string())
        };

        links.push(Link {
            hash,
            name,
            size: record.size.get(),
        });
    }

    Ok(Node {
        links,
        data: bytes.slice(offset..),
    })
}

// ── Building ──────────────────────────────────────────────────────────────────

/// A DAG built from local bytes: its root and every block in it.
#[derive(Debug, Clone)]
pub struct BuiltDag {
    pub root: ContentHash,
    pub blocks: Vec<Block>,
    pub total_bytes: u64,
}

/// Split `data` into raw leaves of `chunk_size` and link them into a
/// balanced tree of nodes with at most `LINKS_PER_NODE` links each.
///
/// A single leaf is its own root. Link size hints carry the payload bytes
/// under each link. `blocks` holds each distinct block once, however often
/// it is linked.
pub fn build_dag(data: &[u8], chunk_size: usize) -> Result<BuiltDag, EncodeError> {
    if chunk_size == 0 {
        return Err(EncodeError::ZeroChunkSize);
    }
    if chunk_size > MAX_PAYLOAD {
        return Err(EncodeError::ChunkTooLarge(chunk_size));
    }

    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut level: Vec<Link> = Vec::new();

    if data.is_empty() {
        let leaf = Block::new(Codec::Raw, Bytes::new());
        level.push(Link::new(*leaf.hash(), 0));
        seen.insert(*leaf.hash());
        blocks.push(leaf);
    }
    for piece in data.chunks(chunk_size) {
        let leaf = Block::new(Codec::Raw, Bytes::copy_from_slice(piece));
        level.push(Link::new(*leaf.hash(), piece.len() as u64));
        if seen.insert(*leaf.hash()) {
            blocks.push(leaf);
        }
    }

    while level.len() > 1 {
        let mut parents = Vec::with_capacity(level.len().div_ceil(LINKS_PER_NODE));
        for group in level.chunks(LINKS_PER_NODE) {
            let size = group.iter().map(|l| l.size).sum();
            let node = Node {
                links: group.to_vec(),
                data: Bytes::new(),
            };
            let block = node.to_block()?;
            if block.len() > MAX_PAYLOAD {
                return Err(EncodeError::NodeTooLarge(block.len()));
            }
            parents.push(Link::new(*block.hash(), size));
            if seen.insert(*block.hash()) {
                blocks.push(block);
            }
        }
        level = parents;
    }

    // level has exactly one entry here: data.is_empty() seeds one leaf.
    let root = level
        .pop()
        .map(|l| l.hash)
        .ok_or(EncodeError::ZeroChunkSize)?;

    Ok(BuiltDag {
        root,
        blocks,
        total_bytes: data.len() as u64,
    })
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("node is {0} bytes, shorter than its header")]
    TooShort(usize),

    #[error("bad node magic: {0:02x?}")]
    BadMagic([u8; 4]),

    #[error("unknown node version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("node truncated inside link {link}")]
    Truncated { link: usize },

    #[error("link {link} has an invalid hash: {source}")]
    BadLink { link: usize, source: HashError },

    #[error("link {link} name is not valid UTF-8")]
    BadName { link: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("link name of {0} bytes exceeds u16::MAX")]
    NameTooLong(usize),

    #[error("chunk size must be non-zero")]
    ZeroChunkSize,

    #[error("chunk size {0} exceeds the {} byte block limit", MAX_PAYLOAD)]
    ChunkTooLarge(usize),

    #[error("node of {0} bytes exceeds the {} byte block limit", MAX_PAYLOAD)]
    NodeTooLarge(usize),

    #[error("{0} links do not fit a node header")]
    TooManyLinks(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
