//! barge-core — shared types, wire format, content hashes and DAG codec.
//! All other barge crates depend on this one.

pub mod addr;
pub mod block;
pub mod config;
pub mod dag;
pub mod hash;
pub mod identity;
pub mod wire;

pub use addr::{AddressError, Host, PeerAddr};
pub use block::Block;
pub use dag::{decode, DecodeError, Link, Node};
pub use hash::{Codec, ContentHash};
pub use wire::{Message, WireError};
