//! barge-services — the retrieval engine and the provider it talks to.

pub mod error;
pub mod exchange;
pub mod materialize;
pub mod progress;
pub mod provider;
pub mod retrieve;
pub mod session;
pub mod store;
pub mod transport;
pub mod visited;
pub mod walker;
pub mod wantlist;

pub use error::{MissReason, RetrieveError};
pub use exchange::Exchange;
pub use materialize::materialize;
pub use progress::{ByteCounter, ProgressSink};
pub use provider::Provider;
pub use retrieve::{retrieve, Retrieval};
pub use session::Session;
pub use store::BlockStore;
pub use visited::VisitedSet;
pub use walker::{walk, BlockSource, WalkStats};
pub use wantlist::{Delivery, Wantlist};
