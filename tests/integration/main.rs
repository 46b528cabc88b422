//! barge integration test harness.
//!
//! Every test runs a real provider (or a scripted one) on loopback and
//! retrieves from it over TCP. No root, no namespaces, no external
//! network:
//!
//!   cargo test --test integration
//!
//! Each test owns the listeners it spawns; ports are ephemeral.

mod failures;
mod infra;
mod retrieval;

pub use infra::*;
