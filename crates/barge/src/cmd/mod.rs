//! Subcommand handlers.

pub mod bsget;
pub mod serve;
