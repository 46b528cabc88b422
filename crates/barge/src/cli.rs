//! Command-line definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Content-addressed block exchange with a single peer.
#[derive(Parser, Debug)]
#[command(name = "barge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Retrieve the DAG under a root hash from one peer.
    Bsget {
        /// Root content hash.
        hash: String,
        /// Peer multiaddr, e.g. /ip4/127.0.0.1/tcp/4001/p2p/<peer id>.
        peer: String,
        /// Write the retrieved content to this file.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Maximum fetches in flight. Overrides the config file.
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Serve files to peers.
    Serve {
        /// Listen multiaddr. Overrides the config file.
        #[arg(long)]
        listen: Option<String>,
        /// Files to import and serve.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
