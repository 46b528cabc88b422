//! Shared harness: providers, scripted peers, and config.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use barge_core::config::RetrievalConfig;
use barge_core::dag::BuiltDag;
use barge_core::identity::PeerIdentity;
use barge_core::{Block, ContentHash, Link, Message, Node, PeerAddr};
use barge_services::transport::{read_message, write_message};
use barge_services::{BlockStore, Provider};

/// Retrieval settings with test-sized timeouts.
pub fn test_config(concurrency: usize) -> RetrievalConfig {
    RetrievalConfig {
        concurrency,
        want_timeout_ms: 2_000,
        max_attempts: 3,
        connect_timeout_ms: 2_000,
    }
}

pub fn identity(seed: u8) -> PeerIdentity {
    PeerIdentity::from_key([seed; 32]).expect("identity from fixed key")
}

/// A real provider on 127.0.0.1 serving the given files.
pub struct TestProvider {
    pub addr: PeerAddr,
    pub provider: Provider,
    pub dags: Vec<BuiltDag>,
    shutdown: CancellationToken,
}

impl TestProvider {
    pub async fn start(files: &[&[u8]], chunk_size: usize) -> Self {
        let provider = Provider::new(identity(1).peer_id(), BlockStore::new());
        let dags = files
            .iter()
            .map(|data| provider.import(data, chunk_size).expect("import"))
            .collect();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let local = listener.local_addr().expect("local addr");
        let addr = PeerAddr::from_multiaddr(provider.dial_addr(local)).expect("dial addr");

        let shutdown = CancellationToken::new();
        tokio::spawn(provider.clone().serve(listener, shutdown.clone()));

        Self {
            addr,
            provider,
            dags,
            shutdown,
        }
    }
}

impl Drop for TestProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// What a scripted peer does with one WANT.
#[derive(Clone)]
pub enum Reply {
    Block(Bytes),
    DontHave,
    /// Read the want, send nothing.
    Silent,
    /// Close the connection.
    Hangup,
}

/// A peer that speaks the protocol but answers wants from a script and
/// records every want it sees.
pub struct ScriptedPeer {
    pub addr: PeerAddr,
    wants: Arc<Mutex<Vec<ContentHash>>>,
    shutdown: CancellationToken,
}

impl ScriptedPeer {
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&ContentHash) -> Reply + Send + Sync + 'static,
    {
        let id = identity(2).peer_id();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let local = listener.local_addr().expect("local addr");
        let addr = PeerAddr::from_multiaddr(barge_core::addr::dial_addr(
            local.ip(),
            local.port(),
            id,
        ))
        .expect("dial addr");

        let wants = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();
        let script = Arc::new(script);

        tokio::spawn({
            let wants = wants.clone();
            let shutdown = shutdown.clone();
            async move {
                loop {
                    let (mut stream, _) = tokio::select! {
                        _ = shutdown.cancelled() => return,
                        accepted = listener.accept() => match accepted {
                            Ok(a) => a,
                            Err(_) => return,
                        },
                    };
                    let wants = wants.clone();
                    let script = script.clone();
                    tokio::spawn(async move {
                        if !matches!(read_message(&mut stream).await, Ok(Some(Message::Hello { .. }))) {
                            return;
                        }
                        let hello = Message::Hello {
                            peer_id: Bytes::from(id.to_bytes()),
                        };
                        if write_message(&mut stream, &hello).await.is_err() {
                            return;
                        }
                        while let Ok(Some(message)) = read_message(&mut stream).await {
                            let Message::Want(hash) = message else {
                                continue;
                            };
                            wants.lock().unwrap().push(hash);
                            let reply = match (*script)(&hash) {
                                Reply::Block(data) => Message::Block { hash, data },
                                Reply::DontHave => Message::DontHave(hash),
                                Reply::Silent => continue,
                                Reply::Hangup => return,
                            };
                            if write_message(&mut stream, &reply).await.is_err() {
                                return;
                            }
                        }
                    });
                }
            }
        });

        Self {
            addr,
            wants,
            shutdown,
        }
    }

    /// Serve `blocks` honestly; anything else is DONT_HAVE.
    pub async fn serving(blocks: &[Block]) -> Self {
        let map: HashMap<ContentHash, Bytes> = blocks
            .iter()
            .map(|b| (*b.hash(), b.data().clone()))
            .collect();
        Self::start(move |hash| match map.get(hash) {
            Some(data) => Reply::Block(data.clone()),
            None => Reply::DontHave,
        })
        .await
    }

    pub fn wants(&self) -> Vec<ContentHash> {
        self.wants.lock().unwrap().clone()
    }

    /// How many times each hash was wanted.
    pub fn want_counts(&self) -> HashMap<ContentHash, usize> {
        let mut counts = HashMap::new();
        for hash in self.wants() {
            *counts.entry(hash).or_insert(0) += 1;
        }
        counts
    }
}

impl Drop for ScriptedPeer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn leaf(data: &[u8]) -> Block {
    Block::new(barge_core::Codec::Raw, data.to_vec())
}

pub fn node(children: &[&Block]) -> Block {
    Node {
        links: children
            .iter()
            .map(|b| Link::new(*b.hash(), b.len() as u64))
            .collect(),
        data: Bytes::new(),
    }
    .to_block()
    .expect("encode node")
}
