//! Provider — the serving side of the exchange.
//!
//! Accepts TCP connections, answers the hello with our peer id, then
//! answers every WANT with BLOCK from the store or DONT_HAVE.

use std::net::SocketAddr;

use bytes::Bytes;
use libp2p_identity::PeerId;
use multiaddr::Multiaddr;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use barge_core::dag::{build_dag, BuiltDag, EncodeError};
use barge_core::Message;

use crate::store::BlockStore;
use crate::transport::{read_message, write_message, TransportError};

#[derive(Clone)]
pub struct Provider {
    peer_id: PeerId,
    store: BlockStore,
}

impl Provider {
    pub fn new(peer_id: PeerId, store: BlockStore) -> Self {
        Self { peer_id, store }
    }

    pub fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    /// Chunk `data` into a DAG and add every block to the store.
    pub fn import(&self, data: &[u8], chunk_size: usize) -> Result<BuiltDag, EncodeError> {
        let dag = build_dag(data, chunk_size)?;
        for block in &dag.blocks {
            self.store.put(block.clone());
        }
        tracing::info!(
            root = %dag.root,
            blocks = dag.blocks.len(),
            bytes = dag.total_bytes,
            "imported"
        );
        Ok(dag)
    }

    /// Dialable address for a listener bound at `local`.
    pub fn dial_addr(&self, local: SocketAddr) -> Multiaddr {
        barge_core::addr::dial_addr(local.ip(), local.port(), self.peer_id)
    }

    /// Accept connections until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("provider shutting down");
                    return;
                }

                accepted = listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(r) => r,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let provider = self.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = shutdown.cancelled() => {}
                            result = provider.handle(stream, remote) => {
                                match result {
                                    Ok(served) => tracing::debug!(%remote, served, "peer disconnected"),
                                    Err(e) => tracing::warn!(%remote, error = %e, "connection ended"),
                                }
                            }
                        }
                    });
                }
            }
        }
    }

    /// Serve one connection. Returns how many blocks were sent.
    async fn handle(&self, mut stream: TcpStream, remote: SocketAddr) -> Result<u64, TransportError> {
        let _ = stream.set_nodelay(true);

        match read_message(&mut stream).await? {
            Some(Message::Hello { .. }) => {}
            Some(other) => {
                tracing::warn!(%remote, kind = other.name(), "expected hello, closing");
                return Ok(0);
            }
            None => return Ok(0),
        }
        write_message(
            &mut stream,
            &Message::Hello {
                peer_id: Bytes::from(self.peer_id.to_bytes()),
            },
        )
        .await?;
        tracing::debug!(%remote, "hello exchanged");

        let mut served = 0u64;
        while let Some(message) = read_message(&mut stream).await? {
            match message {
                Message::Want(hash) => {
                    let reply = match self.store.get(&hash) {
                        Some(block) => {
                            served += 1;
                            tracing::debug!(%remote, hash = %hash, bytes = block.len(), "serving block");
                            Message::Block {
                                hash,
                                data: block.data().clone(),
                            }
                        }
                        None => {
                            tracing::debug!(%remote, hash = %hash, "dont have");
                            Message::DontHave(hash)
                        }
                    };
                    write_message(&mut stream, &reply).await?;
                }
                other => {
                    tracing::warn!(%remote, kind = other.name(), "unexpected frame dropped");
                }
            }
        }
        Ok(served)
    }
}
