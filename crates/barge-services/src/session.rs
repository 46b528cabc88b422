//! Session — the connection to exactly one named peer.
//!
//! `connect` resolves the address, dials it, and runs the hello exchange:
//! we send an empty HELLO, the provider answers with its peer id, and the
//! id must equal the `/p2p` segment we dialed. No retries; any failure is
//! fatal for the retrieval.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use libp2p_identity::PeerId;
use tokio::net::TcpStream;

use barge_core::config::RetrievalConfig;
use barge_core::{AddressError, Host, Message, PeerAddr};

use crate::error::RetrieveError;
use crate::exchange::Exchange;
use crate::progress::ProgressSink;
use crate::store::BlockStore;
use crate::transport::{read_message, write_message};

/// An established, identity-checked connection.
pub struct Session {
    peer: PeerAddr,
    remote: SocketAddr,
    stream: TcpStream,
}

/// Turn a parsed address into socket addresses. DNS names are looked up
/// here, before any dial.
pub async fn resolve(peer: &PeerAddr) -> Result<Vec<SocketAddr>, AddressError> {
    match peer.host() {
        Host::Ip(ip) => Ok(vec![SocketAddr::new(*ip, peer.port())]),
        Host::Dns(name) => {
            let found: Vec<SocketAddr> = tokio::net::lookup_host((name.as_str(), peer.port()))
                .await
                .map_err(|e| AddressError::Unresolvable {
                    host: name.clone(),
                    reason: e.to_string(),
                })?
                .collect();
            if found.is_empty() {
                return Err(AddressError::Unresolvable {
                    host: name.clone(),
                    reason: "no addresses".to_string(),
                });
            }
            Ok(found)
        }
    }
}

impl Session {
    pub async fn connect(peer: &PeerAddr, timeout: Duration) -> Result<Self, RetrieveError> {
        let candidates = resolve(peer).await?;

        let attempt = async {
            let (stream, remote) = dial(peer, &candidates).await?;
            let mut session = Session {
                peer: peer.clone(),
                remote,
                stream,
            };
            session.hello().await?;
            Ok::<_, RetrieveError>(session)
        };

        let session = tokio::time::timeout(timeout, attempt)
            .await
            .map_err(|_| {
                RetrieveError::connection(
                    peer,
                    format!("timed out after {}ms", timeout.as_millis()),
                )
            })??;

        tracing::info!(peer = %peer, remote = %session.remote, "connected");
        Ok(session)
    }

    async fn hello(&mut self) -> Result<(), RetrieveError> {
        let peer = &self.peer;
        write_message(
            &mut self.stream,
            &Message::Hello {
                peer_id: Bytes::new(),
            },
        )
        .await
        .map_err(|e| RetrieveError::connection(peer, e))?;

        let presented = match read_message(&mut self.stream).await {
            Ok(Some(Message::Hello { peer_id })) => peer_id,
            Ok(Some(other)) => {
                return Err(RetrieveError::connection(
                    peer,
                    format!("expected hello, got {}", other.name()),
                ))
            }
            Ok(None) => {
                return Err(RetrieveError::connection(
                    peer,
                    "peer closed the connection during hello",
                ))
            }
            Err(e) => return Err(RetrieveError::connection(peer, e)),
        };

        if presented[..] != peer.peer_id().to_bytes()[..] {
            let shown = PeerId::from_bytes(&presented)
                .map(|id| id.to_string())
                .unwrap_or_else(|_| hex::encode(&presented));
            return Err(RetrieveError::connection(
                peer,
                format!("peer identity mismatch: presented {shown}"),
            ));
        }
        Ok(())
    }

    pub fn peer(&self) -> &PeerAddr {
        &self.peer
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Hand the connection to an exchange engine.
    pub fn into_exchange(
        self,
        store: BlockStore,
        progress: Arc<dyn ProgressSink>,
        config: &RetrievalConfig,
    ) -> Arc<Exchange> {
        let (reader, writer) = self.stream.into_split();
        Exchange::start(self.peer.to_string(), reader, writer, store, progress, config)
    }
}

async fn dial(
    peer: &PeerAddr,
    candidates: &[SocketAddr],
) -> Result<(TcpStream, SocketAddr), RetrieveError> {
    let mut last_error = None;
    for addr in candidates {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                // Frames are small and latency-bound.
                let _ = stream.set_nodelay(true);
                return Ok((stream, *addr));
            }
            Err(e) => {
                tracing::debug!(remote = %addr, error = %e, "dial failed");
                last_error = Some(e);
            }
        }
    }
    Err(RetrieveError::connection(
        peer,
        last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses to dial".to_string()),
    ))
}
