//! Peer addressing — multiaddr strings to {endpoint, peer identity}.
//!
//! Accepted shapes:
//!   /ip4/<addr>/tcp/<port>/p2p/<peer id>
//!   /ip6/<addr>/tcp/<port>/p2p/<peer id>
//!   /dns|dns4|dns6/<host>/tcp/<port>/p2p/<peer id>
//!
//! Anything else is an `AddressError`. Name resolution happens when the
//! session dials, still before any connection attempt.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use libp2p_identity::PeerId;
use multiaddr::{Multiaddr, Protocol};

use crate::hash::{ContentHash, HashError};

/// Where to dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ip(IpAddr),
    Dns(String),
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Host::Ip(ip) => write!(f, "{ip}"),
            Host::Dns(name) => f.write_str(name),
        }
    }
}

/// A parsed, dialable peer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddr {
    multiaddr: Multiaddr,
    host: Host,
    port: u16,
    peer_id: PeerId,
}

impl PeerAddr {
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let multiaddr: Multiaddr = s
            .parse()
            .map_err(|e: multiaddr::Error| AddressError::Malformed(e.to_string()))?;
        Self::from_multiaddr(multiaddr)
    }

    pub fn from_multiaddr(multiaddr: Multiaddr) -> Result<Self, AddressError> {
        let mut host = None;
        let mut port = None;
        let mut peer_id = None;

        for proto in multiaddr.iter() {
            match proto {
                Protocol::Ip4(ip) if host.is_none() => host = Some(Host::Ip(ip.into())),
                Protocol::Ip6(ip) if host.is_none() => host = Some(Host::Ip(ip.into())),
                Protocol::Dns(name) | Protocol::Dns4(name) | Protocol::Dns6(name)
                    if host.is_none() =>
                {
                    host = Some(Host::Dns(name.to_string()))
                }
                Protocol::Tcp(p) if host.is_some() && port.is_none() => port = Some(p),
                Protocol::P2p(id) if port.is_some() && peer_id.is_none() => peer_id = Some(id),
                other => return Err(AddressError::Unsupported(other.to_string())),
            }
        }

        let host = host.ok_or(AddressError::MissingHost)?;
        let port = port.ok_or(AddressError::MissingTcp)?;
        let peer_id = peer_id.ok_or(AddressError::MissingPeerId)?;

        Ok(Self {
            multiaddr,
            host,
            port,
            peer_id,
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn multiaddr(&self) -> &Multiaddr {
        &self.multiaddr
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.multiaddr)
    }
}

impl FromStr for PeerAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a user-supplied root hash. Failures are address errors: both are
/// malformed command input.
pub fn parse_content_hash(s: &str) -> Result<ContentHash, AddressError> {
    s.trim().parse().map_err(AddressError::ContentHash)
}

/// Parse a listen multiaddr, `/ip4|ip6/<addr>/tcp/<port>`. No names, no
/// peer id: this is our own socket.
pub fn listen_addr(s: &str) -> Result<SocketAddr, AddressError> {
    let multiaddr: Multiaddr = s
        .parse()
        .map_err(|e: multiaddr::Error| AddressError::Malformed(e.to_string()))?;

    let mut ip: Option<IpAddr> = None;
    let mut port = None;
    for proto in multiaddr.iter() {
        match proto {
            Protocol::Ip4(a) if ip.is_none() => ip = Some(a.into()),
            Protocol::Ip6(a) if ip.is_none() => ip = Some(a.into()),
            Protocol::Tcp(p) if ip.is_some() && port.is_none() => port = Some(p),
            other => return Err(AddressError::Unsupported(other.to_string())),
        }
    }
    let ip = ip.ok_or(AddressError::MissingHost)?;
    let port = port.ok_or(AddressError::MissingTcp)?;
    Ok(SocketAddr::new(ip, port))
}

/// Build the dialable multiaddr for a listening socket.
pub fn dial_addr(ip: IpAddr, port: u16, peer_id: PeerId) -> Multiaddr {
    Multiaddr::empty()
        .with(ip.into())
        .with(Protocol::Tcp(port))
        .with(Protocol::P2p(peer_id))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("malformed multiaddr: {0}")]
    Malformed(String),

    #[error("unsupported or misplaced multiaddr segment: {0}")]
    Unsupported(String),

    #[error("multiaddr has no /ip4, /ip6 or /dns segment")]
    MissingHost,

    #[error("multiaddr has no /tcp segment")]
    MissingTcp,

    #[error("multiaddr has no /p2p peer id")]
    MissingPeerId,

    #[error("cannot resolve {host}: {reason}")]
    Unresolvable { host: String, reason: String },

    #[error("invalid content hash: {0}")]
    ContentHash(HashError),
}
