use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use barge_core::config::RetrievalConfig;
use barge_core::{AddressError, Codec, ContentHash, PeerAddr};
use barge_services::{retrieve, walk, BlockStore, ByteCounter, MissReason, RetrieveError, Session};

use crate::*;

const PEER_ID: &str = "QmcgpsyWgH8Y8ajJz1Cu72KnS5uo2Aa2LpzU7kinSupNKC";

/// Malformed addresses fail at parse time, before any socket exists.
#[test]
fn test_malformed_address_rejected() {
    for bad in [
        "",
        "/ip4/127.0.0.1/tcp/4001",
        "/ip4/127.0.0.1/udp/4001/p2p/QmcgpsyWgH8Y8ajJz1Cu72KnS5uo2Aa2LpzU7kinSupNKC",
        "127.0.0.1:4001",
    ] {
        assert!(PeerAddr::parse(bad).is_err(), "{bad:?} should not parse");
    }
}

/// A name that does not resolve is an address error, not a connection error.
#[tokio::test]
async fn test_unresolvable_host_is_address_error() {
    let addr = PeerAddr::parse(&format!("/dns4/no-such-host.invalid/tcp/4001/p2p/{PEER_ID}")).unwrap();
    let progress = Arc::new(ByteCounter::new());

    let err = retrieve(
        ContentHash::of(Codec::Raw, b"anything"),
        &addr,
        &test_config(2),
        progress.clone(),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(err, RetrieveError::Address(AddressError::Unresolvable { .. })),
        "{err}"
    );
    assert_eq!(progress.bytes(), 0);
}

/// DONT_HAVE for the root: missing block, nothing counted, no finalize.
#[tokio::test]
async fn test_dont_have_root() {
    let peer = ScriptedPeer::start(|_| Reply::DontHave).await;
    let root = ContentHash::of(Codec::Node, b"not there");
    let progress = Arc::new(ByteCounter::new());

    let err = retrieve(root, &peer.addr, &test_config(2), progress.clone())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RetrieveError::MissingBlock {
            hash: root,
            reason: MissReason::DontHave
        }
    );
    assert_eq!(progress.bytes(), 0);
    assert!(!progress.is_finished());
    assert_eq!(peer.wants().len(), 1);
}

/// Bytes that hash differently: mismatch, and the store stays empty.
#[tokio::test]
async fn test_hash_mismatch_not_stored() {
    let peer = ScriptedPeer::start(|_| Reply::Block(Bytes::from_static(b"forged"))).await;
    let root = ContentHash::of(Codec::Raw, b"genuine");

    let session = Session::connect(&peer.addr, Duration::from_secs(2))
        .await
        .expect("connect");
    let store = BlockStore::new();
    let progress = Arc::new(ByteCounter::new());
    let exchange = session.into_exchange(store.clone(), progress.clone(), &test_config(2));

    let err = walk(exchange, root, 2, CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RetrieveError::HashMismatch {
            expected: root,
            actual: ContentHash::of(Codec::Raw, b"forged"),
        }
    );
    assert_eq!(store.count(), 0);
    assert_eq!(progress.bytes(), 0);
}

/// A silent peer is re-asked until attempts run out.
#[tokio::test]
async fn test_timeout_retries_then_missing() {
    let peer = ScriptedPeer::start(|_| Reply::Silent).await;
    let root = ContentHash::of(Codec::Raw, b"slow");
    let config = RetrievalConfig {
        want_timeout_ms: 50,
        max_attempts: 3,
        ..test_config(2)
    };

    let err = retrieve(root, &peer.addr, &config, Arc::new(ByteCounter::new()))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RetrieveError::MissingBlock {
            hash: root,
            reason: MissReason::TimedOut { attempts: 3 }
        }
    );
    assert_eq!(peer.wants(), vec![root; 3]);
}

/// One missing child fails the whole retrieval with that child's error.
#[tokio::test]
async fn test_missing_child_fails_fast() {
    let present = leaf(b"present");
    let absent = leaf(b"absent");
    let root = node(&[&present, &absent]);
    let peer = ScriptedPeer::serving(&[root.clone(), present]).await;

    let err = retrieve(
        *root.hash(),
        &peer.addr,
        &test_config(2),
        Arc::new(ByteCounter::new()),
    )
    .await
    .unwrap_err();

    assert_eq!(
        err,
        RetrieveError::MissingBlock {
            hash: *absent.hash(),
            reason: MissReason::DontHave
        }
    );
}

/// Dialing a provider under someone else's peer id is refused.
#[tokio::test]
async fn test_identity_mismatch() {
    let provider = TestProvider::start(&[b"content".as_slice()], 1024).await;
    let port = provider.addr.port();
    let wrong = PeerAddr::parse(&format!("/ip4/127.0.0.1/tcp/{port}/p2p/{PEER_ID}")).unwrap();

    let err = retrieve(
        provider.dags[0].root,
        &wrong,
        &test_config(2),
        Arc::new(ByteCounter::new()),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(&err, RetrieveError::Connection { reason, .. } if reason.contains("mismatch")),
        "{err}"
    );
}

/// The peer hangs up mid-walk: connection error, not a hang.
#[tokio::test]
async fn test_connection_lost_mid_walk() {
    let peer = ScriptedPeer::start(|_| Reply::Hangup).await;

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        retrieve(
            ContentHash::of(Codec::Raw, b"whatever"),
            &peer.addr,
            &test_config(2),
            Arc::new(ByteCounter::new()),
        ),
    )
    .await
    .expect("retrieval should not hang")
    .unwrap_err();

    assert!(matches!(err, RetrieveError::Connection { .. }), "{err}");
}

/// Nothing listening: connection error.
#[tokio::test]
async fn test_unreachable_peer() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let addr = PeerAddr::parse(&format!("/ip4/127.0.0.1/tcp/{port}/p2p/{PEER_ID}")).unwrap();

    let err = retrieve(
        ContentHash::of(Codec::Raw, b"x"),
        &addr,
        &test_config(2),
        Arc::new(ByteCounter::new()),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RetrieveError::Connection { .. }), "{err}");
}
