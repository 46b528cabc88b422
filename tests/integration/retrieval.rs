use std::sync::Arc;

use barge_services::{materialize, retrieve, ByteCounter};

use crate::*;

/// Multi-level file: provider imports, client retrieves and writes it out.
#[tokio::test]
async fn test_full_retrieval_with_output() {
    let data: Vec<u8> = (0..40_000u32).map(|i| (i * 7 % 256) as u8).collect();
    let provider = TestProvider::start(&[data.as_slice()], 64).await;
    let root = provider.dags[0].root;

    let progress = Arc::new(ByteCounter::new());
    let (retrieval, store) = retrieve(root, &provider.addr, &test_config(4), progress.clone())
        .await
        .expect("retrieval should succeed");

    let served = provider.provider.store();
    assert_eq!(retrieval.root, root);
    assert_eq!(retrieval.blocks, served.count());
    assert_eq!(retrieval.bytes, served.size());
    assert_eq!(progress.bytes(), retrieval.bytes);
    assert!(progress.is_finished());

    let out = std::env::temp_dir().join(format!("barge-it-{}.bin", std::process::id()));
    let written = materialize(&store, root, &out).expect("materialize");
    assert_eq!(written, data.len() as u64);
    assert_eq!(std::fs::read(&out).unwrap(), data);
    let _ = std::fs::remove_file(&out);
}

/// Repeated content yields shared leaves; each is still transferred once.
#[tokio::test]
async fn test_repeated_chunks_fetched_once() {
    let data = vec![0xAAu8; 64 * 50];
    let provider = TestProvider::start(&[data.as_slice()], 64).await;
    let root = provider.dags[0].root;

    let (retrieval, store) = retrieve(
        root,
        &provider.addr,
        &test_config(3),
        Arc::new(ByteCounter::new()),
    )
    .await
    .unwrap();

    // One distinct leaf plus the root.
    assert_eq!(retrieval.blocks, 2);
    assert_eq!(retrieval.bytes, store.size());
}

/// A raw root: one want, bytes equal the block size.
#[tokio::test]
async fn test_leaf_root_single_fetch() {
    let block = leaf(b"a single raw block");
    let peer = ScriptedPeer::serving(&[block.clone()]).await;

    let progress = Arc::new(ByteCounter::new());
    let (retrieval, _) = retrieve(*block.hash(), &peer.addr, &test_config(2), progress.clone())
        .await
        .unwrap();

    assert_eq!(peer.wants(), vec![*block.hash()]);
    assert_eq!(retrieval.blocks, 1);
    assert_eq!(retrieval.bytes, block.len() as u64);
    assert_eq!(progress.bytes(), block.len() as u64);
}

/// root → {X, Y, Z}, X → Z: four wants, one per hash.
#[tokio::test]
async fn test_shared_child_one_want() {
    let z = leaf(b"zzz");
    let y = leaf(b"yy");
    let x = node(&[&z]);
    let root = node(&[&x, &y, &z]);
    let peer = ScriptedPeer::serving(&[root.clone(), x.clone(), y.clone(), z.clone()]).await;

    let (retrieval, _) = retrieve(
        *root.hash(),
        &peer.addr,
        &test_config(2),
        Arc::new(ByteCounter::new()),
    )
    .await
    .unwrap();

    let counts = peer.want_counts();
    assert_eq!(peer.wants().len(), 4);
    assert!(counts.values().all(|n| *n == 1), "{counts:?}");
    assert_eq!(retrieval.blocks, 4);
    assert_eq!(
        retrieval.bytes,
        (root.len() + x.len() + y.len() + z.len()) as u64
    );
}

/// Wide DAG with concurrency 1 still terminates with every block.
#[tokio::test]
async fn test_serial_walk_completes() {
    let leaves: Vec<_> = (0..30).map(|i| leaf(format!("leaf {i}").as_bytes())).collect();
    let refs: Vec<&_> = leaves.iter().collect();
    let root = node(&refs);
    let mut all = leaves.clone();
    all.push(root.clone());
    let peer = ScriptedPeer::serving(&all).await;

    let (retrieval, _) = retrieve(
        *root.hash(),
        &peer.addr,
        &test_config(1),
        Arc::new(ByteCounter::new()),
    )
    .await
    .unwrap();

    assert_eq!(retrieval.blocks, 31);
    assert_eq!(peer.wants().len(), 31);
}
