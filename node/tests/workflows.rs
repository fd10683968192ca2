use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dstore_node::{Node, NodeOpts};
use dstore_store::Sha1Transform;
use tempfile::TempDir;
use tokio::time::sleep;

const SETTLE: Duration = Duration::from_millis(200);

async fn spawn_node(seed_peers: Vec<String>) -> Result<(Arc<Node>, TempDir, SocketAddr)> {
    let dir = tempfile::tempdir()?;
    let node = Node::new(NodeOpts {
        listen_addr: "127.0.0.1:0".to_string(),
        root_dir: dir.path().to_path_buf(),
        seed_peers,
        transform: Arc::new(Sha1Transform),
        owner_id: None,
    });
    let addr = node.start().await?;
    Ok((node, dir, addr))
}

fn blob_path(root: &std::path::Path, owner_id: &str, key: &str) -> std::path::PathBuf {
    let hashed = dstore_store::sha1_hex(key);
    let key_path = dstore_store::split_digest(&hashed);
    root.join(owner_id).join(&key_path.path_name).join(&key_path.file_name)
}

/// S1: a two-node fleet; a store on the dialing node replicates plaintext
/// length + 16 (IV) bytes of ciphertext to the node it dialed, and reading
/// back locally returns the original bytes.
#[tokio::test]
async fn store_replicates_to_connected_peer() -> Result<()> {
    let (n1, d1, addr1) = spawn_node(vec![]).await?;
    let (n2, _d2, _addr2) = spawn_node(vec![addr1.to_string()]).await?;
    sleep(SETTLE).await;

    let count = n2.store("Hello", "JIDJISED".as_bytes()).await?;
    assert!(count >= 1);
    sleep(SETTLE).await;

    let replicated_path = blob_path(d1.path(), n2.owner_id(), "Hello");
    let meta = tokio::fs::metadata(&replicated_path).await?;
    assert_eq!(meta.len(), 8 + 16);

    assert_eq!(n2.read("Hello").await?, b"JIDJISED");
    Ok(())
}

/// S2: a three-node fleet; deleting a key removes it locally and propagates
/// to peers, so a subsequent read finds it nowhere and errors.
#[tokio::test]
async fn delete_propagates_and_read_then_fails() -> Result<()> {
    let (n1, _d1, addr1) = spawn_node(vec![]).await?;
    let (n2, _d2, addr2) = spawn_node(vec![addr1.to_string()]).await?;
    let (n3, d3, _addr3) = spawn_node(vec![addr1.to_string(), addr2.to_string()]).await?;
    sleep(SETTLE).await;

    for i in 0..10 {
        n3.store(&format!("item_{i}"), format!("big conten{i}").as_bytes())
            .await?;
    }
    sleep(SETTLE).await;

    n3.delete("item_1").await?;
    sleep(SETTLE).await;

    assert!(!blob_path(d3.path(), n3.owner_id(), "item_1").exists());
    assert!(n3.read("item_1").await.is_err());

    let _ = &n1;
    let _ = &n2;
    Ok(())
}

/// S3: a node that loses its local copy (but whose peers still hold the
/// replicated ciphertext) recovers the plaintext through a remote read.
#[tokio::test]
async fn read_recovers_from_peer_after_local_loss() -> Result<()> {
    let (n1, _d1, addr1) = spawn_node(vec![]).await?;
    let (n2, _d2, addr2) = spawn_node(vec![addr1.to_string()]).await?;
    let (n3, d3, _addr3) = spawn_node(vec![addr1.to_string(), addr2.to_string()]).await?;
    sleep(SETTLE).await;

    n3.store("k", b"v".as_slice()).await?;
    sleep(SETTLE).await;

    let local_path = blob_path(d3.path(), n3.owner_id(), "k");
    tokio::fs::remove_file(&local_path).await?;
    assert!(!local_path.exists());

    let recovered = n3.read("k").await?;
    assert_eq!(recovered, b"v");
    assert!(local_path.exists());
    Ok(())
}
