use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dstore_node::{Node, NodeOpts};
use dstore_store::Sha1Transform;

/// One node to bring up. The launcher is intentionally not a CLI: the fleet
/// is a fixed, typed list, the direct analogue of the reference `main.go`'s
/// two `CreateServer` calls.
struct NodeSpec {
    listen_addr: &'static str,
    root_dir: &'static str,
    seed_peers: &'static [&'static str],
}

const FLEET: &[NodeSpec] = &[
    NodeSpec {
        listen_addr: "127.0.0.1:8080",
        root_dir: "8080-dir",
        seed_peers: &[],
    },
    NodeSpec {
        listen_addr: "127.0.0.1:3030",
        root_dir: "3030-dir",
        seed_peers: &["127.0.0.1:8080"],
    },
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut nodes = Vec::with_capacity(FLEET.len());
    for spec in FLEET {
        let node = Node::new(NodeOpts {
            listen_addr: spec.listen_addr.to_string(),
            root_dir: PathBuf::from(spec.root_dir),
            seed_peers: spec.seed_peers.iter().map(|s| s.to_string()).collect(),
            transform: Arc::new(Sha1Transform),
            owner_id: None,
        });
        node.start()
            .await
            .with_context(|| format!("failed to start node on {}", spec.listen_addr))?;
        nodes.push(node);
    }

    tracing::info!(count = nodes.len(), "fleet started");

    std::future::pending::<()>().await;
    Ok(())
}
