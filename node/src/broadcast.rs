use std::collections::HashMap;
use std::sync::Arc;

use dstore_transport::{CONTROL, ControlMessage, Peer, STREAM};

/// Writes `msg` to every peer, logging and skipping peers whose socket
/// write fails. Returns the number of peers it reached.
pub async fn broadcast_control(peers: &HashMap<String, Arc<Peer>>, msg: &ControlMessage) -> usize {
    let payload = msg.encode_to_vec();
    let mut reached = 0;
    for peer in peers.values() {
        if write_control(peer, &payload).await {
            reached += 1;
        } else {
            tracing::warn!(peer = %peer.remote_addr(), ?msg, "failed to broadcast control message");
        }
    }
    reached
}

async fn write_control(peer: &Peer, payload: &[u8]) -> bool {
    peer.write_frame(&[&[CONTROL], payload]).await.is_ok()
}

/// Streams the same `body` bytes (already encrypted, IV prepended) to every
/// peer behind a `STREAM` tag. The body is identical for every peer: one
/// encryption pass, one IV, reused across the whole fan-out.
pub async fn stream_to_all(peers: &HashMap<String, Arc<Peer>>, body: &[u8]) -> usize {
    let mut reached = 0;
    for peer in peers.values() {
        let ok = peer.write_frame(&[&[STREAM], body]).await.is_ok();
        if ok {
            reached += 1;
        } else {
            tracing::warn!(peer = %peer.remote_addr(), "failed to stream body to peer");
        }
    }
    reached
}
