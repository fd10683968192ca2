use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dstore_store::{PathTransform, Store, split_digest};
use dstore_transport::{ControlMessage, Decoder, DefaultDecoder, OnPeerFn, Peer, RPC, Transport, TransportOpts, no_handshake};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::broadcast::{broadcast_control, stream_to_all};
use crate::error::NodeError;

/// How long `read()` waits for any peer to answer a `GetFile` broadcast
/// before giving up and reporting the key as absent cluster-wide.
const REMOTE_READ_TIMEOUT: Duration = Duration::from_secs(2);

pub struct NodeOpts {
    pub listen_addr: String,
    pub root_dir: PathBuf,
    pub seed_peers: Vec<String>,
    pub transform: Arc<dyn PathTransform>,
    /// Stable node identity namespacing this node's keys on every peer.
    /// A UUID is generated if empty.
    pub owner_id: Option<String>,
}

struct PendingStore {
    owner_id: String,
    hashed_key: String,
    size: u64,
}

struct PendingGet {
    owner_id: String,
    key: String,
    tx: oneshot::Sender<()>,
}

/// Owns one transport and one store; drives broadcast-on-write,
/// broadcast-and-await-on-read-miss, and inbound replication.
pub struct Node {
    transport: Arc<Transport>,
    store: Store,
    encrypt_key: [u8; 32],
    owner_id: String,
    peers: Arc<RwLock<HashMap<String, Arc<Peer>>>>,
    seed_peers: Vec<String>,
    pending_stores: Mutex<HashMap<SocketAddr, PendingStore>>,
    pending_get: Mutex<Option<PendingGet>>,
    shutdown: CancellationToken,
}

impl Node {
    pub fn new(opts: NodeOpts) -> Arc<Self> {
        let owner_id = opts
            .owner_id
            .filter(|s| !s.is_empty())
            .unwrap_or_else(dstore_crypto::new_uuid);

        let store = Store::new(opts.root_dir, opts.transform);
        let peers: Arc<RwLock<HashMap<String, Arc<Peer>>>> = Arc::new(RwLock::new(HashMap::new()));

        let on_peer_peers = peers.clone();
        let on_peer: OnPeerFn = Arc::new(move |peer: Arc<Peer>| {
            let peers = on_peer_peers.clone();
            Box::pin(async move {
                let addr = peer.remote_addr().to_string();
                peers.write().await.insert(addr, peer);
                Ok(())
            })
        });

        let transport = Transport::new(TransportOpts {
            listen_addr: opts.listen_addr,
            handshake_fn: Arc::new(no_handshake),
            decoder: Arc::new(DefaultDecoder) as Arc<dyn Decoder>,
            on_peer,
        });

        Arc::new(Self {
            transport,
            store,
            encrypt_key: dstore_crypto::new_random_key(),
            owner_id,
            peers,
            seed_peers: opts.seed_peers,
            pending_stores: Mutex::new(HashMap::new()),
            pending_get: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Binds the listener, spawns the inbound dispatcher, and dials every
    /// configured seed peer (dial failures are logged, not fatal).
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, NodeError> {
        let addr = self.transport.listen_and_accept().await?;

        let rx = self
            .transport
            .consume()
            .await
            .expect("Node::start calls Transport::consume exactly once");
        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.dispatch_loop(rx).await;
        });

        for seed in &self.seed_peers {
            if let Err(e) = self.transport.dial(seed).await {
                tracing::warn!(addr = %seed, error = %e, "failed to dial seed peer");
            }
        }

        tracing::info!(owner_id = %self.owner_id, %addr, "node started");
        Ok(addr)
    }

    pub fn shutdown(&self) {
        tracing::info!(owner_id = %self.owner_id, "node shutting down");
        self.shutdown.cancel();
    }

    /// Writes `reader`'s full contents locally, then replicates the
    /// plaintext's single-IV encryption to every currently connected peer.
    /// Returns 1 (self) plus the number of peers successfully reached.
    pub async fn store<R: AsyncRead + Unpin>(
        self: &Arc<Self>,
        key: &str,
        mut reader: R,
    ) -> Result<usize, NodeError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;

        let n = self.store.write(&self.owner_id, key, buf.as_slice()).await?;

        let hashed_key = dstore_store::sha1_hex(key);
        let msg = ControlMessage::StoreFile {
            owner_id: self.owner_id.clone(),
            hashed_key,
            size: n as u64 + dstore_crypto::IV_LEN as u64,
        };

        let peers_guard = self.peers.read().await;
        broadcast_control(&peers_guard, &msg).await;

        let mut ciphertext = Vec::new();
        dstore_crypto::copy_encrypt(&self.encrypt_key, &mut buf.as_slice(), &mut ciphertext).await?;
        let replicated = stream_to_all(&peers_guard, &ciphertext).await;
        drop(peers_guard);

        tracing::debug!(key, bytes = n, replicated, "stored and replicated");
        Ok(1 + replicated)
    }

    /// Serves from the local store if present; otherwise broadcasts a
    /// `GetFile` and waits for the first peer to answer.
    pub async fn read(self: &Arc<Self>, key: &str) -> Result<Vec<u8>, NodeError> {
        if self.store.has(&self.owner_id, key).await {
            return Ok(self.store.read(&self.owner_id, key).await?);
        }

        // Registered before the broadcast goes out: a peer that answers
        // fast enough must always find a pending_get slot waiting, or its
        // reply is treated as unsolicited and its body left unread on the
        // wire (see receive_get_reply).
        let (tx, rx) = oneshot::channel();
        *self.pending_get.lock().await = Some(PendingGet {
            owner_id: self.owner_id.clone(),
            key: key.to_string(),
            tx,
        });

        let hashed_key = dstore_store::sha1_hex(key);
        let msg = ControlMessage::GetFile {
            owner_id: self.owner_id.clone(),
            hashed_key,
        };
        {
            let peers_guard = self.peers.read().await;
            broadcast_control(&peers_guard, &msg).await;
        }

        match tokio::time::timeout(REMOTE_READ_TIMEOUT, rx).await {
            Ok(Ok(())) => Ok(self.store.read(&self.owner_id, key).await?),
            _ => {
                *self.pending_get.lock().await = None;
                Err(NodeError::NotFoundAnywhere {
                    owner_id: self.owner_id.clone(),
                    key: key.to_string(),
                })
            }
        }
    }

    /// Requires local presence; deletes locally, then broadcasts the
    /// deletion so peers can drop their replicated copy.
    pub async fn delete(self: &Arc<Self>, key: &str) -> Result<(), NodeError> {
        self.store.delete(&self.owner_id, key).await?;

        let hashed_key = dstore_store::sha1_hex(key);
        let msg = ControlMessage::DeleteKey {
            owner_id: self.owner_id.clone(),
            hashed_key,
        };
        let peers_guard = self.peers.read().await;
        broadcast_control(&peers_guard, &msg).await;
        Ok(())
    }

    async fn dispatch_loop(self: Arc<Self>, mut rx: mpsc::Receiver<RPC>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("inbound dispatcher shutting down");
                    break;
                }
                rpc = rx.recv() => {
                    match rpc {
                        // Handled in-line, not spawned: a peer's StoreFile
                        // control message and the STREAM body that follows
                        // it must be processed in the order they arrive, or
                        // the pending_stores correlation below can race.
                        Some(rpc) => self.clone().handle_rpc(rpc).await,
                        None => break,
                    }
                }
            }
        }

        self.transport.close();
        let peers_guard = self.peers.read().await;
        for peer in peers_guard.values() {
            peer.shutdown().await;
        }
    }

    async fn handle_rpc(self: Arc<Self>, rpc: RPC) {
        if rpc.stream {
            self.handle_stream(rpc.peer).await;
            return;
        }

        let addr = rpc.peer.remote_addr();
        if !self.peers.read().await.contains_key(&addr.to_string()) {
            let err = NodeError::UnknownPeer(addr);
            tracing::warn!(%addr, error = %err, "dropping control message");
            return;
        }

        let msg = match ControlMessage::decode(&rpc.payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(%addr, error = %e, "failed to decode control message, ignoring");
                return;
            }
        };

        match msg {
            ControlMessage::StoreFile { owner_id, hashed_key, size } => {
                tracing::debug!(%addr, owner_id, hashed_key, size, "inbound StoreFile");
                self.pending_stores
                    .lock()
                    .await
                    .insert(addr, PendingStore { owner_id, hashed_key, size });
            }
            ControlMessage::GetFile { owner_id, hashed_key } => {
                tracing::debug!(%addr, owner_id, hashed_key, "inbound GetFile");
                self.reply_to_get(&rpc.peer, &owner_id, &hashed_key).await;
            }
            ControlMessage::DeleteKey { owner_id, hashed_key } => {
                tracing::debug!(%addr, owner_id, hashed_key, "inbound DeleteKey");
                let key_path = split_digest(&hashed_key);
                if let Err(e) = self.store.delete_path(&owner_id, &key_path, &hashed_key).await {
                    tracing::warn!(%addr, owner_id, hashed_key, error = %e, "best-effort remote delete missed");
                }
            }
        }
    }

    async fn handle_stream(self: Arc<Self>, peer: Arc<Peer>) {
        let addr = peer.remote_addr();
        let pending_store = self.pending_stores.lock().await.remove(&addr);

        match pending_store {
            Some(PendingStore { owner_id, hashed_key, size }) => {
                let key_path = split_digest(&hashed_key);
                let mut reader = peer.lock_reader().await;
                let mut limited = (&mut *reader).take(size);
                if let Err(e) = self.store.write_path(&owner_id, &key_path, &mut limited).await {
                    tracing::warn!(%addr, owner_id, hashed_key, error = %e, "failed to persist replicated body");
                }
            }
            None => {
                self.receive_get_reply(&peer).await;
            }
        }

        peer.done();
    }

    async fn receive_get_reply(self: &Arc<Self>, peer: &Peer) {
        let pending = self.pending_get.lock().await.take();
        let Some(pending) = pending else {
            tracing::warn!(addr = %peer.remote_addr(), "received unsolicited stream frame, no pending get or store");
            return;
        };

        let mut size_buf = [0u8; 8];
        if let Err(e) = peer.read_exact(&mut size_buf).await {
            tracing::warn!(addr = %peer.remote_addr(), error = %e, "failed to read remote reply size");
            return;
        }
        let size = u64::from_le_bytes(size_buf);

        let mut reader = peer.lock_reader().await;
        let mut limited = (&mut *reader).take(size);
        let result = self
            .store
            .write_decrypted(&self.encrypt_key, &pending.owner_id, &pending.key, &mut limited)
            .await;
        drop(reader);

        match result {
            Ok(_) => {
                let _ = pending.tx.send(());
            }
            Err(e) => {
                tracing::warn!(owner_id = %pending.owner_id, key = %pending.key, error = %e, "failed to persist remote read reply");
            }
        }
    }

    async fn reply_to_get(self: &Arc<Self>, peer: &Peer, owner_id: &str, hashed_key: &str) {
        let key_path = split_digest(hashed_key);
        if !self.store.has_path(owner_id, &key_path).await {
            tracing::debug!(owner_id, hashed_key, "GetFile miss, not responding");
            return;
        }

        let size = match self.store.file_size_path(owner_id, &key_path, hashed_key).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(owner_id, hashed_key, error = %e, "failed to stat blob for GetFile reply");
                return;
            }
        };

        // Held for the tag byte, size prefix, and body together: a store()
        // broadcast on this same peer must never interleave its own tag and
        // payload with this reply's.
        let mut writer = peer.lock_writer().await;
        if writer.write_all(&[dstore_transport::STREAM]).await.is_err() {
            return;
        }
        if writer.write_all(&size.to_le_bytes()).await.is_err() {
            return;
        }

        if let Err(e) = self
            .store
            .copy_read_path(owner_id, &key_path, hashed_key, &mut *writer)
            .await
        {
            tracing::warn!(owner_id, hashed_key, error = %e, "failed to stream blob for GetFile reply");
        }
    }
}
