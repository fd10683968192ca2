use std::net::SocketAddr;

#[derive(thiserror::Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Store(#[from] dstore_store::StoreError),
    #[error(transparent)]
    Transport(#[from] dstore_transport::TransportError),
    #[error(transparent)]
    Crypto(#[from] dstore_crypto::CryptoError),
    #[error("i/o error")]
    Io(#[from] std::io::Error),
    #[error("control message arrived from an unregistered peer: {0}")]
    UnknownPeer(SocketAddr),
    #[error("key not found anywhere in the cluster: owner={owner_id} key={key}")]
    NotFoundAnywhere { owner_id: String, key: String },
}
