use std::io;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("i/o error")]
    Io(#[from] io::Error),
    #[error("failed to decode control message")]
    Decode(#[from] minicbor::decode::Error),
    #[error("peer handshake rejected")]
    HandshakeRejected,
    #[error("transport closed")]
    Closed,
}
