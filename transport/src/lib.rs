//! Framed TCP peer transport: listener, dialer, per-connection frame decoder,
//! and the single-slot latch that keeps a stream body from racing the next
//! control frame on the same socket.

mod decoder;
mod error;
mod latch;
mod message;
mod peer;
mod transport;

pub use decoder::{DefaultDecoder, Decoder, Frame};
pub use error::TransportError;
pub use message::{CONTROL, ControlMessage, MAX_CONTROL_FRAME, STREAM};
pub use peer::Peer;
pub use transport::{HandshakeFn, OnPeerFn, RPC, Transport, TransportOpts, no_handshake};
