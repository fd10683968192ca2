use tokio::io::AsyncReadExt;

use crate::error::TransportError;
use crate::message::{CONTROL, MAX_CONTROL_FRAME, STREAM};
use crate::peer::Peer;

/// Outcome of decoding one frame header off a peer socket.
pub enum Frame {
    /// A fully-read control payload, ready for `ControlMessage::decode`.
    Control(Vec<u8>),
    /// A stream body is starting; the caller must read it off the same
    /// socket and call `Peer::done` before the next frame can be decoded.
    Stream,
}

#[async_trait::async_trait]
pub trait Decoder: Send + Sync {
    async fn decode(&self, peer: &Peer) -> Result<Frame, TransportError>;
}

/// Reads one tag byte, then for `CONTROL` does a single bounded read of up
/// to [`MAX_CONTROL_FRAME`] bytes and hands the raw bytes back uninterpreted.
/// Matches the reference decoder: no length-prefixing, no multi-read
/// reassembly. A control message is assumed to arrive in one `read()` call.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultDecoder;

#[async_trait::async_trait]
impl Decoder for DefaultDecoder {
    async fn decode(&self, peer: &Peer) -> Result<Frame, TransportError> {
        let mut tag = [0u8; 1];
        {
            let mut reader = peer.lock_reader().await;
            let n = reader.read(&mut tag).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
        }

        match tag[0] {
            STREAM => Ok(Frame::Stream),
            CONTROL => {
                let mut buf = vec![0u8; MAX_CONTROL_FRAME];
                let n = {
                    let mut reader = peer.lock_reader().await;
                    reader.read(&mut buf).await?
                };
                if n == 0 {
                    return Err(TransportError::Closed);
                }
                buf.truncate(n);
                Ok(Frame::Control(buf))
            }
            other => Err(TransportError::Decode(minicbor::decode::Error::message(
                format!("unknown frame tag {other}"),
            ))),
        }
    }
}
