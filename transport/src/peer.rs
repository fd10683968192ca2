use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, MutexGuard};

use crate::error::TransportError;
use crate::latch::StreamLatch;

/// One TCP connection to a remote node, viewed as a byte stream plus a
/// stream-completion signal.
///
/// The read and write halves are split so the frame decoder (reader side)
/// and the broadcast/dispatch logic (writer side, and occasionally the
/// reader side for stream bodies) never contend on the same lock.
pub struct Peer {
    remote_addr: SocketAddr,
    inbound: bool,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    latch: StreamLatch,
}

impl Peer {
    pub fn new(stream: TcpStream, remote_addr: SocketAddr, inbound: bool) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            remote_addr,
            inbound,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            latch: StreamLatch::new(),
        }
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn inbound(&self) -> bool {
        self.inbound
    }

    /// Locks and returns the read half, for streaming reads (e.g. through
    /// `copy_decrypt` or a length-limited reader).
    pub async fn lock_reader(&self) -> MutexGuard<'_, OwnedReadHalf> {
        self.reader.lock().await
    }

    /// Locks and returns the write half, for streaming writes (e.g. through
    /// `copy_encrypt` or `copy_read`).
    pub async fn lock_writer(&self) -> MutexGuard<'_, OwnedWriteHalf> {
        self.writer.lock().await
    }

    /// Writes every part of `parts` back-to-back under a single held writer
    /// lock, so a multi-part frame (tag byte, then payload or size prefix)
    /// can never be interleaved with another writer's frame on this peer.
    pub async fn write_frame(&self, parts: &[&[u8]]) -> Result<(), TransportError> {
        let mut w = self.writer.lock().await;
        for part in parts {
            w.write_all(part).await?;
        }
        Ok(())
    }

    pub async fn read_exact(&self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut r = self.reader.lock().await;
        r.read_exact(buf).await?;
        Ok(())
    }

    /// Signals the frame decoder that a STREAM body is starting; the decoder
    /// must not read the next frame header until [`Peer::done`] is called.
    pub fn raise_latch(&self) {
        self.latch.raise();
    }

    /// Releases the stream latch once the stream body has been fully
    /// consumed by the caller.
    pub fn done(&self) {
        self.latch.done();
    }

    pub async fn wait_stream_clear(&self) {
        self.latch.wait_clear().await;
    }

    pub async fn shutdown(&self) {
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("remote_addr", &self.remote_addr)
            .field("inbound", &self.inbound)
            .finish()
    }
}
