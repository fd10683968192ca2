use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::decoder::{Decoder, Frame};
use crate::error::TransportError;
use crate::peer::Peer;

pub type HandshakeFn = Arc<dyn Fn(&Peer) -> Result<(), TransportError> + Send + Sync>;
type OnPeerFut = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;
pub type OnPeerFn = Arc<dyn Fn(Arc<Peer>) -> OnPeerFut + Send + Sync>;

/// Handshake that accepts every peer unconditionally — the extension point
/// authentication would hook into.
pub fn no_handshake(_peer: &Peer) -> Result<(), TransportError> {
    Ok(())
}

/// One decoded unit of work handed to the node: either a control payload
/// ready to be parsed, or notice that a stream body is waiting on `peer`.
pub struct RPC {
    pub peer: Arc<Peer>,
    pub payload: Vec<u8>,
    pub stream: bool,
}

pub struct TransportOpts {
    pub listen_addr: String,
    pub handshake_fn: HandshakeFn,
    pub decoder: Arc<dyn Decoder>,
    pub on_peer: OnPeerFn,
}

/// TCP listener + dialer + per-connection frame decoder, feeding one shared
/// inbound RPC queue.
pub struct Transport {
    opts: TransportOpts,
    rpc_tx: mpsc::Sender<RPC>,
    rpc_rx: Mutex<Option<mpsc::Receiver<RPC>>>,
    cancel: CancellationToken,
}

impl Transport {
    pub fn new(opts: TransportOpts) -> Arc<Self> {
        // Capacity 1 approximates the unbuffered handoff the design calls
        // for: the producer (peer handler) blocks until the dispatcher is
        // ready to receive.
        let (rpc_tx, rpc_rx) = mpsc::channel(1);
        Arc::new(Self {
            opts,
            rpc_tx,
            rpc_rx: Mutex::new(Some(rpc_rx)),
            cancel: CancellationToken::new(),
        })
    }

    pub async fn listen_and_accept(self: &Arc<Self>) -> Result<SocketAddr, TransportError> {
        let listener = TcpListener::bind(&self.opts.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "transport bound");

        let this = self.clone();
        tokio::spawn(async move {
            this.accept_loop(listener).await;
        });
        Ok(local_addr)
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("transport accept loop closing");
                    return;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote_addr)) => {
                            let this = self.clone();
                            tokio::spawn(async move {
                                this.handle_connection(stream, remote_addr, true).await;
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }

    pub async fn dial(self: &Arc<Self>, addr: &str) -> Result<(), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        let remote_addr = stream.peer_addr()?;
        tracing::info!(%remote_addr, "dialed peer");
        let this = self.clone();
        tokio::spawn(async move {
            this.handle_connection(stream, remote_addr, false).await;
        });
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, remote_addr: SocketAddr, inbound: bool) {
        let peer = Arc::new(Peer::new(stream, remote_addr, inbound));

        if let Err(e) = (self.opts.handshake_fn)(&peer) {
            tracing::warn!(%remote_addr, error = %e, "peer handshake rejected");
            peer.shutdown().await;
            return;
        }

        if let Err(e) = (self.opts.on_peer)(peer.clone()).await {
            tracing::warn!(%remote_addr, error = %e, "on_peer callback failed");
            peer.shutdown().await;
            return;
        }

        tracing::info!(%remote_addr, inbound, "peer connected");

        loop {
            peer.wait_stream_clear().await;
            match self.opts.decoder.decode(&peer).await {
                Ok(Frame::Stream) => {
                    peer.raise_latch();
                    let rpc = RPC {
                        peer: peer.clone(),
                        payload: Vec::new(),
                        stream: true,
                    };
                    if self.rpc_tx.send(rpc).await.is_err() {
                        break;
                    }
                }
                Ok(Frame::Control(payload)) => {
                    let rpc = RPC {
                        peer: peer.clone(),
                        payload,
                        stream: false,
                    };
                    if self.rpc_tx.send(rpc).await.is_err() {
                        break;
                    }
                }
                Err(TransportError::Closed) => {
                    tracing::info!(%remote_addr, "peer connection closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(%remote_addr, error = %e, "transient decode error, continuing");
                }
            }
        }

        peer.shutdown().await;
    }

    /// Takes ownership of the inbound RPC queue. Only the first caller gets
    /// a receiver; this is meant to be called exactly once, by the node.
    pub async fn consume(&self) -> Option<mpsc::Receiver<RPC>> {
        self.rpc_rx.lock().await.take()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DefaultDecoder;
    use crate::message::{CONTROL, STREAM};
    use tokio::io::AsyncWriteExt;

    fn test_opts(listen_addr: &str, on_peer: OnPeerFn) -> TransportOpts {
        TransportOpts {
            listen_addr: listen_addr.to_string(),
            handshake_fn: Arc::new(no_handshake),
            decoder: Arc::new(DefaultDecoder),
            on_peer,
        }
    }

    #[tokio::test]
    async fn dial_and_accept_both_invoke_on_peer() {
        let (tx, mut rx) = mpsc::channel::<SocketAddr>(2);

        let server_tx = tx.clone();
        let server = Transport::new(test_opts(
            "127.0.0.1:0",
            Arc::new(move |peer: Arc<Peer>| {
                let tx = server_tx.clone();
                Box::pin(async move {
                    let _ = tx.send(peer.remote_addr()).await;
                    Ok(())
                })
            }),
        ));
        let addr = server.listen_and_accept().await.unwrap();

        let client_tx = tx.clone();
        let client = Transport::new(test_opts(
            "127.0.0.1:0",
            Arc::new(move |peer: Arc<Peer>| {
                let tx = client_tx.clone();
                Box::pin(async move {
                    let _ = tx.send(peer.remote_addr()).await;
                    Ok(())
                })
            }),
        ));
        client.listen_and_accept().await.unwrap();
        client.dial(&addr.to_string()).await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn control_frame_is_delivered_to_consume() {
        let server = Transport::new(test_opts("127.0.0.1:0", Arc::new(|_| Box::pin(async { Ok(()) }))));
        let addr = server.listen_and_accept().await.unwrap();
        let mut rx = server.consume().await.unwrap();

        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket.write_all(&[CONTROL]).await.unwrap();
        socket.write_all(b"hello-payload").await.unwrap();

        let rpc = rx.recv().await.unwrap();
        assert!(!rpc.stream);
        assert_eq!(&rpc.payload, b"hello-payload");
    }

    #[tokio::test]
    async fn stream_frame_raises_latch_until_done() {
        let server = Transport::new(test_opts("127.0.0.1:0", Arc::new(|_| Box::pin(async { Ok(()) }))));
        let addr = server.listen_and_accept().await.unwrap();
        let mut rx = server.consume().await.unwrap();

        let mut socket = TcpStream::connect(addr).await.unwrap();
        socket.write_all(&[STREAM]).await.unwrap();
        socket.write_all(b"body-bytes").await.unwrap();

        let rpc = rx.recv().await.unwrap();
        assert!(rpc.stream);

        let mut buf = [0u8; 10];
        rpc.peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"body-bytes");
        rpc.peer.done();
    }
}
