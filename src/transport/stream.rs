//! # Stream endpoint: TCP with cached peer connections.
//!
//! Envelopes travel as `u32`-BE length-prefixed bincode frames over TCP.
//! Outbound connections are opened on first send to a peer and cached for
//! reuse; a send failure evicts the cached connection and retries once over
//! a fresh one. Inbound connections are accepted by a listener task that
//! spawns one reader per peer, all feeding the shared inbound channel.
//!
//! ## Rules
//! - Frames above [`MAX_FRAME`] are rejected on both sides.
//! - A reader that hits EOF or a codec error exits alone; the listener and
//!   the other readers keep running.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

use super::{Endpoint, Envelope, Inbound, INBOUND_CAPACITY};

/// Upper bound on one frame; anything larger is treated as corrupt.
const MAX_FRAME: usize = 16 * 1024 * 1024;

/// TCP-backed endpoint.
#[derive(Debug)]
pub struct StreamEndpoint {
    local: SocketAddr,
    peers: Mutex<HashMap<SocketAddr, TcpStream>>,
}

impl StreamEndpoint {
    /// Binds a listener on a dynamic loopback port and starts accepting.
    pub async fn bind(cancel: CancellationToken) -> Result<(Self, Inbound), TransportError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local = listener.local_addr()?;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(accept_loop(listener, tx, cancel));

        Ok((
            Self {
                local,
                peers: Mutex::new(HashMap::new()),
            },
            rx,
        ))
    }

    async fn write_frame(stream: &mut TcpStream, frame: &[u8]) -> Result<(), TransportError> {
        stream.write_all(&(frame.len() as u32).to_be_bytes()).await?;
        stream.write_all(frame).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Endpoint for StreamEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn send_to(&self, env: &Envelope, dest: SocketAddr) -> Result<(), TransportError> {
        let frame = env.to_frame()?;
        if frame.len() > MAX_FRAME {
            return Err(TransportError::Codec(format!(
                "frame of {} bytes exceeds limit",
                frame.len()
            )));
        }

        let mut peers = self.peers.lock().await;
        if let Some(stream) = peers.get_mut(&dest) {
            match Self::write_frame(stream, &frame).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    // Stale connection; evict and fall through to reconnect.
                    tracing::debug!(%dest, error = %err, "evicting cached stream connection");
                    peers.remove(&dest);
                }
            }
        }

        let mut stream = TcpStream::connect(dest).await?;
        Self::write_frame(&mut stream, &frame).await?;
        peers.insert(dest, stream);
        Ok(())
    }
}

/// Accepts inbound connections until cancellation.
async fn accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = listener.accept() => match res {
                Ok((stream, peer)) => {
                    let tx = tx.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        if let Err(err) = read_frames(stream, tx, cancel).await {
                            tracing::debug!(%peer, error = %err, "stream reader exited");
                        }
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "stream accept loop stopping");
                    break;
                }
            }
        }
    }
}

/// Reads length-prefixed frames from one peer connection.
async fn read_frames(
    mut stream: TcpStream,
    tx: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let mut len_buf = [0u8; 4];
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            res = stream.read_exact(&mut len_buf) => {
                match res {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME {
            return Err(TransportError::Codec(format!("inbound frame of {len} bytes")));
        }

        let mut frame = vec![0u8; len];
        stream.read_exact(&mut frame).await?;

        match Envelope::from_frame(&frame) {
            Ok(env) => {
                if tx.send(env).await.is_err() {
                    return Ok(()); // endpoint shut down
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "dropping undecodable stream frame");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ParticipantId;

    #[tokio::test]
    async fn delivers_envelopes_and_reuses_connection() {
        let cancel = CancellationToken::new();
        let (a, _a_rx) = StreamEndpoint::bind(cancel.clone()).await.unwrap();
        let (b, mut b_rx) = StreamEndpoint::bind(cancel.clone()).await.unwrap();

        let from = ParticipantId::new(a.local_addr());
        for seq in 0..3u64 {
            let env = Envelope::encode(from.clone(), seq, &seq).unwrap();
            a.send_to(&env, b.local_addr()).await.unwrap();
        }

        for seq in 0..3u64 {
            let got = b_rx.recv().await.unwrap();
            assert_eq!(got.seq, seq);
        }
        assert_eq!(a.peers.lock().await.len(), 1);
        cancel.cancel();
    }
}
