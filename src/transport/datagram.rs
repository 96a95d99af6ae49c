//! # Datagram endpoint: one UDP datagram per envelope.
//!
//! The simplest transport: each envelope is bincode-encoded into a single
//! datagram. No connection state, no retransmission; an envelope that does
//! not fit one datagram is rejected at send time.
//!
//! The pump task loops on `recv_from`, decodes frames, and pushes them into
//! the inbound channel. Undecodable datagrams are logged at debug level and
//! dropped; they must never terminate the pump.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;

use super::{Endpoint, Envelope, Inbound, INBOUND_CAPACITY};

/// Largest datagram the pump will read; envelopes above this fail to send.
const MAX_DATAGRAM: usize = 64 * 1024;

/// UDP-backed endpoint.
#[derive(Debug)]
pub struct DatagramEndpoint {
    socket: Arc<UdpSocket>,
    local: SocketAddr,
}

impl DatagramEndpoint {
    /// Binds a fresh socket on a dynamic loopback port and starts the pump.
    pub async fn bind(cancel: CancellationToken) -> Result<(Self, Inbound), TransportError> {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await?);
        let local = socket.local_addr()?;

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        tokio::spawn(pump(socket.clone(), tx, cancel));

        Ok((Self { socket, local }, rx))
    }
}

#[async_trait]
impl Endpoint for DatagramEndpoint {
    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn send_to(&self, env: &Envelope, dest: SocketAddr) -> Result<(), TransportError> {
        let frame = env.to_frame()?;
        if frame.len() > MAX_DATAGRAM {
            return Err(TransportError::Codec(format!(
                "envelope of {} bytes exceeds datagram limit",
                frame.len()
            )));
        }
        self.socket.send_to(&frame, dest).await?;
        Ok(())
    }
}

/// Reads datagrams until cancellation or a socket error.
async fn pump(socket: Arc<UdpSocket>, tx: mpsc::Sender<Envelope>, cancel: CancellationToken) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            res = socket.recv_from(&mut buf) => match res {
                Ok((n, peer)) => {
                    match Envelope::from_frame(&buf[..n]) {
                        Ok(env) => {
                            if tx.send(env).await.is_err() {
                                break; // receiver gone, endpoint shut down
                            }
                        }
                        Err(err) => {
                            tracing::debug!(%peer, error = %err, "dropping undecodable datagram");
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "datagram pump stopping on socket error");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ParticipantId;

    #[tokio::test]
    async fn delivers_envelopes_between_endpoints() {
        let cancel = CancellationToken::new();
        let (a, _a_rx) = DatagramEndpoint::bind(cancel.clone()).await.unwrap();
        let (b, mut b_rx) = DatagramEndpoint::bind(cancel.clone()).await.unwrap();

        let from = ParticipantId::new(a.local_addr());
        let env = Envelope::encode(from.clone(), 0, &"hello").unwrap();
        a.send_to(&env, b.local_addr()).await.unwrap();

        let got = b_rx.recv().await.unwrap();
        assert_eq!(got.source, from);
        let msg: String = got.decode().unwrap();
        assert_eq!(msg, "hello");
        cancel.cancel();
    }

    #[tokio::test]
    async fn oversized_envelope_is_rejected() {
        let cancel = CancellationToken::new();
        let (a, _rx) = DatagramEndpoint::bind(cancel.clone()).await.unwrap();
        let from = ParticipantId::new(a.local_addr());
        let env = Envelope::new(from, 0, vec![0u8; MAX_DATAGRAM + 1]);
        let dest = a.local_addr();
        assert!(a.send_to(&env, dest).await.is_err());
        cancel.cancel();
    }
}
