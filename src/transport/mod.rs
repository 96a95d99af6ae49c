//! # Transport endpoints: addressable identities for directed messaging.
//!
//! Every participant (and the runtime root itself) owns one [`Endpoint`], an
//! addressable communication identity backed by a real socket. Two
//! interchangeable implementations exist, selected once per run:
//!
//! - [`datagram`]: connectionless UDP, one datagram per envelope;
//! - [`stream`]: connection-oriented TCP with cached peer connections and
//!   `u32`-BE length-prefixed frames.
//!
//! ## Wire format
//! An [`Envelope`] is bincode-encoded: `{source identity, sequence, timestamp
//! (ms), payload bytes}`. The payload is opaque at this layer; the telemetry
//! collector decodes [`Sample`](crate::stats::Sample)s out of it, user roles
//! decode their own message types.
//!
//! ## Rules
//! - Endpoints bind dynamically (`127.0.0.1:0`); nobody knows an identity
//!   before its endpoint exists, which is why spawned runners report their
//!   identity back over the control channel.
//! - `send_to` is best-effort: delivery guarantees are the transport's, not
//!   the runtime's.
//! - Each endpoint owns a background pump task that decodes inbound frames
//!   into an [`Inbound`] channel; the pump exits on cancellation or socket
//!   close and never takes the runtime down with it.

mod datagram;
mod stream;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{ConfigError, TransportError};

pub use datagram::DatagramEndpoint;
pub use stream::StreamEndpoint;

/// Capacity of the inbound envelope channel fed by the pump task.
pub(crate) const INBOUND_CAPACITY: usize = 1024;

/// Enumerated transport capability, selected once per run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransportKind {
    /// Connectionless datagram transport (UDP).
    #[default]
    Datagram,
    /// Connection-oriented stream transport (TCP).
    Stream,
}

impl TransportKind {
    /// Parses a transport kind from its configuration spelling.
    ///
    /// Accepts `"datagram"`/`"udp"` and `"stream"`/`"tcp"`; anything else is
    /// a [`ConfigError::UnknownTransport`] and leaves the caller's current
    /// selection unchanged.
    pub fn parse(kind: &str) -> Result<Self, ConfigError> {
        match kind {
            "datagram" | "udp" => Ok(TransportKind::Datagram),
            "stream" | "tcp" => Ok(TransportKind::Stream),
            other => Err(ConfigError::UnknownTransport { kind: other.into() }),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Datagram => f.write_str("datagram"),
            TransportKind::Stream => f.write_str("stream"),
        }
    }
}

/// Identity of one participant: its bound socket address plus an optional
/// human-readable name.
///
/// Equality and hashing go by address only; the name exists for addressing
/// convenience and log readability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParticipantId {
    addr: SocketAddr,
    name: Option<String>,
}

impl ParticipantId {
    /// Creates an anonymous identity for the given address.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, name: None }
    }

    /// Attaches a human-readable name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The bound socket address; this is what messages are sent to.
    #[inline]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The attached name, if the participant was spawned from a name set.
    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for ParticipantId {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for ParticipantId {}

impl std::hash::Hash for ParticipantId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}@{}", self.addr),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// One wire message: an opaque payload plus source identity and sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the sender.
    pub source: ParticipantId,
    /// Sender-assigned sequence number; the runtime facade always sends 0.
    pub seq: u64,
    /// Wall-clock send timestamp, milliseconds since the Unix epoch.
    pub at_ms: u64,
    /// Application payload (bincode-encoded by convention).
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Builds an envelope around an already-encoded payload, stamped now.
    pub fn new(source: ParticipantId, seq: u64, payload: Vec<u8>) -> Self {
        let at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            source,
            seq,
            at_ms,
            payload,
        }
    }

    /// Encodes a serializable message and wraps it.
    pub fn encode<M: Serialize>(
        source: ParticipantId,
        seq: u64,
        msg: &M,
    ) -> Result<Self, TransportError> {
        let payload = bincode::serialize(msg).map_err(TransportError::codec)?;
        Ok(Self::new(source, seq, payload))
    }

    /// Decodes the payload into a concrete message type.
    pub fn decode<M: for<'de> Deserialize<'de>>(&self) -> Result<M, TransportError> {
        bincode::deserialize(&self.payload).map_err(TransportError::codec)
    }

    pub(crate) fn to_frame(&self) -> Result<Vec<u8>, TransportError> {
        bincode::serialize(self).map_err(TransportError::codec)
    }

    pub(crate) fn from_frame(frame: &[u8]) -> Result<Self, TransportError> {
        bincode::deserialize(frame).map_err(TransportError::codec)
    }
}

/// Receiving half of an endpoint: decoded envelopes in arrival order.
pub type Inbound = mpsc::Receiver<Envelope>;

/// An addressable communication identity supporting directed send.
///
/// Implementations are cheap to share behind an `Arc`; the blocking/streaming
/// receive side is the [`Inbound`] channel returned at bind time.
#[async_trait]
pub trait Endpoint: Send + Sync + fmt::Debug {
    /// The dynamically bound local address of this endpoint.
    fn local_addr(&self) -> SocketAddr;

    /// Sends one envelope to `dest`, best-effort.
    async fn send_to(&self, env: &Envelope, dest: SocketAddr) -> Result<(), TransportError>;
}

/// Shared handle to an endpoint.
pub type EndpointRef = Arc<dyn Endpoint>;

/// Binds a fresh endpoint of the given kind on a dynamic local port.
///
/// Returns the sending handle and the inbound envelope stream. The internal
/// pump task is tied to `cancel` and exits cleanly when it fires.
pub async fn bind(
    kind: TransportKind,
    cancel: CancellationToken,
) -> Result<(EndpointRef, Inbound), TransportError> {
    match kind {
        TransportKind::Datagram => {
            let (ep, rx) = DatagramEndpoint::bind(cancel).await?;
            Ok((Arc::new(ep) as EndpointRef, rx))
        }
        TransportKind::Stream => {
            let (ep, rx) = StreamEndpoint::bind(cancel).await?;
            Ok((Arc::new(ep) as EndpointRef, rx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_both_spellings() {
        assert_eq!(TransportKind::parse("datagram").unwrap(), TransportKind::Datagram);
        assert_eq!(TransportKind::parse("udp").unwrap(), TransportKind::Datagram);
        assert_eq!(TransportKind::parse("stream").unwrap(), TransportKind::Stream);
        assert_eq!(TransportKind::parse("tcp").unwrap(), TransportKind::Stream);
        assert!(TransportKind::parse("pigeon").is_err());
    }

    #[test]
    fn identity_compares_by_address() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let anon = ParticipantId::new(addr);
        let named = ParticipantId::new(addr).with_name("a");
        assert_eq!(anon, named);
        assert_eq!(named.to_string(), "a@127.0.0.1:4000");
    }

    #[test]
    fn envelope_round_trips_through_frame() {
        let id = ParticipantId::new("127.0.0.1:4001".parse().unwrap());
        let env = Envelope::encode(id, 0, &("ping", 7u32)).unwrap();
        let back = Envelope::from_frame(&env.to_frame().unwrap()).unwrap();
        let (tag, n): (String, u32) = back.decode().unwrap();
        assert_eq!((tag.as_str(), n), ("ping", 7));
    }
}
