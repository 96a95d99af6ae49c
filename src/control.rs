//! # Control channels: private setup-only pipes.
//!
//! Each spawned participant gets one channel [`pair`], used only during
//! the two-phase startup:
//!
//! ```text
//! supervisor                         runner (participant task)
//!     │                                   │ binds endpoint
//!     │◄── identity ──────────────────────┤ report_identity()
//!     ├── Setup(args) ───────────────────►│ role.setup(args)
//!     ├── Attribute(name, values) ───────►│ role.on_attribute(...)
//!     ├── Start ─────────────────────────►│ role.run(ctx) begins
//!     ╳ handle dropped                    │
//! ```
//!
//! After `Start` the supervisor drops its handle; all further communication
//! with the participant goes through its transport endpoint.
//!
//! ## Rules
//! - Exactly one identity report per channel (a oneshot underneath).
//! - Sends are fire-and-forget; a closed channel means the participant is
//!   dead and the send reports [`ControlClosed`] so the caller can skip it.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::roles::{PropMap, SetupArgs};
use crate::transport::ParticipantId;

/// The participant side of the channel is gone; the send was dropped.
#[derive(Error, Debug)]
#[error("control channel closed")]
pub struct ControlClosed;

/// Messages delivered over a control channel during startup.
#[derive(Debug)]
pub enum ControlMsg {
    /// Deliver setup arguments; transitions the runner to awaiting-start.
    Setup(SetupArgs),
    /// Inject a named per-run attribute before start.
    Attribute(String, PropMap),
    /// Begin executing the role body; the channel is released afterward.
    Start,
}

/// Supervisor-held half: sends control messages, receives the one identity.
#[derive(Debug)]
pub struct ControlHandle {
    cmd: mpsc::UnboundedSender<ControlMsg>,
    ident: Option<oneshot::Receiver<ParticipantId>>,
}

impl ControlHandle {
    /// Sends a control message, fire-and-forget.
    pub fn send(&self, msg: ControlMsg) -> Result<(), ControlClosed> {
        self.cmd.send(msg).map_err(|_| ControlClosed)
    }

    /// Waits for the participant to report its identity.
    ///
    /// Blocks until the runner has bound its endpoint. Returns `None` if the
    /// runner exited without reporting (treated as a failed spawn) or if the
    /// identity was already consumed.
    pub async fn recv_identity(&mut self) -> Option<ParticipantId> {
        let rx = self.ident.take()?;
        rx.await.ok()
    }
}

/// Participant-held half: reports identity, receives control messages.
#[derive(Debug)]
pub struct ControlPort {
    cmd: mpsc::UnboundedReceiver<ControlMsg>,
    ident: Option<oneshot::Sender<ParticipantId>>,
}

impl ControlPort {
    /// Reports this participant's identity to the supervisor. One-shot;
    /// later calls are no-ops.
    pub fn report_identity(&mut self, id: ParticipantId) {
        if let Some(tx) = self.ident.take() {
            let _ = tx.send(id);
        }
    }

    /// Receives the next control message, or `None` once the supervisor
    /// dropped its handle.
    pub async fn recv(&mut self) -> Option<ControlMsg> {
        self.cmd.recv().await
    }
}

/// Creates a fresh control channel pair.
pub fn pair() -> (ControlHandle, ControlPort) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let (ident_tx, ident_rx) = oneshot::channel();
    (
        ControlHandle {
            cmd: cmd_tx,
            ident: Some(ident_rx),
        },
        ControlPort {
            cmd: cmd_rx,
            ident: Some(ident_tx),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_flows_back_once() {
        let (mut handle, mut port) = pair();
        let id = ParticipantId::new("127.0.0.1:5000".parse().unwrap());
        port.report_identity(id.clone());
        port.report_identity(ParticipantId::new("127.0.0.1:5001".parse().unwrap()));

        assert_eq!(handle.recv_identity().await, Some(id));
        assert_eq!(handle.recv_identity().await, None);
    }

    #[tokio::test]
    async fn send_fails_after_port_dropped() {
        let (handle, port) = pair();
        drop(port);
        assert!(handle.send(ControlMsg::Start).is_err());
    }

    #[tokio::test]
    async fn messages_arrive_in_order() {
        let (handle, mut port) = pair();
        handle.send(ControlMsg::Setup(vec!["x".into()])).unwrap();
        handle.send(ControlMsg::Start).unwrap();

        assert!(matches!(port.recv().await, Some(ControlMsg::Setup(_))));
        assert!(matches!(port.recv().await, Some(ControlMsg::Start)));
        drop(handle);
        assert!(port.recv().await.is_none());
    }
}
