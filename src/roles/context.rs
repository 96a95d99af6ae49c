//! # Per-participant execution context.
//!
//! A [`RoleContext`] is handed to [`Role::run`](crate::Role::run) and carries
//! everything the role body needs: its own transport identity, the root
//! identity, the endpoint for directed sends, the inbound message stream,
//! run parameters, spawn properties, and the cancellation token.
//!
//! Sends through the context are counted; the runner reports the total as the
//! `sent` counter when the role finishes. Roles can report further counters
//! themselves via [`RoleContext::report`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::roles::PropMap;
use crate::stats::Sample;
use crate::transport::{EndpointRef, Envelope, Inbound, ParticipantId};

/// Identity, messaging, and cancellation surface for one role body.
pub struct RoleContext {
    self_id: ParticipantId,
    root: ParticipantId,
    endpoint: EndpointRef,
    inbound: Inbound,
    cancel: CancellationToken,
    params: Vec<String>,
    props: PropMap,
    sent: Arc<AtomicU64>,
}

impl RoleContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        self_id: ParticipantId,
        root: ParticipantId,
        endpoint: EndpointRef,
        inbound: Inbound,
        cancel: CancellationToken,
        params: Vec<String>,
        props: PropMap,
        sent: Arc<AtomicU64>,
    ) -> Self {
        Self {
            self_id,
            root,
            endpoint,
            inbound,
            cancel,
            params,
            props,
            sent,
        }
    }

    /// This participant's own identity.
    pub fn id(&self) -> &ParticipantId {
        &self.self_id
    }

    /// The orchestrator's identity; telemetry goes here.
    pub fn root(&self) -> &ParticipantId {
        &self.root
    }

    /// The run's command-line style parameters.
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Extra properties supplied at spawn time.
    pub fn props(&self) -> &PropMap {
        &self.props
    }

    /// True once the runtime has requested shutdown.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes when the runtime requests shutdown.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Sends an application message to one participant.
    ///
    /// Returns transport-level acceptance only, never algorithmic receipt.
    pub async fn send<M: Serialize>(&self, msg: &M, to: &ParticipantId) -> bool {
        let env = match Envelope::encode(self.self_id.clone(), 0, msg) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode outbound message");
                return false;
            }
        };
        match self.endpoint.send_to(&env, to.addr()).await {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(err) => {
                tracing::warn!(to = %to, error = %err, "send failed");
                false
            }
        }
    }

    /// Sends an application message to every target; true iff all succeeded.
    /// Every target is attempted even after a failure.
    pub async fn send_many<'a, M, I>(&self, msg: &M, to: I) -> bool
    where
        M: Serialize,
        I: IntoIterator<Item = &'a ParticipantId>,
    {
        let mut all = true;
        for target in to {
            if !self.send(msg, target).await {
                all = false;
            }
        }
        all
    }

    /// Receives the next inbound envelope; `None` on shutdown or endpoint
    /// close.
    pub async fn recv(&mut self) -> Option<Envelope> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            env = self.inbound.recv() => env,
        }
    }

    /// Reports a named telemetry counter to the orchestrator.
    pub async fn report(&self, counter: impl Into<String>, value: f64) -> bool {
        let sample = Sample {
            counter: counter.into(),
            value,
        };
        let env = match Envelope::encode(self.self_id.clone(), 0, &sample) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode telemetry sample");
                return false;
            }
        };
        if let Err(err) = self.endpoint.send_to(&env, self.root.addr()).await {
            tracing::debug!(error = %err, "telemetry report dropped");
            return false;
        }
        true
    }

    /// Number of application messages sent through this context so far.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}
