//! # Participant runner: one spawned task per role instance.
//!
//! The runner is the participant side of the startup handshake:
//!
//! ```text
//! run(seed, port):
//!   ├─► bind own transport endpoint (dynamic port)
//!   ├─► report identity over the control channel
//!   ├─► control loop:
//!   │     ├─ Setup(args)      → role.setup(args)
//!   │     ├─ Attribute(n, v)  → role.on_attribute(n, v)
//!   │     ├─ Start            → break
//!   │     ├─ channel closed   → exit (supervisor gone)
//!   │     └─ cancelled        → exit
//!   ├─► role.run(ctx)  (wallclock measured)
//!   └─► report `sent` and `totaltime` telemetry to the root
//! ```
//!
//! ## Rules
//! - The runner never panics on role failure; errors are logged and the task
//!   exits, which is what the run loop's join observes.
//! - Telemetry at exit is fire-and-forget; a dead root endpoint only costs a
//!   debug line.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::control::{ControlMsg, ControlPort};
use crate::error::RoleError;
use crate::roles::{PropMap, RoleBox, RoleContext};
use crate::stats::{names, Sample};
use crate::transport::{self, Envelope, ParticipantId, TransportKind};

/// Everything a runner needs to bring one participant up.
pub(crate) struct RunnerSeed {
    pub role: RoleBox,
    pub name: Option<String>,
    pub kind: TransportKind,
    pub root: ParticipantId,
    pub params: Vec<String>,
    pub props: PropMap,
    pub cancel: CancellationToken,
}

/// Runs one participant to completion.
pub(crate) async fn run(seed: RunnerSeed, mut port: ControlPort) {
    let RunnerSeed {
        mut role,
        name,
        kind,
        root,
        params,
        props,
        cancel,
    } = seed;

    let (endpoint, inbound) = match transport::bind(kind, cancel.clone()).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(error = %err, "participant endpoint bind failed");
            return;
        }
    };

    let mut id = ParticipantId::new(endpoint.local_addr());
    if let Some(name) = name {
        id = id.with_name(name);
    }
    port.report_identity(id.clone());

    // Setup phase: consume control messages until the start signal.
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%id, "participant cancelled before start");
                return;
            }
            msg = port.recv() => msg,
        };
        match msg {
            Some(ControlMsg::Setup(args)) => {
                if let Err(err) = role.setup(&args).await {
                    tracing::error!(%id, error = %err, "role setup failed, participant exiting");
                    return;
                }
            }
            Some(ControlMsg::Attribute(attr, values)) => {
                role.on_attribute(&attr, &values);
            }
            Some(ControlMsg::Start) => break,
            None => {
                tracing::debug!(%id, "control channel closed before start, participant exiting");
                return;
            }
        }
    }
    drop(port);

    let sent = Arc::new(AtomicU64::new(0));
    let ctx = RoleContext::new(
        id.clone(),
        root.clone(),
        endpoint.clone(),
        inbound,
        cancel.clone(),
        params,
        props,
        sent.clone(),
    );

    let started = Instant::now();
    let result = role.run(ctx).await;
    let elapsed = started.elapsed().as_secs_f64();

    match result {
        Ok(()) | Err(RoleError::Canceled) => {
            tracing::debug!(%id, elapsed, "participant finished");
        }
        Err(err) => {
            tracing::warn!(%id, error = %err, "participant role failed");
        }
    }

    report(&*endpoint, &id, &root, names::SENT, sent.load(Ordering::Relaxed) as f64).await;
    report(&*endpoint, &id, &root, names::TOTALTIME, elapsed).await;
}

/// Sends one exit-telemetry sample to the root, best-effort.
async fn report(
    endpoint: &dyn crate::transport::Endpoint,
    id: &ParticipantId,
    root: &ParticipantId,
    counter: &str,
    value: f64,
) {
    let sample = Sample {
        counter: counter.to_string(),
        value,
    };
    match Envelope::encode(id.clone(), 0, &sample) {
        Ok(env) => {
            if let Err(err) = endpoint.send_to(&env, root.addr()).await {
                tracing::debug!(%id, counter, error = %err, "exit telemetry dropped");
            }
        }
        Err(err) => {
            tracing::debug!(%id, counter, error = %err, "exit telemetry encode failed");
        }
    }
}
