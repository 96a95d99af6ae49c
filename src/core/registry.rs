//! # Live-participant registry.
//!
//! Owns the runtime's view of every spawned participant: join handle,
//! per-participant cancellation token, lifecycle state, and the control
//! handle (until the start signal releases it).
//!
//! ## Lifecycle
//! ```text
//! AwaitingSetup ── setup ──► AwaitingStart ── start ──► Running ──► Terminated
//! ```
//!
//! ## Rules
//! - The registry lock is distinct from the counter-table lock: handshakes
//!   never block telemetry delivery and vice versa.
//! - A control send failure marks nothing: the participant simply keeps its
//!   state, is reported in the failed set, and the rest proceed.
//! - A participant leaves the live set only once it has terminated:
//!   `join_all` clears the set after every join has completed, and an
//!   interrupted join leaves all entries in place for `terminate_all`.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::control::{ControlHandle, ControlMsg};
use crate::roles::{PropMap, SetupArgs};
use crate::transport::ParticipantId;

/// Startup state of one participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Spawned, identity received, setup not yet delivered.
    AwaitingSetup,
    /// Setup delivered, waiting for the start signal.
    AwaitingStart,
    /// Start delivered; the role body is executing.
    Running,
}

/// Handle to one live participant.
pub(crate) struct LiveHandle {
    pub join: JoinHandle<()>,
    pub cancel: CancellationToken,
    pub control: Option<ControlHandle>,
    pub state: Lifecycle,
}

/// The live set of spawned participants.
#[derive(Default)]
pub(crate) struct Registry {
    inner: RwLock<HashMap<ParticipantId, LiveHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly spawned participant.
    pub async fn register(&self, id: ParticipantId, handle: LiveHandle) {
        let mut inner = self.inner.write().await;
        if inner.insert(id.clone(), handle).is_some() {
            // Ports are bound dynamically, so a collision means a stale
            // entry for a terminated participant; the new one wins.
            tracing::warn!(%id, "replacing stale registry entry");
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn ids(&self) -> Vec<ParticipantId> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn state_of(&self, id: &ParticipantId) -> Option<Lifecycle> {
        self.inner.read().await.get(id).map(|h| h.state)
    }

    /// Delivers setup args to each target. Returns the failed set.
    pub async fn setup(&self, targets: &[ParticipantId], args: &SetupArgs) -> Vec<ParticipantId> {
        self.control_send(targets, |handle| {
            handle.send(ControlMsg::Setup(args.clone()))?;
            Ok(Some(Lifecycle::AwaitingStart))
        })
        .await
    }

    /// Delivers a generic pre-start attribute. Returns the failed set.
    /// Does not transition lifecycle state.
    pub async fn set_attribute(
        &self,
        targets: &[ParticipantId],
        name: &str,
        values: &PropMap,
    ) -> Vec<ParticipantId> {
        self.control_send(targets, |handle| {
            handle.send(ControlMsg::Attribute(name.to_string(), values.clone()))?;
            Ok(None)
        })
        .await
    }

    /// Sends the start signal and releases each control handle.
    /// Returns the failed set; failed participants keep their state and
    /// their control handle.
    pub async fn start(&self, targets: &[ParticipantId]) -> Vec<ParticipantId> {
        let mut inner = self.inner.write().await;
        let mut failed = Vec::new();
        for id in targets {
            let Some(entry) = inner.get_mut(id) else {
                tracing::warn!(%id, "start: not a live participant, skipped");
                failed.push(id.clone());
                continue;
            };
            let ok = entry
                .control
                .as_ref()
                .map(|c| c.send(ControlMsg::Start).is_ok())
                .unwrap_or(false);
            if ok {
                entry.control = None;
                entry.state = Lifecycle::Running;
            } else {
                tracing::warn!(%id, "start signal undeliverable, participant skipped");
                failed.push(id.clone());
            }
        }
        failed
    }

    /// Blocks until every live participant has exited, then empties the
    /// live set. Panicked runners are logged and dropped.
    ///
    /// Entries stay in the map while their joins are in flight, so a caller
    /// that drops this future mid-await (a shutdown signal racing the join)
    /// leaves every still-live participant in place for
    /// [`terminate_all`](Self::terminate_all). The write lock is held for
    /// the duration; no other registry operation runs concurrently with the
    /// join phase.
    pub async fn join_all(&self) {
        let mut inner = self.inner.write().await;
        join_all(inner.iter_mut().map(|(id, h)| async move {
            if let Err(err) = (&mut h.join).await {
                tracing::warn!(%id, error = %err, "participant runner panicked");
            }
        }))
        .await;
        inner.clear();
    }

    /// Best-effort forced termination of every still-live participant:
    /// cancel, wait up to `grace`, then abort whatever remains.
    pub async fn terminate_all(&self, grace: Duration) {
        let handles: Vec<(ParticipantId, LiveHandle)> = {
            let mut inner = self.inner.write().await;
            inner.drain().collect()
        };
        if handles.is_empty() {
            return;
        }

        for (_, h) in &handles {
            h.cancel.cancel();
        }

        let mut joins = Vec::with_capacity(handles.len());
        let mut ids = Vec::with_capacity(handles.len());
        for (id, h) in handles {
            ids.push(id);
            joins.push(h.join);
        }

        let all = join_all(joins.iter_mut());
        if tokio::time::timeout(grace, all).await.is_err() {
            for (id, join) in ids.iter().zip(&joins) {
                if !join.is_finished() {
                    tracing::warn!(%id, "participant did not stop within grace, aborting");
                    join.abort();
                }
            }
        }
    }

    /// Sends one control message per target under the write lock, applying
    /// the returned state on success.
    async fn control_send<F>(&self, targets: &[ParticipantId], op: F) -> Vec<ParticipantId>
    where
        F: Fn(&ControlHandle) -> Result<Option<Lifecycle>, crate::control::ControlClosed>,
    {
        let mut inner = self.inner.write().await;
        let mut failed = Vec::new();
        for id in targets {
            let Some(entry) = inner.get_mut(id) else {
                tracing::warn!(%id, "control send: not a live participant, skipped");
                failed.push(id.clone());
                continue;
            };
            match entry.control.as_ref() {
                Some(handle) => match op(handle) {
                    Ok(Some(state)) => entry.state = state,
                    Ok(None) => {}
                    Err(_) => {
                        tracing::warn!(%id, "control channel closed, participant skipped");
                        failed.push(id.clone());
                    }
                },
                None => {
                    tracing::warn!(%id, "control channel already released, skipped");
                    failed.push(id.clone());
                }
            }
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control;

    fn id(port: u16) -> ParticipantId {
        ParticipantId::new(format!("127.0.0.1:{port}").parse().unwrap())
    }

    fn live(handle: ControlHandle) -> LiveHandle {
        LiveHandle {
            join: tokio::spawn(async {}),
            cancel: CancellationToken::new(),
            control: Some(handle),
            state: Lifecycle::AwaitingSetup,
        }
    }

    #[tokio::test]
    async fn setup_then_start_transitions_state() {
        let reg = Registry::new();
        let (handle, mut port) = control::pair();
        reg.register(id(1), live(handle)).await;

        let failed = reg.setup(&[id(1)], &vec!["a".into()]).await;
        assert!(failed.is_empty());
        assert_eq!(reg.state_of(&id(1)).await, Some(Lifecycle::AwaitingStart));

        let failed = reg.start(&[id(1)]).await;
        assert!(failed.is_empty());
        assert_eq!(reg.state_of(&id(1)).await, Some(Lifecycle::Running));

        assert!(matches!(port.recv().await, Some(ControlMsg::Setup(_))));
        assert!(matches!(port.recv().await, Some(ControlMsg::Start)));
        // Control handle released at start: the channel is now closed.
        assert!(port.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_channel_lands_in_failed_set() {
        let reg = Registry::new();
        let (good, _good_port) = control::pair();
        let (bad, bad_port) = control::pair();
        drop(bad_port);

        reg.register(id(1), live(good)).await;
        reg.register(id(2), live(bad)).await;

        let failed = reg.setup(&[id(1), id(2)], &Vec::new()).await;
        assert_eq!(failed, vec![id(2)]);
        assert_eq!(reg.state_of(&id(1)).await, Some(Lifecycle::AwaitingStart));
        assert_eq!(reg.state_of(&id(2)).await, Some(Lifecycle::AwaitingSetup));

        let failed = reg.start(&[id(1), id(2)]).await;
        assert_eq!(failed, vec![id(2)]);
        assert_eq!(reg.state_of(&id(2)).await, Some(Lifecycle::AwaitingSetup));
    }

    #[tokio::test]
    async fn interrupted_join_keeps_handles_for_termination() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let reg = Registry::new();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        // Runs long and never observes its cancellation token.
        let join = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            flag.store(true, Ordering::SeqCst);
        });
        reg.register(
            id(1),
            LiveHandle {
                join,
                cancel: CancellationToken::new(),
                control: None,
                state: Lifecycle::Running,
            },
        )
        .await;

        // A shutdown signal racing the join drops the join_all future.
        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), reg.join_all()).await;
        assert!(interrupted.is_err());
        assert_eq!(reg.len().await, 1);

        // The participant is still in the live set, so forced termination
        // can cancel, wait out the grace, and abort it.
        reg.terminate_all(Duration::from_millis(100)).await;
        assert_eq!(reg.len().await, 0);
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn join_all_empties_the_live_set() {
        let reg = Registry::new();
        let (handle, _port) = control::pair();
        reg.register(id(1), live(handle)).await;
        assert_eq!(reg.len().await, 1);

        reg.join_all().await;
        assert_eq!(reg.len().await, 0);
    }
}
