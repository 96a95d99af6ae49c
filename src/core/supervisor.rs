//! # Supervisor operations: spawn, two-phase handshake, directed send.
//!
//! This is the process-supervision surface of [`Runtime`]:
//!
//! ```text
//! spawn(factory, domain, init, props):
//!   1. build every role instance up front      (invalid role → empty result)
//!   2. ensure_root()                           (transport unresolved → abort)
//!   3. start one runner per unit immediately   (it must bind its endpoint)
//!   4. receive one identity per runner over its control channel
//!   5. register all handles atomically; only then deliver optional setup
//! ```
//!
//! Runners start before the handshake completes because each participant
//! allocates and reports its own transport identity — endpoints bind
//! dynamically, so the supervisor cannot know an address in advance.
//!
//! ## Failure policy
//! - Factory or root failures abort the whole call: zero participants.
//! - A runner that dies before reporting its identity also aborts the call;
//!   everything started by the same call is cancelled (no partial spawn).
//! - Handshake sends after registration are best-effort per participant:
//!   failures are logged, returned in the failed set, and the run proceeds
//!   with the rest.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::control;
use crate::core::registry::{Lifecycle, LiveHandle};
use crate::core::runner::{self, RunnerSeed};
use crate::core::runtime::Runtime;
use crate::error::SpawnError;
use crate::roles::{PropMap, RoleFactory, SetupArgs};
use crate::transport::{Envelope, ParticipantId};

/// The iteration domain of a spawn call: an anonymous count or a name set.
#[derive(Clone, Debug)]
pub enum SpawnDomain {
    /// Spawn `n` anonymous participants.
    Count(usize),
    /// Spawn one named participant per entry.
    Names(BTreeSet<String>),
}

impl SpawnDomain {
    /// Builds a named domain from anything yielding names.
    pub fn names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SpawnDomain::Names(names.into_iter().map(Into::into).collect())
    }

    fn units(&self) -> Vec<Option<String>> {
        match self {
            SpawnDomain::Count(n) => vec![None; *n],
            SpawnDomain::Names(names) => names.iter().cloned().map(Some).collect(),
        }
    }
}

impl From<usize> for SpawnDomain {
    fn from(n: usize) -> Self {
        SpawnDomain::Count(n)
    }
}

impl From<BTreeSet<String>> for SpawnDomain {
    fn from(names: BTreeSet<String>) -> Self {
        SpawnDomain::Names(names)
    }
}

/// Identities produced by a spawn call, shaped after its domain.
#[derive(Clone, Debug)]
pub enum SpawnResult {
    /// Anonymous domain: a set of identities.
    Set(Vec<ParticipantId>),
    /// Named domain: name → identity.
    Named(HashMap<String, ParticipantId>),
}

impl SpawnResult {
    /// All identities, regardless of domain shape.
    pub fn ids(&self) -> Vec<ParticipantId> {
        match self {
            SpawnResult::Set(ids) => ids.clone(),
            SpawnResult::Named(map) => map.values().cloned().collect(),
        }
    }

    /// Looks up a named participant.
    pub fn get(&self, name: &str) -> Option<&ParticipantId> {
        match self {
            SpawnResult::Set(_) => None,
            SpawnResult::Named(map) => map.get(name),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SpawnResult::Set(ids) => ids.len(),
            SpawnResult::Named(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Target of a facade send: one identity or a collection.
#[derive(Clone, Copy, Debug)]
pub enum SendTarget<'a> {
    One(&'a ParticipantId),
    Many(&'a [ParticipantId]),
}

impl<'a> From<&'a ParticipantId> for SendTarget<'a> {
    fn from(id: &'a ParticipantId) -> Self {
        SendTarget::One(id)
    }
}

impl<'a> From<&'a [ParticipantId]> for SendTarget<'a> {
    fn from(ids: &'a [ParticipantId]) -> Self {
        SendTarget::Many(ids)
    }
}

impl<'a> From<&'a Vec<ParticipantId>> for SendTarget<'a> {
    fn from(ids: &'a Vec<ParticipantId>) -> Self {
        SendTarget::Many(ids)
    }
}

impl Runtime {
    /// Spawns one participant per unit of `domain`, performs the identity
    /// handshake, and (when `init_args` is given) immediately delivers the
    /// setup phase.
    ///
    /// Returns a set of identities for a count domain, or a name → identity
    /// map for a name-set domain.
    pub async fn spawn(
        &self,
        factory: &dyn RoleFactory,
        domain: impl Into<SpawnDomain>,
        init_args: Option<SetupArgs>,
        props: PropMap,
    ) -> Result<SpawnResult, SpawnError> {
        let domain = domain.into();
        let units = domain.units();

        // Build every role up front; a factory failure means zero spawns.
        let mut roles = Vec::with_capacity(units.len());
        for _ in &units {
            roles.push(factory.build()?);
        }

        let (root_id, kind) = self.ensure_root().await?;
        tracing::info!(role = factory.role_name(), count = units.len(), "creating participants");

        // Start every runner immediately so it can bind its endpoint and
        // report its identity back.
        let mut pending = Vec::with_capacity(units.len());
        for (unit, role) in units.iter().zip(roles) {
            let (handle, port) = control::pair();
            let cancel = self.cancel.child_token();
            let seed = RunnerSeed {
                role,
                name: unit.clone(),
                kind,
                root: root_id.clone(),
                params: self.cfg.params.clone(),
                props: props.clone(),
                cancel: cancel.clone(),
            };
            let join = tokio::spawn(runner::run(seed, port));
            pending.push((unit.clone(), handle, cancel, join));
        }

        // Collect identities; registration happens only after all arrived.
        let mut spawned = Vec::with_capacity(pending.len());
        let mut pending = pending.into_iter().enumerate();
        while let Some((index, (unit, mut handle, cancel, join))) = pending.next() {
            match handle.recv_identity().await {
                Some(id) => spawned.push((unit, id, handle, cancel, join)),
                None => {
                    // No partial spawn: unwind everything from this call.
                    for (_, _, _, cancel, join) in &spawned {
                        cancel.cancel();
                        join.abort();
                    }
                    for (_, (_, _, cancel, join)) in pending {
                        cancel.cancel();
                        join.abort();
                    }
                    return Err(SpawnError::IdentityLost { index });
                }
            }
        }

        let mut ids = Vec::with_capacity(spawned.len());
        let mut named = HashMap::new();
        for (unit, id, handle, cancel, join) in spawned {
            self.registry
                .register(
                    id.clone(),
                    LiveHandle {
                        join,
                        cancel,
                        control: Some(handle),
                        state: Lifecycle::AwaitingSetup,
                    },
                )
                .await;
            if let Some(name) = unit {
                named.insert(name, id.clone());
            }
            ids.push(id);
        }
        tracing::info!(role = factory.role_name(), count = ids.len(), "participants created");

        if let Some(args) = init_args {
            let failed = self.setup(&ids, &args).await;
            if !failed.is_empty() {
                tracing::warn!(failed = failed.len(), "setup undeliverable for some participants");
            }
        }

        Ok(match domain {
            SpawnDomain::Count(_) => SpawnResult::Set(ids),
            SpawnDomain::Names(_) => SpawnResult::Named(named),
        })
    }

    /// Delivers the setup arguments to each participant, fire-and-forget.
    /// Returns the participants whose control channel refused the send.
    pub async fn setup(&self, targets: &[ParticipantId], args: &SetupArgs) -> Vec<ParticipantId> {
        self.registry.setup(targets, args).await
    }

    /// Registers the targets in a fresh counter table, then sends the start
    /// signal and releases each control channel. Returns the failed set.
    pub async fn start(&self, targets: &[ParticipantId]) -> Vec<ParticipantId> {
        self.counters.init(targets.iter().cloned());
        tracing::info!(count = targets.len(), "starting participants");
        self.registry.start(targets).await
    }

    /// Injects a named attribute into each participant before start.
    /// Returns the failed set.
    pub async fn set_attribute(
        &self,
        targets: &[ParticipantId],
        name: &str,
        values: &PropMap,
    ) -> Vec<ParticipantId> {
        self.registry.set_attribute(targets, name, values).await
    }

    /// Sends an application message to one target or a collection, sourced
    /// from the root identity with sequence 0.
    ///
    /// Every target is attempted; the result is true iff all deliveries were
    /// accepted by the transport. Acceptance says nothing about algorithmic
    /// receipt by the remote role.
    pub async fn send<M: Serialize>(&self, msg: &M, to: impl Into<SendTarget<'_>>) -> bool {
        let Some((root_id, endpoint)) = self.root_parts().await else {
            tracing::warn!("send before any participant exists, dropped");
            return false;
        };
        let env = match Envelope::encode(root_id, 0, msg) {
            Ok(env) => env,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode facade message");
                return false;
            }
        };

        match to.into() {
            SendTarget::One(id) => self.send_one(&endpoint, &env, id).await,
            SendTarget::Many(ids) => {
                let mut all = true;
                for id in ids {
                    if !self.send_one(&endpoint, &env, id).await {
                        all = false;
                    }
                }
                all
            }
        }
    }

    async fn send_one(
        &self,
        endpoint: &crate::transport::EndpointRef,
        env: &Envelope,
        to: &ParticipantId,
    ) -> bool {
        match endpoint.send_to(env, to.addr()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%to, error = %err, "facade send failed");
                false
            }
        }
    }
}
