//! # Runtime: the per-run orchestration context.
//!
//! [`Runtime`] replaces free-floating globals with one explicit context
//! object: the selected transport kind, the lazily created root endpoint,
//! the live-participant [`Registry`], and the shared [`CounterTable`] —
//! each guarded by its own lock so handshakes and telemetry never contend.
//!
//! ## High-level flow
//! ```text
//! Runtime::new(cfg)
//!     │
//! run_loop(entry):
//!   for i in 1..=iterations:
//!     ├─► entry(runtime)            (user algorithm; spawns participants)
//!     │     └─ first spawn: ensure_root() binds the root endpoint and
//!     │        starts the telemetry collector
//!     ├─► registry.join_all()       (block until all participants exit)
//!     ├─► log_summary(walltime)     (human-readable block)
//!     └─► totals.accumulate(fold)   (snapshot under the counter lock)
//!   totals.finalize(completed)
//!   shutdown path: terminate_all(grace), cancel root + collector
//!   persist: summary line / bincode dump (if configured)
//! ```
//!
//! An OS signal during an iteration stops the loop cleanly: statistics
//! accumulated so far are still finalized, reported, and persisted. Only an
//! entry-point failure turns the run into an error, after the shutdown path
//! has completed.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::RunConfig;
use crate::core::registry::{Lifecycle, Registry};
use crate::error::{RuntimeError, SpawnError};
use crate::stats::{self, collector, CounterTable, RunStats};
use crate::transport::{self, EndpointRef, ParticipantId, TransportKind};

/// Error type user entry points may return.
pub type EntryError = Box<dyn std::error::Error + Send + Sync>;

/// Root endpoint state: created lazily, at most once.
struct RootState {
    id: ParticipantId,
    endpoint: EndpointRef,
}

/// Transport selection plus the root endpoint, under one lock.
struct TransportState {
    kind: TransportKind,
    root: Option<RootState>,
}

/// The orchestration context for one run.
pub struct Runtime {
    pub(crate) cfg: RunConfig,
    pub(crate) cancel: CancellationToken,
    pub(crate) registry: Registry,
    pub(crate) counters: Arc<CounterTable>,
    transport: Mutex<TransportState>,
}

impl Runtime {
    /// Creates a runtime for the given configuration.
    pub fn new(cfg: RunConfig) -> Arc<Self> {
        let kind = cfg.transport;
        Arc::new(Self {
            cfg,
            cancel: CancellationToken::new(),
            registry: Registry::new(),
            counters: Arc::new(CounterTable::new()),
            transport: Mutex::new(TransportState { kind, root: None }),
        })
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }

    /// Selects the transport kind for every endpoint of this run.
    ///
    /// Permitted only while no root endpoint exists; once any participant
    /// has been created the topology cannot be re-typed and a differing
    /// request is a logged no-op.
    pub async fn select_transport(&self, kind: TransportKind) {
        let mut state = self.transport.lock().await;
        if state.root.is_some() {
            if state.kind != kind {
                tracing::warn!(
                    current = %state.kind,
                    requested = %kind,
                    "cannot change transport kind after creating participants"
                );
            }
            return;
        }
        state.kind = kind;
    }

    /// String-typed variant of [`select_transport`](Self::select_transport)
    /// for configuration surfaces; an unknown kind is logged and the current
    /// selection kept.
    pub async fn use_transport(&self, kind: &str) {
        match TransportKind::parse(kind) {
            Ok(kind) => self.select_transport(kind).await,
            Err(err) => tracing::error!(error = %err, "transport selection rejected"),
        }
    }

    /// The currently selected transport kind.
    pub async fn transport_kind(&self) -> TransportKind {
        self.transport.lock().await.kind
    }

    /// The orchestrator's own identity, once the root endpoint exists.
    pub async fn root_id(&self) -> Option<ParticipantId> {
        self.transport.lock().await.root.as_ref().map(|r| r.id.clone())
    }

    /// Folds the counter table into a [`RunStats`] snapshot, normalized by
    /// `total_units` when configured.
    pub fn aggregate(&self) -> RunStats {
        self.counters.fold(self.cfg.total_units)
    }

    /// Number of live participants.
    pub async fn live_count(&self) -> usize {
        self.registry.len().await
    }

    /// Identities of all live participants.
    pub async fn live_ids(&self) -> Vec<ParticipantId> {
        self.registry.ids().await
    }

    /// Startup state of one participant, if live.
    pub async fn state_of(&self, id: &ParticipantId) -> Option<Lifecycle> {
        self.registry.state_of(id).await
    }

    /// Lazily creates the root endpoint (double-checked under the transport
    /// lock) and starts the telemetry collector with its inbound stream.
    pub(crate) async fn ensure_root(&self) -> Result<(ParticipantId, TransportKind), SpawnError> {
        let mut state = self.transport.lock().await;
        if let Some(root) = &state.root {
            return Ok((root.id.clone(), state.kind));
        }

        let kind = state.kind;
        let (endpoint, inbound) = transport::bind(kind, self.cancel.child_token()).await?;
        let id = ParticipantId::new(endpoint.local_addr());
        tracing::debug!(root = %id, %kind, "root endpoint created");

        tokio::spawn(collector::collect(
            inbound,
            self.counters.clone(),
            self.cancel.child_token(),
            self.cfg.collector_stop_after(),
        ));

        state.root = Some(RootState {
            id: id.clone(),
            endpoint,
        });
        Ok((id, kind))
    }

    /// Root identity and endpoint, for the messaging facade.
    pub(crate) async fn root_parts(&self) -> Option<(ParticipantId, EndpointRef)> {
        let state = self.transport.lock().await;
        state
            .root
            .as_ref()
            .map(|r| (r.id.clone(), r.endpoint.clone()))
    }

    /// Drives `iterations` rounds of the user entry point and returns the
    /// across-iteration mean of the aggregated statistics.
    ///
    /// Each round: run `entry`, block until every live participant has
    /// exited, log the iteration summary, fold the counter snapshot into the
    /// running totals. An OS signal stops iterating cleanly; an entry-point
    /// failure aborts the run with [`RuntimeError::EntryPoint`]. Both paths
    /// force-terminate any still-live participants (best-effort) before
    /// returning. Totals are divided by the number of *completed*
    /// iterations, so a partial run averages only what actually finished.
    pub async fn run_loop<F, Fut>(self: &Arc<Self>, entry: F) -> Result<RunStats, RuntimeError>
    where
        F: Fn(Arc<Runtime>) -> Fut,
        Fut: Future<Output = Result<(), EntryError>>,
    {
        let iterations = self.cfg.iterations_clamped();
        let mut totals = RunStats::default();
        let mut completed = 0usize;
        let mut failure = None;

        for i in 1..=iterations {
            tracing::info!(iteration = i, "running iteration");
            let started = Instant::now();

            let interrupted = tokio::select! {
                _ = wait_for_shutdown_signal() => true,
                res = entry(Arc::clone(self)) => {
                    match res {
                        Ok(()) => false,
                        Err(err) => {
                            tracing::error!(iteration = i, error = %err, "entry point failed");
                            failure = Some(RuntimeError::EntryPoint {
                                iteration: i,
                                error: err.to_string(),
                            });
                            break;
                        }
                    }
                }
            };
            if interrupted {
                tracing::info!("interrupt received, stopping iterations");
                break;
            }

            tracing::info!("waiting for remaining participants to terminate");
            let interrupted = tokio::select! {
                _ = wait_for_shutdown_signal() => true,
                _ = self.registry.join_all() => false,
            };

            let walltime = started.elapsed();
            stats::log_summary(walltime, &self.counters, self.cfg.total_units);
            totals.accumulate(&self.aggregate());
            completed += 1;

            if interrupted {
                tracing::info!("interrupt received, stopping iterations");
                break;
            }
        }

        totals.finalize(completed.max(1));

        // Shutdown path: best-effort termination of whatever is still live,
        // then tear down the root endpoint and collector.
        self.registry.terminate_all(self.cfg.grace).await;
        self.cancel.cancel();
        tracing::info!("terminating");

        if let Some(err) = failure {
            return Err(err);
        }
        self.persist(&totals).await?;
        Ok(totals)
    }

    /// Writes the configured output files, if any.
    async fn persist(&self, totals: &RunStats) -> Result<(), RuntimeError> {
        if let Some(path) = &self.cfg.perf_file {
            tokio::fs::write(path, stats::summary_line(totals))
                .await
                .map_err(RuntimeError::Persist)?;
        }
        if let Some(path) = &self.cfg.dump_file {
            let bytes = bincode::serialize(totals).map_err(|e| {
                RuntimeError::Persist(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
            tokio::fs::write(path, bytes)
                .await
                .map_err(RuntimeError::Persist)?;
        }
        Ok(())
    }
}

/// Completes on SIGINT or SIGTERM (ctrl-c on non-unix platforms). The run
/// loop races this against each phase of an iteration; fresh listeners per
/// call, `Err` only if registration fails.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
