//! # distvisor
//!
//! **Distvisor** is the runtime layer of a distributed-algorithm execution
//! platform: it instantiates participant roles as independently scheduled
//! tasks, wires up their transport endpoints, coordinates a two-phase
//! setup/start handshake over private control channels, and continuously
//! aggregates per-participant telemetry into iteration-level and run-level
//! statistics.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Role (user) │   │  Role (user) │   │  Role (user) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runtime (orchestration context)                                  │
//! │  - transport selection + root endpoint (lazy, created once)       │
//! │  - Registry (live participants, control handles, lifecycle)      │
//! │  - CounterTable (shared telemetry, one exclusive lock)            │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    runner    │   │    runner    │   │    runner    │
//!     │ (binds own   │   │              │   │              │
//!     │  endpoint)   │   │              │   │              │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ telemetry        │ telemetry        │ telemetry
//!      ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │              root endpoint inbound stream (envelopes)             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        telemetry collector (task)
//!                                   │ accumulate under lock
//!                                   ▼
//!                             CounterTable ──► RunStats (per iteration)
//! ```
//!
//! ### Lifecycle
//! ```text
//! spawn(factory, domain) ──► runner binds endpoint ──► identity reported
//!
//! per participant:
//!   AwaitingSetup ── setup(args) ──► AwaitingStart ── start ──► Running
//!                                                        │
//!                               control channel released ┘
//!
//! run_loop(entry):
//!   for each iteration:
//!     ├─► entry() (spawns / messages participants)
//!     ├─► join all live participants
//!     └─► snapshot + fold statistics
//!   finalize mean across completed iterations
//!   shutdown: cancel, grace wait, abort stragglers
//! ```
//!
//! ## Features
//! | Area           | Description                                              | Key types                                  |
//! |----------------|----------------------------------------------------------|--------------------------------------------|
//! | **Roles**      | Define participant roles as traits or closures.          | [`Role`], [`RoleFn`], [`RoleFactory`]      |
//! | **Spawning**   | Anonymous counts or named domains, no partial spawn.     | [`SpawnDomain`], [`SpawnResult`]           |
//! | **Handshake**  | Two-phase startup with explicit failed sets.             | [`Runtime::setup`], [`Runtime::start`]     |
//! | **Transport**  | Interchangeable datagram/stream endpoints.               | [`TransportKind`], [`Endpoint`]            |
//! | **Telemetry**  | Background collection into shared counters.              | [`CounterTable`], [`Sample`]               |
//! | **Statistics** | Iteration folding, run averaging, persistence.           | [`RunStats`]                               |
//! | **Errors**     | Typed errors per failure domain.                         | [`SpawnError`], [`RuntimeError`]           |
//!
//! ## Example
//! ```no_run
//! use distvisor::{PropMap, RoleContext, RoleError, RoleFn, RunConfig, Runtime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let rt = Runtime::new(RunConfig::default());
//!
//!     let totals = rt
//!         .run_loop(|rt| async move {
//!             let worker = RoleFn::new("worker", |ctx: RoleContext| async move {
//!                 ctx.report("mem", 1024.0).await;
//!                 Ok::<_, RoleError>(())
//!             });
//!             let procs = rt.spawn(&worker, 3, None, PropMap::new()).await?;
//!             rt.start(&procs.ids()).await;
//!             Ok(())
//!         })
//!         .await?;
//!
//!     println!("mean memory: {}", totals.mem);
//!     Ok(())
//! }
//! ```

mod config;
mod control;
mod core;
mod error;
mod roles;
mod stats;
mod transport;

// ---- Public re-exports ----

pub use config::RunConfig;
pub use control::{ControlClosed, ControlMsg};
pub use core::{EntryError, Lifecycle, Runtime, SendTarget, SpawnDomain, SpawnResult};
pub use error::{ConfigError, RoleError, RuntimeError, SpawnError, TransportError};
pub use roles::{PropMap, Role, RoleBox, RoleContext, RoleFactory, RoleFn, SetupArgs};
pub use stats::{names, CounterTable, RunStats, Sample};
pub use transport::{
    DatagramEndpoint, Endpoint, EndpointRef, Envelope, Inbound, ParticipantId, StreamEndpoint,
    TransportKind,
};
