//! Runtime core: orchestration and lifecycle.
//!
//! This module contains the embedded implementation of the distvisor
//! runtime. The public API from this module is [`Runtime`] plus the spawn
//! vocabulary types ([`SpawnDomain`], [`SpawnResult`], [`SendTarget`],
//! [`Lifecycle`]).
//!
//! Internal modules:
//! - [`runtime`]: the per-run context object, the iteration loop, and the
//!   shutdown signal wait it races against;
//! - [`supervisor`]: spawn, two-phase handshake, directed send;
//! - [`runner`]: brings one participant up and runs its role body;
//! - [`registry`]: tracks the live participant set.

mod registry;
mod runner;
mod runtime;
mod supervisor;

pub use registry::Lifecycle;
pub use runtime::{EntryError, Runtime};
pub use supervisor::{SendTarget, SpawnDomain, SpawnResult};
