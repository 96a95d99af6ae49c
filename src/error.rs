//! Error types used by the distvisor runtime and roles.
//!
//! This module defines the error enums for each failure domain:
//!
//! - [`ConfigError`] — invalid configuration values (bad transport kind).
//! - [`SpawnError`] — failures while creating participants.
//! - [`TransportError`] — endpoint I/O and codec failures.
//! - [`RoleError`] — errors raised by user role code.
//! - [`RuntimeError`] — errors raised by the run loop itself.
//!
//! The types provide `as_label` helpers for logging/metrics. Propagation
//! follows the containment policy of the runtime: transport and handshake
//! failures are scoped to one participant, collector failures are scoped to
//! the collector task, and only entry-point failures halt a run.

use thiserror::Error;

/// Errors produced while validating configuration values.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Transport kind string was not recognized.
    #[error("unknown transport kind {kind:?} (expected \"datagram\" or \"stream\")")]
    UnknownTransport {
        /// The rejected input.
        kind: String,
    },
}

/// Errors produced while spawning participants.
///
/// Any of these aborts the whole `spawn` call: no participants are created
/// and the live registry is left unchanged (no partial spawn).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The role factory refused to produce a valid role instance.
    #[error("not a valid role: {reason}")]
    InvalidRole {
        /// Why the factory rejected construction.
        reason: String,
    },

    /// The root endpoint could not be created (transport not resolved).
    #[error("root endpoint unavailable: {0}")]
    TransportUnresolved(#[from] TransportError),

    /// A runner exited before reporting its identity back.
    #[error("participant {index} never reported an identity")]
    IdentityLost {
        /// Position of the participant within the spawn domain.
        index: usize,
    },
}

impl SpawnError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SpawnError::InvalidRole { .. } => "spawn_invalid_role",
            SpawnError::TransportUnresolved(_) => "spawn_transport_unresolved",
            SpawnError::IdentityLost { .. } => "spawn_identity_lost",
        }
    }
}

/// Errors produced by transport endpoints.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TransportError {
    /// Underlying socket operation failed.
    #[error("transport i/o: {0}")]
    Io(#[from] std::io::Error),

    /// An envelope could not be encoded or decoded.
    #[error("envelope codec: {0}")]
    Codec(String),

    /// The endpoint's inbound stream has been closed.
    #[error("inbound stream closed")]
    Closed,
}

impl TransportError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransportError::Io(_) => "transport_io",
            TransportError::Codec(_) => "transport_codec",
            TransportError::Closed => "transport_closed",
        }
    }

    pub(crate) fn codec(err: impl std::fmt::Display) -> Self {
        TransportError::Codec(err.to_string())
    }
}

/// Errors produced by user role code.
///
/// Returned from [`Role::setup`](crate::Role::setup) and
/// [`Role::run`](crate::Role::run). `Canceled` is treated as a graceful exit
/// by the runner, not as a failure.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RoleError {
    /// Role execution failed.
    #[error("role failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Role observed cancellation and exited early.
    #[error("role cancelled")]
    Canceled,
}

impl RoleError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RoleError::Fail { .. } => "role_failed",
            RoleError::Canceled => "role_canceled",
        }
    }

    /// Wraps an arbitrary error message into a failure.
    pub fn fail(error: impl std::fmt::Display) -> Self {
        RoleError::Fail {
            error: error.to_string(),
        }
    }
}

/// Errors raised by the run loop.
///
/// The run loop contains every other failure domain; only these reach the
/// caller of [`Runtime::run_loop`](crate::Runtime::run_loop).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The user entry point returned an error; the run was aborted after the
    /// shutdown path completed.
    #[error("entry point failed on iteration {iteration}: {error}")]
    EntryPoint {
        /// 1-based iteration on which the failure occurred.
        iteration: usize,
        /// The underlying error message.
        error: String,
    },

    /// A final output file could not be written.
    #[error("failed to persist statistics: {0}")]
    Persist(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::EntryPoint { .. } => "runtime_entry_point",
            RuntimeError::Persist(_) => "runtime_persist",
        }
    }
}
