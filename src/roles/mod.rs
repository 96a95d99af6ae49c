//! # Role abstractions: what one participant executes.
//!
//! This module provides the role-related types:
//! - [`Role`] — trait for implementing a participant role (the capability
//!   contract checked at spawn time)
//! - [`RoleFactory`] — builds one role instance per participant
//! - [`RoleFn`] — closure-backed role, doubling as its own factory
//! - [`RoleContext`] — per-participant identity, endpoint, and counters

mod context;
mod role;
mod role_fn;

use std::collections::HashMap;

/// Arguments delivered by the setup handshake.
pub type SetupArgs = Vec<String>;

/// Extra per-run properties attached to spawned participants.
pub type PropMap = HashMap<String, String>;

pub use context::RoleContext;
pub use role::{Role, RoleBox, RoleFactory};
pub use role_fn::RoleFn;
