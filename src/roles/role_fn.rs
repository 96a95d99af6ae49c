//! # Closure-backed role (`RoleFn`).
//!
//! [`RoleFn`] wraps a closure `F: Fn(RoleContext) -> Fut`, producing a fresh
//! future per participant. It implements both [`Role`] (the closure is the
//! role body) and [`RoleFactory`] (building clones the closure), so a single
//! `RoleFn` can be handed straight to `spawn` for any domain size.
//!
//! ## Concurrency semantics
//! - Every participant gets its own clone of the closure and its own future;
//!   no state is shared between participants unless the closure captures an
//!   `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use distvisor::{RoleContext, RoleError, RoleFn};
//!
//! let role = RoleFn::arc("worker", |ctx: RoleContext| async move {
//!     if ctx.is_cancelled() {
//!         return Ok(());
//!     }
//!     // do work...
//!     Ok::<_, RoleError>(())
//! });
//! assert_eq!(role.name(), "worker");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RoleError, SpawnError};
use crate::roles::role::{Role, RoleBox, RoleFactory};
use crate::roles::RoleContext;

/// Function-backed role implementation and factory.
#[derive(Debug)]
pub struct RoleFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> RoleFn<F> {
    /// Creates a new function-backed role.
    ///
    /// Prefer [`RoleFn::arc`] when you immediately need a shared factory.
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the role and returns it as a shared factory handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }

    /// Returns the role name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl<F, Fut> Role for RoleFn<F>
where
    F: Fn(RoleContext) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), RoleError>> + Send + 'static,
{
    async fn run(&mut self, ctx: RoleContext) -> Result<(), RoleError> {
        (self.f)(ctx).await
    }
}

impl<F, Fut> RoleFactory for RoleFn<F>
where
    F: Fn(RoleContext) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), RoleError>> + Send + 'static,
{
    fn role_name(&self) -> &str {
        &self.name
    }

    fn build(&self) -> Result<RoleBox, SpawnError> {
        Ok(Box::new(RoleFn {
            name: self.name.clone(),
            f: self.f.clone(),
        }))
    }
}
