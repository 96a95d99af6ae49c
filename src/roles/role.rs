//! # The role contract.
//!
//! A [`Role`] is the unit of user algorithm code one participant executes.
//! Lifecycle hooks mirror the two-phase startup: `setup` runs when the
//! supervisor delivers setup arguments, `on_attribute` for any other control
//! message, and `run` once the start signal arrives.
//!
//! [`RoleFactory`] is the construct-with-fixed-parameter-list capability the
//! supervisor checks at spawn time: every instance is built *before* any
//! participant starts, so a factory failure means zero participants.

use async_trait::async_trait;

use crate::error::{RoleError, SpawnError};
use crate::roles::{PropMap, RoleContext, SetupArgs};

/// Boxed role instance, owned by exactly one participant runner.
pub type RoleBox = Box<dyn Role>;

/// # One participant's algorithm code.
///
/// Implementations receive a [`RoleContext`] carrying their own transport
/// identity, the root identity, run parameters, and the cancellation token.
/// `run` should observe cancellation and exit promptly during shutdown.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use distvisor::{Role, RoleContext, RoleError, SetupArgs};
///
/// struct Echo {
///     greeting: String,
/// }
///
/// #[async_trait]
/// impl Role for Echo {
///     async fn setup(&mut self, args: &SetupArgs) -> Result<(), RoleError> {
///         self.greeting = args.first().cloned().unwrap_or_default();
///         Ok(())
///     }
///
///     async fn run(&mut self, mut ctx: RoleContext) -> Result<(), RoleError> {
///         while let Some(env) = ctx.recv().await {
///             let _ = ctx.send(&self.greeting, &env.source).await;
///             if ctx.is_cancelled() {
///                 break;
///             }
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Role: Send + 'static {
    /// Receives the setup-phase arguments. Default: no-op.
    async fn setup(&mut self, _args: &SetupArgs) -> Result<(), RoleError> {
        Ok(())
    }

    /// Receives a generic pre-start attribute. Default: no-op.
    fn on_attribute(&mut self, _name: &str, _values: &PropMap) {}

    /// Executes the role body after the start signal.
    async fn run(&mut self, ctx: RoleContext) -> Result<(), RoleError>;
}

/// Builds role instances for a spawn call.
///
/// `build` is invoked once per participant in the spawn domain, up front;
/// any error aborts the whole spawn with an empty result.
pub trait RoleFactory: Send + Sync {
    /// Stable role name, used for logging.
    fn role_name(&self) -> &str;

    /// Constructs one role instance.
    fn build(&self) -> Result<RoleBox, SpawnError>;
}
