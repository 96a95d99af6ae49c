//! # Demo: token_ring
//!
//! Three participants pass a counter token around a ring until it reaches a
//! threshold, then a stop marker makes one last lap and everyone exits. The
//! run loop reports the aggregated statistics at the end.
//!
//! Demonstrates how to:
//! - Define a role body with [`RoleFn`].
//! - Spawn an anonymous domain and message participants directly.
//! - Drive the whole run with [`Runtime::run_loop`].
//!
//! ## Flow
//! ```text
//! run_loop(entry)
//!     ├─► spawn(3)                each binds its own endpoint
//!     ├─► start(...)              role bodies begin
//!     ├─► send((0, ring), first)  kick off the ring from the facade
//!     └─► join + statistics
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example token_ring
//! ```

use std::net::SocketAddr;

use distvisor::{ParticipantId, PropMap, RoleContext, RoleError, RoleFn, RunConfig, Runtime};

const ROUNDS: u64 = 9;

/// The token carries the ring order along with the counter, so every member
/// can find its successor without any out-of-band configuration.
type Token = (u64, Vec<SocketAddr>);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 1. One iteration, default datagram transport.
    let rt = Runtime::new(RunConfig::default());

    // 2. A role that forwards the token to its successor until done.
    let member = RoleFn::arc("ring-member", |mut ctx: RoleContext| async move {
        let me = ctx.id().addr();
        while let Some(env) = ctx.recv().await {
            let (token, ring): Token = env.decode().map_err(RoleError::fail)?;
            let pos = ring
                .iter()
                .position(|addr| *addr == me)
                .ok_or_else(|| RoleError::fail("not part of the ring"))?;
            let next = ParticipantId::new(ring[(pos + 1) % ring.len()]);

            println!("[{me}] token {token}");
            if token >= ROUNDS {
                // Stop marker: one final lap so every member sees it.
                if token < ROUNDS + ring.len() as u64 - 1 {
                    ctx.send(&(token + 1, ring), &next).await;
                }
                break;
            }
            ctx.send(&(token + 1, ring), &next).await;
        }
        ctx.report("mem", 1.0).await;
        Ok(())
    });

    // 3. Run one round of the algorithm.
    let totals = rt
        .run_loop(|rt| {
            let member = member.clone();
            async move {
                let procs = rt.spawn(&*member, 3, None, PropMap::new()).await?;
                rt.start(&procs.ids()).await;

                // Kick the ring off through the runtime facade.
                let ring: Vec<SocketAddr> = procs.ids().iter().map(|id| id.addr()).collect();
                rt.send(&(0u64, ring), &procs.ids()[0]).await;
                Ok(())
            }
        })
        .await?;

    println!("participants that finished: {}", totals.mem);
    Ok(())
}
