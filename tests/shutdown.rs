//! Signal-driven shutdown: an interrupt stops iterating cleanly and still
//! force-terminates participants that ignore cancellation.
//!
//! Kept in its own binary: it raises a real SIGINT, which would leak into
//! any other test sharing the process.

#![cfg(unix)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use distvisor::{PropMap, RoleContext, RoleError, RoleFn, RunConfig, Runtime};

#[tokio::test]
async fn interrupt_terminates_stubborn_participants() {
    let cfg = RunConfig {
        grace: Duration::from_millis(200),
        ..RunConfig::default()
    };
    let rt = Runtime::new(cfg);

    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    // Sleeps far past the interrupt and never observes its token; only a
    // forced abort keeps the flag unset.
    let stubborn = RoleFn::arc("stubborn", move |_ctx: RoleContext| {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, RoleError>(())
        }
    });

    // Deliver the interrupt while the run loop is joining participants.
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        unsafe {
            libc::raise(libc::SIGINT);
        }
    });

    let started = Instant::now();
    let totals = rt
        .run_loop(|rt| {
            let stubborn = stubborn.clone();
            async move {
                let procs = rt.spawn(&*stubborn, 1, None, PropMap::new()).await?;
                rt.start(&procs.ids()).await;
                Ok(())
            }
        })
        .await
        .unwrap();

    // Clean stop: the loop returned well before the role body would have,
    // the live set was emptied by forced termination, and the role never
    // ran to completion.
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(rt.live_count().await, 0);
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(totals.mem, 0.0);
}
