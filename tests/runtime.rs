//! End-to-end runtime tests: spawn, handshake, telemetry, run loop.

use std::collections::HashSet;
use std::time::Duration;

use distvisor::{
    names, PropMap, RoleContext, RoleError, RoleFn, RunConfig, RunStats, Runtime, RuntimeError,
    SpawnDomain, SpawnError, TransportKind,
};

/// A role body that reports one memory sample, lingers briefly so the
/// collector sees it, and exits.
fn reporter(
    mem: f64,
) -> impl Fn(RoleContext) -> futures::future::BoxFuture<'static, Result<(), RoleError>> + Clone {
    move |ctx: RoleContext| -> futures::future::BoxFuture<'static, Result<(), RoleError>> {
        Box::pin(async move {
            ctx.report(names::MEM, mem).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        })
    }
}

#[tokio::test]
async fn spawn_count_yields_distinct_identities() {
    let rt = Runtime::new(RunConfig::default());
    let idle = RoleFn::new("idle", |ctx: RoleContext| async move {
        ctx.cancelled().await;
        Ok::<_, RoleError>(())
    });

    let procs = rt.spawn(&idle, 3, None, PropMap::new()).await.unwrap();
    assert_eq!(procs.len(), 3);

    let addrs: HashSet<_> = procs.ids().iter().map(|id| id.addr()).collect();
    assert_eq!(addrs.len(), 3);
    assert_eq!(rt.live_count().await, 3);
    for id in procs.ids() {
        assert_eq!(
            rt.state_of(&id).await,
            Some(distvisor::Lifecycle::AwaitingSetup)
        );
    }
}

#[tokio::test]
async fn spawning_zero_participants_yields_empty_set() {
    let rt = Runtime::new(RunConfig::default());
    let idle = RoleFn::new("idle", |ctx: RoleContext| async move {
        ctx.cancelled().await;
        Ok::<_, RoleError>(())
    });

    let procs = rt.spawn(&idle, 0, None, PropMap::new()).await.unwrap();
    assert!(procs.is_empty());
    assert!(matches!(procs, distvisor::SpawnResult::Set(_)));
    assert_eq!(rt.live_count().await, 0);
}

#[tokio::test]
async fn rejected_factory_creates_no_participants() {
    struct Broken;
    impl distvisor::RoleFactory for Broken {
        fn role_name(&self) -> &str {
            "broken"
        }
        fn build(&self) -> Result<distvisor::RoleBox, SpawnError> {
            Err(SpawnError::InvalidRole {
                reason: "not a role".into(),
            })
        }
    }

    let rt = Runtime::new(RunConfig::default());
    let err = rt.spawn(&Broken, 2, None, PropMap::new()).await.unwrap_err();
    assert!(matches!(err, SpawnError::InvalidRole { .. }));
    assert_eq!(rt.live_count().await, 0);
}

#[tokio::test]
async fn named_spawn_maps_names_to_identities() {
    let rt = Runtime::new(RunConfig::default());
    let idle = RoleFn::new("idle", |ctx: RoleContext| async move {
        ctx.cancelled().await;
        Ok::<_, RoleError>(())
    });

    let procs = rt
        .spawn(&idle, SpawnDomain::names(["a", "b", "c"]), None, PropMap::new())
        .await
        .unwrap();

    assert_eq!(procs.len(), 3);
    assert!(procs.get("a").is_some());
    assert!(procs.get("missing").is_none());

    let names: HashSet<_> = procs
        .ids()
        .iter()
        .filter_map(|id| id.name().map(str::to_string))
        .collect();
    assert_eq!(names, HashSet::from(["a".into(), "b".into(), "c".into()]));
}

#[tokio::test]
async fn handshake_walks_the_lifecycle() {
    let rt = Runtime::new(RunConfig::default());
    let worker = RoleFn::new("worker", |_ctx: RoleContext| async move {
        Ok::<_, RoleError>(())
    });

    let procs = rt.spawn(&worker, 1, None, PropMap::new()).await.unwrap();
    let ids = procs.ids();
    assert_eq!(
        rt.state_of(&ids[0]).await,
        Some(distvisor::Lifecycle::AwaitingSetup)
    );

    let failed = rt.setup(&ids, &vec!["arg".into()]).await;
    assert!(failed.is_empty());
    assert_eq!(
        rt.state_of(&ids[0]).await,
        Some(distvisor::Lifecycle::AwaitingStart)
    );

    let failed = rt.start(&ids).await;
    assert!(failed.is_empty());
    assert_eq!(
        rt.state_of(&ids[0]).await,
        Some(distvisor::Lifecycle::Running)
    );
}

#[tokio::test]
async fn failed_setup_lands_in_failed_set_at_start() {
    struct Refusing;
    #[async_trait::async_trait]
    impl distvisor::Role for Refusing {
        async fn setup(&mut self, _args: &distvisor::SetupArgs) -> Result<(), RoleError> {
            Err(RoleError::fail("bad arguments"))
        }
        async fn run(&mut self, _ctx: RoleContext) -> Result<(), RoleError> {
            Ok(())
        }
    }
    struct RefusingFactory;
    impl distvisor::RoleFactory for RefusingFactory {
        fn role_name(&self) -> &str {
            "refusing"
        }
        fn build(&self) -> Result<distvisor::RoleBox, SpawnError> {
            Ok(Box::new(Refusing))
        }
    }

    let rt = Runtime::new(RunConfig::default());
    let good = RoleFn::new("fine", |_ctx: RoleContext| async move {
        Ok::<_, RoleError>(())
    });

    let good_id = rt.spawn(&good, 1, None, PropMap::new()).await.unwrap().ids()[0].clone();
    let bad_id = rt
        .spawn(&RefusingFactory, 1, None, PropMap::new())
        .await
        .unwrap()
        .ids()[0]
        .clone();

    let all = vec![good_id.clone(), bad_id.clone()];
    let failed = rt.setup(&all, &Vec::new()).await;
    assert!(failed.is_empty());

    // Give the refusing runner time to process setup and die.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let failed = rt.start(&all).await;
    assert_eq!(failed, vec![bad_id.clone()]);
    assert_eq!(
        rt.state_of(&good_id).await,
        Some(distvisor::Lifecycle::Running)
    );
    assert_eq!(
        rt.state_of(&bad_id).await,
        Some(distvisor::Lifecycle::AwaitingStart)
    );
}

#[tokio::test]
async fn run_loop_aggregates_reported_telemetry() {
    let rt = Runtime::new(RunConfig::default());
    let worker = RoleFn::arc("worker", reporter(100.0));

    let totals = rt
        .run_loop(|rt| {
            let worker = worker.clone();
            async move {
                let procs = rt.spawn(&*worker, 3, None, PropMap::new()).await?;
                rt.start(&procs.ids()).await;
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(totals.mem, 300.0);
}

#[tokio::test]
async fn named_participants_fold_into_totals() {
    let rt = Runtime::new(RunConfig::default());
    let worker = RoleFn::arc("worker", |ctx: RoleContext| async move {
        ctx.report(names::TOTALTIME, 2.0).await;
        ctx.report(names::SENT, 1.0).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, RoleError>(())
    });

    let totals = rt
        .run_loop(|rt| {
            let worker = worker.clone();
            async move {
                let procs = rt
                    .spawn(
                        &*worker,
                        SpawnDomain::names(["a", "b", "c"]),
                        None,
                        PropMap::new(),
                    )
                    .await?;
                rt.start(&procs.ids()).await;
                Ok(())
            }
        })
        .await
        .unwrap();

    // Each of the three reports totaltime=2.0 and sent=1; the runner's own
    // exit telemetry can only add to `time`, never subtract.
    assert_eq!(totals.sent, 3.0);
    assert!(totals.time >= 6.0);
}

#[tokio::test]
async fn run_loop_averages_across_iterations() {
    let cfg = RunConfig {
        iterations: 2,
        ..RunConfig::default()
    };
    let rt = Runtime::new(cfg);
    let worker = RoleFn::arc("worker", reporter(50.0));

    let totals = rt
        .run_loop(|rt| {
            let worker = worker.clone();
            async move {
                let procs = rt.spawn(&*worker, 1, None, PropMap::new()).await?;
                rt.start(&procs.ids()).await;
                Ok(())
            }
        })
        .await
        .unwrap();

    // Each iteration reports 50; the mean over two iterations is still 50.
    assert!((totals.mem - 50.0).abs() < 1e-9);
}

#[tokio::test]
async fn run_loop_persists_summary_and_dump() {
    let dir = tempfile::tempdir().unwrap();
    let perf = dir.path().join("perf.txt");
    let dump = dir.path().join("stats.bin");

    let cfg = RunConfig {
        perf_file: Some(perf.clone()),
        dump_file: Some(dump.clone()),
        ..RunConfig::default()
    };
    let rt = Runtime::new(cfg);
    let worker = RoleFn::arc("worker", reporter(128.0));

    let totals = rt
        .run_loop(|rt| {
            let worker = worker.clone();
            async move {
                let procs = rt.spawn(&*worker, 1, None, PropMap::new()).await?;
                rt.start(&procs.ids()).await;
                Ok(())
            }
        })
        .await
        .unwrap();

    let line = std::fs::read_to_string(&perf).unwrap();
    let fields: Vec<&str> = line.trim_end().split('\t').collect();
    assert_eq!(fields.len(), 3);
    assert_eq!(fields[2].parse::<f64>().unwrap(), totals.mem);

    let bytes = std::fs::read(&dump).unwrap();
    let restored: RunStats = bincode::deserialize(&bytes).unwrap();
    assert_eq!(restored, totals);
}

#[tokio::test]
async fn entry_failure_surfaces_as_runtime_error() {
    let cfg = RunConfig {
        iterations: 3,
        ..RunConfig::default()
    };
    let rt = Runtime::new(cfg);

    let err = rt
        .run_loop(|_rt| async move { Err("algorithm exploded".into()) })
        .await
        .unwrap_err();

    match err {
        RuntimeError::EntryPoint { iteration, error } => {
            assert_eq!(iteration, 1);
            assert!(error.contains("algorithm exploded"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn transport_locked_after_first_spawn() {
    let rt = Runtime::new(RunConfig::default());
    let idle = RoleFn::new("idle", |ctx: RoleContext| async move {
        ctx.cancelled().await;
        Ok::<_, RoleError>(())
    });

    rt.spawn(&idle, 1, None, PropMap::new()).await.unwrap();

    rt.select_transport(TransportKind::Stream).await;
    assert_eq!(rt.transport_kind().await, TransportKind::Datagram);

    rt.use_transport("bogus").await;
    assert_eq!(rt.transport_kind().await, TransportKind::Datagram);

    // A later spawn joins the same topology under the original kind.
    rt.spawn(&idle, 1, None, PropMap::new()).await.unwrap();
    assert_eq!(rt.transport_kind().await, TransportKind::Datagram);
    assert_eq!(rt.live_count().await, 2);
}

#[tokio::test]
async fn stream_transport_delivers_facade_messages() {
    let cfg = RunConfig {
        transport: TransportKind::Stream,
        ..RunConfig::default()
    };
    let rt = Runtime::new(cfg);
    let echo = RoleFn::arc("echo", |mut ctx: RoleContext| async move {
        if let Some(env) = ctx.recv().await {
            let value: u32 = env.decode().map_err(RoleError::fail)?;
            ctx.report(names::MEM, f64::from(value)).await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    });

    let totals = rt
        .run_loop(|rt| {
            let echo = echo.clone();
            async move {
                let procs = rt.spawn(&*echo, 1, None, PropMap::new()).await?;
                rt.start(&procs.ids()).await;
                assert!(rt.send(&42u32, &procs.ids()[0]).await);
                Ok(())
            }
        })
        .await
        .unwrap();

    assert_eq!(totals.mem, 42.0);
}

#[tokio::test]
async fn facade_send_before_any_participant_is_dropped() {
    let rt = Runtime::new(RunConfig::default());
    let nobody = distvisor::ParticipantId::new("127.0.0.1:9".parse().unwrap());
    assert!(!rt.send(&1u32, &nobody).await);
}
