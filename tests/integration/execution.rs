//! Chain execution across teams

use std::time::Duration;

use officefloor::model::{
    object, DependencyRef, FlowConfig, FunctionConfig, ManagedObjectConfig, Scope, TeamConfig,
};
use officefloor::OfficeConfig;

use crate::support::{build, logging, run, Counter, Log, RecordingSource, WAIT};

#[test]
fn test_default_continuations_on_single_worker() {
    let received = Log::default();
    let teardown = Log::default();
    let sink = received.clone();
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 1))
        .managed_object(ManagedObjectConfig::new(
            "session",
            Scope::Process,
            RecordingSource {
                name: "session",
                log: teardown.clone(),
            },
        ))
        .function(
            FunctionConfig::new("F1", |_ctx| Ok(None))
                .team("T1")
                .object(DependencyRef::named("session"))
                .next("F2"),
        )
        .function(FunctionConfig::new("F2", |_ctx| Ok(None)).team("T1").next("F3"))
        .function(
            FunctionConfig::new("F3", move |ctx| {
                let value = ctx.parameter_as::<i32>().copied();
                sink.push(format!("{:?}", value));
                Ok(None)
            })
            .team("T1"),
        );
    let office = build(config);

    let completions = Counter::default();
    let callback = completions.clone();
    let handle = office
        .invoke_with_callback("F1", Some(object(42i32)), move |outcome| {
            assert!(outcome.is_ok());
            callback.bump();
        })
        .unwrap();
    assert!(handle.wait_timeout(WAIT).unwrap().is_ok());

    assert_eq!(received.entries(), vec!["Some(42)"]);
    assert_eq!(completions.get(), 1);
    assert_eq!(teardown.entries(), vec!["source session", "release session"]);
    assert_eq!(office.stats().completed(), 1);
    assert_eq!(office.stats().failed(), 0);
    assert_eq!(office.stats().handoffs(), 0);
    assert_eq!(office.stats().inline_continuations(), 2);
    assert_eq!(office.team_stats("T1").unwrap().assigned(), 1);
    assert_eq!(office.active_processes(), 0);
}

#[test]
fn test_returned_value_replaces_parameter() {
    let received = Log::default();
    let sink = received.clone();
    let config = OfficeConfig::new("office")
        .function(
            FunctionConfig::new("inc", |ctx| {
                let value = ctx.parameter_as::<u32>().copied().unwrap_or(0);
                Ok(Some(object(value + 1)))
            })
            .next("show"),
        )
        .function(FunctionConfig::new("show", move |ctx| {
            sink.push(ctx.parameter_as::<u32>().unwrap().to_string());
            Ok(None)
        }));
    let office = build(config);
    run(&office, "inc", Some(object(1u32))).unwrap();
    assert_eq!(received.entries(), vec!["2"]);
}

#[test]
fn test_flow_cycle_bounded_by_counter() {
    let hops = Counter::default();
    let (a_hops, b_hops) = (hops.clone(), hops.clone());
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 2))
        .function(
            FunctionConfig::new("A", move |ctx| {
                if a_hops.bump() < 10 {
                    ctx.do_flow(0, None)?;
                }
                Ok(None)
            })
            .flow(FlowConfig::new("toB", "B")),
        )
        .function(
            FunctionConfig::new("B", move |ctx| {
                b_hops.bump();
                ctx.do_flow(0, None)?;
                Ok(None)
            })
            .flow(FlowConfig::new("toA", "A")),
        );
    let office = build(config);
    run(&office, "A", None).unwrap();
    assert_eq!(hops.get(), 11);
}

#[test]
fn test_sequential_flows_run_before_next() {
    let log = Log::default();
    let body_log = log.clone();
    let config = OfficeConfig::new("office")
        .function(
            FunctionConfig::new("start", move |ctx| {
                body_log.push("start");
                ctx.do_flow(0, None)?;
                ctx.do_flow(1, None)?;
                Ok(None)
            })
            .flow(FlowConfig::new("first", "x"))
            .flow(FlowConfig::new("second", "y"))
            .next("z"),
        )
        .function(logging("x", &log).next("x2"))
        .function(logging("x2", &log))
        .function(logging("y", &log))
        .function(logging("z", &log));
    let office = build(config);
    run(&office, "start", None).unwrap();
    assert_eq!(log.entries(), vec!["start", "x", "x2", "y", "z"]);
}

#[test]
fn test_spawned_flow_joins_process() {
    let log = Log::default();
    let worker_log = log.clone();
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 2))
        .function(
            FunctionConfig::new("main", |ctx| {
                ctx.spawn_flow(0, Some(object("payload")))?;
                Ok(None)
            })
            .flow(FlowConfig::new("background", "worker")),
        )
        .function(FunctionConfig::new("worker", move |ctx| {
            std::thread::sleep(Duration::from_millis(20));
            worker_log.push(*ctx.parameter_as::<&str>().unwrap());
            Ok(None)
        }));
    let office = build(config);
    // the process only completes once the spawned thread has
    run(&office, "main", None).unwrap();
    assert_eq!(log.entries(), vec!["payload"]);
}

#[test]
fn test_declared_spawn_flow() {
    let done = Counter::default();
    let worker_done = done.clone();
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 2))
        .function(
            FunctionConfig::new("main", |ctx| {
                ctx.do_flow(0, None)?;
                ctx.do_flow(0, None)?;
                Ok(None)
            })
            .flow(FlowConfig::new("background", "worker").spawn_thread()),
        )
        .function(FunctionConfig::new("worker", move |_ctx| {
            worker_done.bump();
            Ok(None)
        }));
    let office = build(config);
    run(&office, "main", None).unwrap();
    assert_eq!(done.get(), 2);
}

#[test]
fn test_chain_handed_off_between_teams() {
    let log = Log::default();
    let (first, second) = (log.clone(), log.clone());
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 1))
        .team(TeamConfig::executor("T2", 1))
        .function(
            FunctionConfig::new("F1", move |_ctx| {
                first.push(std::thread::current().name().unwrap_or("").to_string());
                Ok(None)
            })
            .team("T1")
            .next("F2"),
        )
        .function(
            FunctionConfig::new("F2", move |_ctx| {
                second.push(std::thread::current().name().unwrap_or("").to_string());
                Ok(None)
            })
            .team("T2"),
        );
    let office = build(config);
    run(&office, "F1", None).unwrap();

    let threads = log.entries();
    assert_eq!(threads.len(), 2);
    assert_ne!(threads[0], threads[1]);
    assert_eq!(office.stats().handoffs(), 1);
    assert_eq!(office.team_stats("T2").unwrap().assigned(), 1);
}

#[test]
fn test_concurrent_invocations() {
    let done = Counter::default();
    let sink = done.clone();
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 4))
        .function(FunctionConfig::new("work", move |_ctx| {
            sink.bump();
            Ok(None)
        }));
    let office = build(config);
    let handles: Vec<_> = (0..32)
        .map(|_| office.invoke("work", None).unwrap())
        .collect();
    for handle in handles {
        assert!(handle.wait_timeout(WAIT).unwrap().is_ok());
    }
    assert_eq!(done.get(), 32);
    assert_eq!(office.stats().completed(), 32);
}
