//! Process lifecycle: cancellation, governance, administration,
//! asynchronous flows and shutdown

use std::sync::Arc;
use std::time::Duration;

use officefloor::model::{
    object, AdministrationConfig, DependencyRef, FunctionConfig, Governance, GovernanceConfig,
    ManagedObjectConfig, Object, Scope, TeamConfig,
};
use officefloor::runtime::team::{Job, PassiveTeam, Team, TeamError, TeamStats};
use officefloor::{AsynchronousFlow, Escalation, OfficeConfig, OfficeError, RuntimeConfig};
use parking_lot::Mutex;

use crate::support::{build, build_fast, logging, run, Counter, Log, StalledSource, WAIT};

#[test]
fn test_cancel_fails_outstanding_assets() {
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 1))
        .managed_object(
            ManagedObjectConfig::new("stalled", Scope::Thread, StalledSource::default())
                .timeout(Duration::from_secs(30)),
        )
        .function(
            FunctionConfig::new("use", |_ctx| Ok(None)).object(DependencyRef::named("stalled")),
        );
    let office = build(config);
    let handle = office.invoke("use", None).unwrap();

    // wait for the chain to park on the object
    let deadline = std::time::Instant::now() + WAIT;
    while office.outstanding_assets().is_empty() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(office.outstanding_assets().len(), 1);
    assert_eq!(office.outstanding_assets()[0].owner, Some(handle.process_id()));

    assert!(handle.cancel());
    assert!(!handle.cancel());
    let escalation = handle.wait_timeout(WAIT).unwrap().unwrap_err();
    assert!(escalation.is_kind(Escalation::PROCESS_CANCELLED));
    assert!(office.outstanding_assets().is_empty());
    assert!(!handle.cancel());
}

struct RecordingGovernance {
    log: Log,
}

impl Governance for RecordingGovernance {
    fn enrol(
        &self,
        extension: &Object,
    ) -> Result<(), Escalation> {
        let name = extension.downcast_ref::<&str>().copied().unwrap_or("?");
        self.log.push(format!("enrol {}", name));
        Ok(())
    }

    fn enforce(
        &self,
        extensions: &[Object],
    ) -> Result<(), Escalation> {
        self.log.push(format!("enforce {}", extensions.len()));
        Ok(())
    }

    fn disregard(
        &self,
        extensions: &[Object],
    ) -> Result<(), Escalation> {
        self.log.push(format!("disregard {}", extensions.len()));
        Ok(())
    }
}

fn governed_office(
    log: &Log,
    fail: bool,
) -> OfficeConfig {
    let body_log = log.clone();
    OfficeConfig::new("office")
        .managed_object(
            ManagedObjectConfig::from_fn("tx", Scope::Thread, |_deps: &[Object]| Ok(object("tx")))
                .extension("Transactional"),
        )
        .managed_object(ManagedObjectConfig::from_fn(
            "plain",
            Scope::Thread,
            |_deps: &[Object]| Ok(object("plain")),
        ))
        .governance(GovernanceConfig::new(
            "transaction",
            "Transactional",
            RecordingGovernance { log: log.clone() },
        ))
        .function(
            FunctionConfig::new("work", move |_ctx| {
                body_log.push("body");
                if fail {
                    return Err(Escalation::new("Rollback", "abort"));
                }
                Ok(None)
            })
            .object(DependencyRef::named("tx"))
            .object(DependencyRef::named("plain"))
            .governed_by("transaction")
            .escalation("Exception", "recover"),
        )
        .function(logging("recover", log))
}

#[test]
fn test_governance_enforced_on_success() {
    let log = Log::default();
    let office = build(governed_office(&log, false));
    run(&office, "work", None).unwrap();
    assert_eq!(log.entries(), vec!["enrol tx", "body", "enforce 1"]);
}

#[test]
fn test_governance_disregarded_on_escalation() {
    let log = Log::default();
    let office = build(governed_office(&log, true));
    run(&office, "work", None).unwrap();
    assert_eq!(log.entries(), vec!["enrol tx", "body", "disregard 1", "recover"]);
}

#[test]
fn test_pre_and_post_administration() {
    let log = Log::default();
    let (pre_log, post_log, body_log) = (log.clone(), log.clone(), log.clone());
    let config = OfficeConfig::new("office")
        .managed_object(
            ManagedObjectConfig::from_fn("audited", Scope::Process, |_deps: &[Object]| {
                Ok(object("audited"))
            })
            .extension("Auditable"),
        )
        .administration(
            AdministrationConfig::new("open", "Auditable", move |extensions: &[Object]| {
                pre_log.push(format!("open {}", extensions.len()));
                Ok(())
            })
            .administer(DependencyRef::named("audited")),
        )
        .administration(
            AdministrationConfig::new("close", "Auditable", move |extensions: &[Object]| {
                post_log.push(format!("close {}", extensions.len()));
                Ok(())
            })
            .administer(DependencyRef::named("audited")),
        )
        .function(
            FunctionConfig::new("work", move |_ctx| {
                body_log.push("body");
                Ok(None)
            })
            .pre_administration("open")
            .post_administration("close"),
        );
    let office = build(config);
    run(&office, "work", None).unwrap();
    assert_eq!(log.entries(), vec!["open 1", "body", "close 1"]);
}

#[test]
fn test_asynchronous_flow_delays_completion() {
    let log = Log::default();
    let (body_log, flow_log) = (log.clone(), log.clone());
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 1))
        .function(
            FunctionConfig::new("start", move |ctx| {
                let flow = ctx.create_asynchronous_flow();
                let flow_log = flow_log.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(20));
                    flow_log.push("flow done");
                    flow.complete();
                });
                body_log.push("body");
                Ok(None)
            })
            .next("after"),
        )
        .function(logging("after", &log));
    let office = build(config);
    run(&office, "start", None).unwrap();
    assert_eq!(log.entries(), vec!["body", "flow done", "after"]);
}

#[test]
fn test_asynchronous_flow_failure_escalates() {
    let config = OfficeConfig::new("office").function(FunctionConfig::new("start", |ctx| {
        let flow = ctx.create_asynchronous_flow();
        std::thread::spawn(move || flow.fail(Escalation::new("RemoteError", "refused")));
        Ok(None)
    }));
    let office = build(config);
    let escalation = run(&office, "start", None).unwrap_err();
    assert!(escalation.is_kind("RemoteError"));
}

#[test]
fn test_asynchronous_flow_times_out() {
    let parked: Arc<Mutex<Vec<AsynchronousFlow>>> = Arc::default();
    let keep = parked.clone();
    let config = OfficeConfig::new("office").function(FunctionConfig::new("start", move |ctx| {
        keep.lock().push(ctx.create_asynchronous_flow());
        Ok(None)
    }));
    let runtime = RuntimeConfig {
        default_flow_timeout_ms: 50,
        ..crate::support::fast_config()
    };
    let office = officefloor::OfficeBuilder::with_config(runtime)
        .build(&config)
        .unwrap();
    let escalation = run(&office, "start", None).unwrap_err();
    assert!(escalation.is_kind(Escalation::ASSET_TIMEOUT));

    // completing after the timeout has no effect
    if let Some(flow) = parked.lock().pop() {
        flow.complete();
    }
    assert!(office.outstanding_assets().is_empty());
}

#[test]
fn test_source_panic_becomes_escalation() {
    let config = OfficeConfig::new("office")
        .managed_object(ManagedObjectConfig::from_fn(
            "fragile",
            Scope::Thread,
            |_deps: &[Object]| -> Result<Object, Escalation> { panic!("source exploded") },
        ))
        .function(
            FunctionConfig::new("use", |_ctx| Ok(None)).object(DependencyRef::named("fragile")),
        );
    let office = build_fast(config);
    let escalation = run(&office, "use", None).unwrap_err();
    assert!(escalation.is_kind(Escalation::PANIC));
    assert!(escalation.message().contains("source exploded"));
}

#[test]
fn test_shutdown_rejects_new_invocations() {
    let config = OfficeConfig::new("office")
        .team(TeamConfig::executor("T1", 2))
        .function(FunctionConfig::new("noop", |_ctx| Ok(None)));
    let office = build(config);
    run(&office, "noop", None).unwrap();
    office.shutdown();
    assert!(office.is_stopped());
    assert!(matches!(office.invoke("noop", None), Err(OfficeError::Stopped)));
}

/// Team counting the jobs it runs inline
struct CountingTeam {
    inner: PassiveTeam,
    jobs: Counter,
}

impl Team for CountingTeam {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn assign_job(
        &self,
        job: Job,
    ) -> Result<(), TeamError> {
        self.jobs.bump();
        self.inner.assign_job(job)
    }

    fn stop_working(&self) {
        self.inner.stop_working();
    }

    fn stats(&self) -> Option<&TeamStats> {
        self.inner.stats()
    }
}

#[test]
fn test_custom_team() {
    let jobs = Counter::default();
    let team = Arc::new(CountingTeam {
        inner: PassiveTeam::new("custom"),
        jobs: jobs.clone(),
    });
    let config = OfficeConfig::new("office")
        .team(TeamConfig::custom("custom", team))
        .function(FunctionConfig::new("first", |_ctx| Ok(None)).next("second"))
        .function(FunctionConfig::new("second", |_ctx| Ok(None)));
    let office = build(config);
    run(&office, "first", None).unwrap();
    assert_eq!(jobs.get(), 1);
    assert_eq!(office.team_stats("custom").unwrap().completed(), 1);
}

#[test]
fn test_stopped_team_fails_invocation() {
    let team = Arc::new(PassiveTeam::new("custom"));
    let config = OfficeConfig::new("office")
        .team(TeamConfig::custom("custom", team.clone()))
        .function(FunctionConfig::new("work", |_ctx| Ok(None)));
    let office = build(config);
    team.stop_working();
    let err = office.invoke("work", None).unwrap_err();
    assert!(matches!(err, OfficeError::Team(TeamError::Stopped { .. })));
    assert_eq!(office.stats().failed(), 1);
}
