//! End-to-end scheduler runs against the scripted platform.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use testgrid_core::environment::EnvironmentSpec;
use testgrid_core::fakes::{ScriptedPlatform, ScriptedStep, ScriptedSuite};
use testgrid_core::notifier::{Message, MessageBody, MessageKind, NotifierBus};
use testgrid_core::scheduler::{
    CancelToken, EnvironmentGeneration, KeepEnvironment, RunReport, RunnerConfig, Scheduler,
    SchedulerError,
};
use testgrid_core::suite::{
    CaseContext, CaseMetadata, CaseOutcome, CaseRuntime, CaseSelector, Registry, SuiteMetadata,
    TestSuite,
};
use testgrid_core::{ResultCollector, TestStatus};
use testgrid_space::{
    ChoiceSet, CountRange, NodeSpace, OsFamily, OsInfo, RequiredStatus, Requirement,
};

// -------------------------------------------------------------------------
// helpers
// -------------------------------------------------------------------------

fn one_node(name: &str) -> EnvironmentSpec {
    EnvironmentSpec::new(vec![NodeSpace::default()]).named(name)
}

fn registry_with(metadata: SuiteMetadata, suite: Arc<ScriptedSuite>) -> Arc<Registry> {
    let mut registry = Registry::new();
    registry.register(metadata, suite).unwrap();
    Arc::new(registry)
}

fn boot_suite() -> SuiteMetadata {
    SuiteMetadata::new("boot")
        .with_case(CaseMetadata::new("smoke"))
        .with_case(CaseMetadata::new("reboot"))
}

/// Records every environment status change as `"{environment}:{status}"`.
fn record_environments(bus: &NotifierBus) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(
        &[MessageKind::EnvironmentStatusChanged],
        0,
        Arc::new(move |message: &Message| {
            if let MessageBody::EnvironmentStatusChanged {
                environment, status, ..
            } = &message.body
            {
                sink.lock().unwrap().push(format!("{environment}:{status}"));
            }
        }),
    );
    seen
}

async fn run(
    platform: Arc<ScriptedPlatform>,
    registry: Arc<Registry>,
    config: RunnerConfig,
    environments: Vec<EnvironmentSpec>,
) -> RunReport {
    let scheduler = Scheduler::new(platform, registry.clone(), Arc::new(NotifierBus::new()), config);
    let cases = registry.select(&[]).unwrap();
    scheduler.run(cases, environments).await.unwrap()
}

fn status_of(report: &RunReport, id: &str) -> TestStatus {
    report.get(id).unwrap().status
}

// -------------------------------------------------------------------------
// environment lifecycle
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_wait_more_resource_leaves_result_queued_for_next_environment() {
    let platform = Arc::new(ScriptedPlatform::new("lab").with_deploy_script(
        "east",
        vec![ScriptedStep::WaitMoreResource("no free hosts".into())],
    ));
    let suite = Arc::new(ScriptedSuite::new());
    let registry = registry_with(
        SuiteMetadata::new("boot").with_case(CaseMetadata::new("smoke")),
        suite.clone(),
    );
    let bus = Arc::new(NotifierBus::new());
    let (collector, _) = ResultCollector::attach(&bus, 0);
    let environments = record_environments(&bus);

    let scheduler = Scheduler::new(platform.clone(), registry.clone(), bus, RunnerConfig::default());
    let report = scheduler
        .run(registry.select(&[]).unwrap(), vec![one_node("east"), one_node("west")])
        .await
        .unwrap();

    assert_eq!(platform.calls_of("deploy"), vec!["east", "west"]);
    // never finalized by the wait itself
    assert_eq!(
        collector.transitions("boot.smoke#0"),
        vec![TestStatus::Running, TestStatus::Passed]
    );
    let result = report.get("boot.smoke#0").unwrap();
    assert_eq!(result.environment.as_deref(), Some("west"));
    assert_eq!(suite.runs()[0].environment, "west");

    let environments = environments.lock().unwrap().clone();
    assert!(environments.contains(&"east:prepared".to_string()));
    assert!(!environments.iter().any(|e| e.starts_with("east:deployed")));
    assert!(environments.contains(&"west:deleted".to_string()));
}

#[tokio::test]
async fn test_waiting_everywhere_ends_in_no_available_environment() {
    let platform = Arc::new(ScriptedPlatform::new("lab").with_deploy_script(
        "east",
        vec![ScriptedStep::WaitMoreResource("no free hosts".into())],
    ));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));

    let report = run(platform, registry, RunnerConfig::default(), vec![one_node("east")]).await;

    for result in &report.results {
        assert_eq!(result.status, TestStatus::Skipped);
        assert!(result.message.starts_with("no available environment"), "{}", result.message);
    }
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_too_few_nodes_is_skipped_with_reasons() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let metadata = SuiteMetadata::new("cluster").with_case(
        CaseMetadata::new("failover").with_requirement(Requirement::simple(3, NodeSpace::default())),
    );
    let registry = registry_with(metadata, Arc::new(ScriptedSuite::new()));
    let two_nodes = EnvironmentSpec::new(vec![NodeSpace::default(), NodeSpace::default()]).named("pair");

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![two_nodes]).await;

    let result = report.get("cluster.failover#0").unwrap();
    assert_eq!(result.status, TestStatus::Skipped);
    assert!(result.message.contains("requirement: 3"), "{}", result.message);
    assert!(result.message.contains("capability: 2"), "{}", result.message);
    // nothing fit, so nothing was deployed
    assert!(platform.calls_of("deploy").is_empty());
}

#[tokio::test]
async fn test_empty_pool_generates_one_environment_for_identical_requirements() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![]).await;

    assert_eq!(platform.calls_of("prepare"), vec!["generated_0"]);
    assert_eq!(platform.calls_of("deploy"), vec!["generated_0"]);
    assert_eq!(platform.calls_of("delete"), vec!["generated_0"]);
    assert_eq!(status_of(&report, "boot.smoke#0"), TestStatus::Passed);
    assert_eq!(status_of(&report, "boot.reboot#0"), TestStatus::Passed);
}

#[tokio::test]
async fn test_generation_never_skips_everything_on_empty_pool() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));
    let config = RunnerConfig::default().with_generation(EnvironmentGeneration::Never);

    let report = run(platform.clone(), registry, config, vec![]).await;

    assert!(platform.calls().is_empty());
    assert_eq!(report.count(TestStatus::Skipped), 2);
}

#[tokio::test]
async fn test_deploy_failure_is_attached_to_exactly_one_result() {
    let platform = Arc::new(
        ScriptedPlatform::new("lab")
            .with_deploy_script("east", vec![ScriptedStep::Fail("quota exceeded".into())]),
    );
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![one_node("east")]).await;

    assert_eq!(report.count(TestStatus::Failed), 1);
    assert_eq!(report.count(TestStatus::Skipped), 1);
    let failed = report
        .results
        .iter()
        .find(|r| r.status == TestStatus::Failed)
        .unwrap();
    assert_eq!(failed.message, "deployment: quota exceeded");
    assert_eq!(report.exit_code(), 1);
    // failed deploys hold no resources
    assert!(platform.calls_of("delete").is_empty());
}

#[tokio::test]
async fn test_prepare_error_fails_one_result_and_drops_environment() {
    let platform = Arc::new(
        ScriptedPlatform::new("lab").with_prepare_failure("east", "image not found"),
    );
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![one_node("east")]).await;

    assert_eq!(status_of(&report, "boot.smoke#0"), TestStatus::Failed);
    assert_eq!(report.get("boot.smoke#0").unwrap().message, "prepare: image not found");
    assert_eq!(status_of(&report, "boot.reboot#0"), TestStatus::Skipped);
    assert!(platform.calls_of("deploy").is_empty());
}

#[tokio::test]
async fn test_infeasible_environment_is_dropped_silently() {
    let platform = Arc::new(ScriptedPlatform::new("lab").with_infeasible("east"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));

    let report = run(
        platform.clone(),
        registry,
        RunnerConfig::default(),
        vec![one_node("east"), one_node("west")],
    )
    .await;

    assert_eq!(platform.calls_of("deploy"), vec!["west"]);
    assert_eq!(report.count(TestStatus::Passed), 2);
}

#[tokio::test]
async fn test_generated_environment_runs_after_predefined() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let suite = Arc::new(ScriptedSuite::new());
    let metadata = SuiteMetadata::new("boot")
        .with_case(CaseMetadata::new("smoke"))
        .with_case(CaseMetadata::new("stress").with_requirement(Requirement::simple(
            1,
            NodeSpace::default().with_core_count(CountRange::at_least(4)),
        )));
    let registry = registry_with(metadata, suite.clone());
    let config = RunnerConfig::default().with_generation(EnvironmentGeneration::Always);

    let report = run(platform.clone(), registry, config, vec![one_node("east")]).await;

    // smoke reuses east; stress needs more cores than east guarantees
    assert_eq!(platform.calls_of("deploy"), vec!["east", "generated_1"]);
    assert_eq!(
        report.get("boot.smoke#0").unwrap().environment.as_deref(),
        Some("east")
    );
    assert_eq!(
        report.get("boot.stress#0").unwrap().environment.as_deref(),
        Some("generated_1")
    );
    assert_eq!(report.count(TestStatus::Passed), 2);
}

// -------------------------------------------------------------------------
// connection and OS checks
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_deployed_only_cases_run_before_connect() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let suite = Arc::new(ScriptedSuite::new());
    let metadata = SuiteMetadata::new("boot")
        .with_case(CaseMetadata::new("console"))
        .with_case(CaseMetadata::new("serial").with_requirement(
            Requirement::single_node().with_environment_status(RequiredStatus::Deployed),
        ));
    let registry = registry_with(metadata, suite.clone());

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![one_node("lab")]).await;

    assert_eq!(report.count(TestStatus::Passed), 2);
    let order: Vec<_> = suite.runs().into_iter().map(|r| r.case).collect();
    assert_eq!(order, vec!["boot.serial", "boot.console"]);
    assert_eq!(
        platform.calls(),
        vec!["prepare:lab", "deploy:lab", "connect:lab", "delete:lab"]
    );
}

#[tokio::test]
async fn test_os_mismatch_on_connected_environment_is_skipped() {
    let platform = Arc::new(
        ScriptedPlatform::new("lab").with_connect_os(OsInfo::new(OsFamily::Ubuntu)),
    );
    let metadata = SuiteMetadata::new("win").with_case(
        CaseMetadata::new("registry")
            .with_requirement(Requirement::single_node().with_os(ChoiceSet::any_of([OsFamily::Windows]))),
    );
    let suite = Arc::new(ScriptedSuite::new());
    let registry = registry_with(metadata, suite.clone());

    let report = run(platform, registry, RunnerConfig::default(), vec![one_node("lab")]).await;

    let result = report.get("win.registry#0").unwrap();
    assert_eq!(result.status, TestStatus::Skipped);
    assert!(result.message.starts_with("OS type mismatch"), "{}", result.message);
    assert!(suite.runs().is_empty());
}

#[tokio::test]
async fn test_linux_requirement_accepts_ubuntu_node() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let metadata = SuiteMetadata::new("fs").with_case(
        CaseMetadata::new("mount")
            .with_requirement(Requirement::single_node().with_os(ChoiceSet::any_of([OsFamily::Linux]))),
    );
    let registry = registry_with(metadata, Arc::new(ScriptedSuite::new()));

    let report = run(platform, registry, RunnerConfig::default(), vec![one_node("lab")]).await;

    assert_eq!(status_of(&report, "fs.mount#0"), TestStatus::Passed);
}

#[tokio::test]
async fn test_connect_failure_is_attached_and_environment_deleted() {
    let platform = Arc::new(ScriptedPlatform::new("lab").with_connect_failure("lab"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));
    let bus = Arc::new(NotifierBus::new());
    let environments = record_environments(&bus);
    let scheduler = Scheduler::new(platform.clone(), registry.clone(), bus, RunnerConfig::default());

    let report = scheduler
        .run(registry.select(&[]).unwrap(), vec![one_node("lab")])
        .await
        .unwrap();

    let failed = report.get("boot.smoke#0").unwrap();
    assert_eq!(failed.status, TestStatus::Failed);
    assert!(failed.message.starts_with("connection: ssh handshake"), "{}", failed.message);
    assert_eq!(status_of(&report, "boot.reboot#0"), TestStatus::Skipped);
    assert_eq!(platform.calls_of("delete"), vec!["lab"]);
    assert_eq!(
        environments.lock().unwrap().clone(),
        vec!["lab:prepared", "lab:deployed", "lab:connect_failed", "lab:deleted"]
    );
}

// -------------------------------------------------------------------------
// runtime options and policies
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_platform_type_mismatch_is_skipped_before_scheduling() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let metadata = SuiteMetadata::new("cloud").with_case(
        CaseMetadata::new("snapshot")
            .with_requirement(Requirement::single_node().on_platforms(["azure"])),
    );
    let registry = registry_with(metadata, Arc::new(ScriptedSuite::new()));

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![]).await;

    let result = report.get("cloud.snapshot#0").unwrap();
    assert_eq!(result.status, TestStatus::Skipped);
    assert!(result.message.contains("platform_type"), "{}", result.message);
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_new_environment_case_gets_dedicated_environment() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let suite = Arc::new(ScriptedSuite::new());
    let metadata = SuiteMetadata::new("boot")
        .with_case(CaseMetadata::new("smoke"))
        .with_case(CaseMetadata::new("first_boot").with_new_environment());
    let registry = registry_with(metadata, suite.clone());

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![]).await;

    assert_eq!(report.count(TestStatus::Passed), 2);
    assert_eq!(platform.calls_of("deploy"), vec!["generated_0", "generated_1"]);
    let first_boot = report.get("boot.first_boot#0").unwrap();
    assert_eq!(first_boot.environment.as_deref(), Some("generated_1"));
}

#[tokio::test]
async fn test_keep_environment_on_failure() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let suite = Arc::new(
        ScriptedSuite::new().with_outcomes("smoke", vec![CaseOutcome::failed("kernel panic")]),
    );
    let registry = registry_with(boot_suite(), suite);
    let config = RunnerConfig::default().with_keep_environment(KeepEnvironment::Failed);

    let report = run(platform.clone(), registry, config, vec![one_node("east")]).await;

    assert_eq!(status_of(&report, "boot.smoke#0"), TestStatus::Failed);
    assert!(platform.calls_of("delete").is_empty());
}

#[tokio::test]
async fn test_delete_failure_is_only_logged() {
    let platform = Arc::new(ScriptedPlatform::new("lab").with_delete_failure("east"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));

    let report = run(platform.clone(), registry, RunnerConfig::default(), vec![one_node("east")]).await;

    assert_eq!(report.count(TestStatus::Passed), 2);
    assert_eq!(platform.calls_of("delete"), vec!["east"]);
}

#[tokio::test]
async fn test_pinned_case_only_runs_on_named_environment() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let suite = Arc::new(ScriptedSuite::new());
    let registry = registry_with(boot_suite(), suite.clone());
    let scheduler = Scheduler::new(
        platform,
        registry.clone(),
        Arc::new(NotifierBus::new()),
        RunnerConfig::default(),
    );
    let cases: Vec<CaseRuntime> = registry
        .select(&[CaseSelector::include("boot\\..*")])
        .unwrap()
        .into_iter()
        .map(|c| c.pinned_to("west"))
        .collect();

    let report = scheduler
        .run(cases, vec![one_node("east"), one_node("west")])
        .await
        .unwrap();

    assert!(report.results.iter().all(|r| r.environment.as_deref() == Some("west")));
    assert!(suite.runs().iter().all(|r| r.environment == "west"));
}

#[tokio::test]
async fn test_platform_requirement_conflict_skips_case() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let metadata = SuiteMetadata::new("perf").with_case(
        CaseMetadata::new("big").with_requirement(Requirement::simple(
            1,
            NodeSpace::default().with_core_count(CountRange::at_least(64)),
        )),
    );
    let registry = registry_with(metadata, Arc::new(ScriptedSuite::new()));
    let config = RunnerConfig::default().with_platform_requirement(
        NodeSpace::default().with_core_count(CountRange::between(1, 8).unwrap()),
    );

    let report = run(platform, registry, config, vec![]).await;

    let result = report.get("perf.big#0").unwrap();
    assert_eq!(result.status, TestStatus::Skipped);
    assert!(result.message.starts_with("platform requirement:"), "{}", result.message);
}

#[tokio::test]
async fn test_concurrent_environments_all_resolve() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let metadata = SuiteMetadata::new("net")
        .with_case(CaseMetadata::new("ping"))
        .with_case(CaseMetadata::new("iperf").with_new_environment());
    let registry = registry_with(metadata, Arc::new(ScriptedSuite::new()));
    let config = RunnerConfig::default().with_max_concurrency(4);

    let report = run(platform, registry, config, vec![]).await;

    assert_eq!(report.count(TestStatus::Passed), 2);
    assert!(report.results.iter().all(|r| r.status.is_terminal()));
}

#[tokio::test(start_paused = true)]
async fn test_panicking_platform_aborts_run_after_other_workers_finish() {
    let platform = Arc::new(ScriptedPlatform::new("lab").with_deploy_script(
        "east",
        vec![ScriptedStep::Panic("deploy exploded".into())],
    ));
    // only east can host stress, so east always reaches deploy
    let metadata = boot_suite().with_case(CaseMetadata::new("stress").with_requirement(
        Requirement::simple(1, NodeSpace::default().with_core_count(CountRange::at_least(8))),
    ));
    let east = EnvironmentSpec::new(vec![
        NodeSpace::default().with_core_count(CountRange::exact(8))
    ])
    .named("east");
    let suite = Arc::new(ScriptedSuite::new().with_delay("smoke", Duration::from_secs(30)));
    let registry = registry_with(metadata, suite.clone());
    let bus = Arc::new(NotifierBus::new());
    let (collector, _) = ResultCollector::attach(&bus, 0);
    let scheduler = Scheduler::new(
        platform.clone(),
        registry.clone(),
        bus,
        RunnerConfig::default().with_max_concurrency(2),
    );

    let err = scheduler
        .run(registry.select(&[]).unwrap(), vec![east, one_node("west")])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SchedulerError::EnvironmentPanicked { ref environment, .. } if environment == "east"
    ));
    // west kept running its cases and was torn down
    assert_eq!(collector.get("boot.smoke#0").unwrap().status, TestStatus::Passed);
    assert_eq!(collector.get("boot.reboot#0").unwrap().status, TestStatus::Passed);
    assert_eq!(platform.calls_of("delete"), vec!["west"]);
    let stress = collector.get("boot.stress#0").unwrap();
    assert_eq!(stress.status, TestStatus::Skipped);
    assert!(stress.message.starts_with("run aborted:"), "{}", stress.message);
    assert!(collector.results().iter().all(|r| r.status.is_terminal()));
}

// -------------------------------------------------------------------------
// cancellation and structural errors
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_cancelled_before_start_skips_everything() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));
    let scheduler = Scheduler::new(
        platform.clone(),
        registry.clone(),
        Arc::new(NotifierBus::new()),
        RunnerConfig::default(),
    );
    scheduler.cancel_token().cancel();

    let report = scheduler
        .run(registry.select(&[]).unwrap(), vec![one_node("east")])
        .await
        .unwrap();

    assert!(platform.calls_of("deploy").is_empty());
    for result in &report.results {
        assert_eq!(result.status, TestStatus::Skipped);
        assert_eq!(result.message, "run cancelled");
    }
}

/// Cancels the run from inside its case, once a token has been handed over.
#[derive(Default)]
struct CancellingSuite(Mutex<Option<CancelToken>>);

#[async_trait]
impl TestSuite for CancellingSuite {
    async fn run_case(&self, _ctx: &CaseContext<'_>) -> CaseOutcome {
        if let Some(token) = self.0.lock().unwrap().as_ref() {
            token.cancel();
        }
        CaseOutcome::Passed
    }
}

#[tokio::test]
async fn test_cancel_lets_running_batch_finish_and_skips_the_rest() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    // deployed-only, so both suites are claimed in the same pass
    let requirement = Requirement::single_node().with_environment_status(RequiredStatus::Deployed);
    let cancelling = Arc::new(CancellingSuite::default());
    let later = Arc::new(ScriptedSuite::new());
    let mut registry = Registry::new();
    registry
        .register(
            SuiteMetadata::new("later")
                .with_requirement(requirement.clone())
                .with_case(CaseMetadata::new("b").with_priority(5)),
            later.clone(),
        )
        .unwrap();
    registry
        .register(
            SuiteMetadata::new("first")
                .with_requirement(requirement)
                .with_case(CaseMetadata::new("a").with_priority(1)),
            cancelling.clone(),
        )
        .unwrap();
    let registry = Arc::new(registry);
    let scheduler = Scheduler::new(
        platform.clone(),
        registry.clone(),
        Arc::new(NotifierBus::new()),
        RunnerConfig::default(),
    );
    *cancelling.0.lock().unwrap() = Some(scheduler.cancel_token());

    let report = scheduler
        .run(registry.select(&[]).unwrap(), vec![one_node("east")])
        .await
        .unwrap();

    assert_eq!(status_of(&report, "first.a#0"), TestStatus::Passed);
    let skipped = report.get("later.b#0").unwrap();
    assert_eq!(skipped.status, TestStatus::Skipped);
    assert_eq!(skipped.message, "run cancelled");
    assert!(later.runs().is_empty());
    // no connect after cancellation, but teardown still happens
    assert_eq!(
        platform.calls(),
        vec!["prepare:east", "deploy:east", "delete:east"]
    );
}

#[tokio::test]
async fn test_unknown_suite_aborts_before_scheduling() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));
    let stray = SuiteMetadata::new("ghost").with_case(CaseMetadata::new("boo"));
    let spec = stray.cases[0].resolve(&stray);
    let scheduler = Scheduler::new(
        platform.clone(),
        registry,
        Arc::new(NotifierBus::new()),
        RunnerConfig::default(),
    );

    let err = scheduler
        .run(vec![CaseRuntime::new(Arc::new(spec))], vec![])
        .await
        .unwrap_err();

    assert!(matches!(err, SchedulerError::UnknownSuite { ref suite, .. } if suite == "ghost"));
    assert!(platform.calls().is_empty());
}

#[tokio::test]
async fn test_empty_platform_type_is_structural_error() {
    let platform = Arc::new(ScriptedPlatform::new(""));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));
    let scheduler = Scheduler::new(
        platform,
        registry.clone(),
        Arc::new(NotifierBus::new()),
        RunnerConfig::default(),
    );

    let err = scheduler
        .run(registry.select(&[]).unwrap(), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::EmptyPlatformType));
}

#[tokio::test]
async fn test_every_result_is_terminal_and_run_events_are_published() {
    let platform = Arc::new(
        ScriptedPlatform::new("lab")
            .with_deploy_script("east", vec![ScriptedStep::Fail("boom".into())]),
    );
    let suite = Arc::new(
        ScriptedSuite::new().with_outcomes("reboot", vec![CaseOutcome::Skipped("no ipmi".into())]),
    );
    let registry = registry_with(boot_suite(), suite);
    let bus = Arc::new(NotifierBus::new());
    let finished = Arc::new(Mutex::new(Vec::new()));
    let sink = finished.clone();
    bus.subscribe(
        &[MessageKind::RunStarted, MessageKind::RunFinished],
        0,
        Arc::new(move |message: &Message| match &message.body {
            MessageBody::RunStarted { test_count, .. } => {
                sink.lock().unwrap().push(format!("started:{test_count}"))
            }
            MessageBody::RunFinished { exit_code, .. } => {
                sink.lock().unwrap().push(format!("finished:{exit_code}"))
            }
            _ => {}
        }),
    );
    let scheduler = Scheduler::new(platform, registry.clone(), bus, RunnerConfig::default());
    let cases = registry
        .select(&[CaseSelector::include(".*").with_times(2)])
        .unwrap();

    let report = scheduler
        .run(cases, vec![one_node("east"), one_node("west")])
        .await
        .unwrap();

    assert_eq!(report.results.len(), 4);
    assert!(report.results.iter().all(|r| r.status.is_terminal()));
    assert_eq!(report.count(TestStatus::Failed), 1);
    assert_eq!(
        finished.lock().unwrap().clone(),
        vec!["started:4".to_string(), format!("finished:{}", report.exit_code())]
    );
    let summary = report.render_summary();
    assert!(summary.starts_with("TOTAL     4"), "{summary}");
}

#[tokio::test]
async fn test_environment_status_sequence_for_connected_run() {
    let platform = Arc::new(ScriptedPlatform::new("lab"));
    let registry = registry_with(boot_suite(), Arc::new(ScriptedSuite::new()));
    let bus = Arc::new(NotifierBus::new());
    let environments = record_environments(&bus);
    let scheduler = Scheduler::new(platform, registry.clone(), bus, RunnerConfig::default());

    scheduler
        .run(registry.select(&[]).unwrap(), vec![one_node("lab")])
        .await
        .unwrap();

    assert_eq!(
        environments.lock().unwrap().clone(),
        vec!["lab:prepared", "lab:deployed", "lab:connected", "lab:deleted"]
    );
}
