//! Scripted in-memory fakes for the platform and suite traits.
//!
//! `ScriptedPlatform` and `ScriptedSuite` satisfy the trait contracts
//! without provisioning anything, record every call, and can be told to fail
//! at chosen points. They back this crate's own tests and are public so
//! embedders can test their reporting against a real scheduler run.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use testgrid_space::{OsFamily, OsInfo};

use crate::environment::Environment;
use crate::platform::{Platform, PlatformError, PlatformResult};
use crate::suite::{CaseContext, CaseOutcome, SuiteContext, TestSuite};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// ScriptedPlatform
// ---------------------------------------------------------------------------

/// One scripted answer to a `deploy` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStep {
    Ok,
    WaitMoreResource(String),
    Fail(String),
    /// Panic inside `deploy`, as a buggy platform would.
    Panic(String),
}

/// Platform whose answers are scripted per environment name.
///
/// Unscripted calls succeed. `connect` stamps every node with the
/// configured OS (Ubuntu unless changed).
pub struct ScriptedPlatform {
    platform_type: String,
    infeasible: HashSet<String>,
    prepare_failures: HashMap<String, String>,
    deploy_scripts: Mutex<HashMap<String, VecDeque<ScriptedStep>>>,
    connect_failures: HashSet<String>,
    delete_failures: HashSet<String>,
    connect_os: OsInfo,
    calls: Mutex<Vec<String>>,
}

impl ScriptedPlatform {
    pub fn new(platform_type: impl Into<String>) -> Self {
        Self {
            platform_type: platform_type.into(),
            infeasible: HashSet::new(),
            prepare_failures: HashMap::new(),
            deploy_scripts: Mutex::new(HashMap::new()),
            connect_failures: HashSet::new(),
            delete_failures: HashSet::new(),
            connect_os: OsInfo::new(OsFamily::Ubuntu),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `prepare` answers `Ok(false)` for `environment`.
    pub fn with_infeasible(mut self, environment: impl Into<String>) -> Self {
        self.infeasible.insert(environment.into());
        self
    }

    pub fn with_prepare_failure(
        mut self,
        environment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.prepare_failures
            .insert(environment.into(), message.into());
        self
    }

    /// Answers for successive `deploy` calls on `environment`.
    pub fn with_deploy_script(
        self,
        environment: impl Into<String>,
        steps: Vec<ScriptedStep>,
    ) -> Self {
        lock(&self.deploy_scripts).insert(environment.into(), steps.into());
        self
    }

    pub fn with_connect_os(mut self, os: OsInfo) -> Self {
        self.connect_os = os;
        self
    }

    pub fn with_connect_failure(mut self, environment: impl Into<String>) -> Self {
        self.connect_failures.insert(environment.into());
        self
    }

    pub fn with_delete_failure(mut self, environment: impl Into<String>) -> Self {
        self.delete_failures.insert(environment.into());
        self
    }

    /// Every call as `"{operation}:{environment}"`, in call order.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Calls of one operation, e.g. `"deploy"`.
    pub fn calls_of(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation}:");
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn record(&self, operation: &str, environment: &Environment) {
        lock(&self.calls).push(format!("{operation}:{}", environment.name()));
    }
}

#[async_trait]
impl Platform for ScriptedPlatform {
    fn platform_type(&self) -> &str {
        &self.platform_type
    }

    async fn prepare(&self, environment: &mut Environment) -> PlatformResult<bool> {
        self.record("prepare", environment);
        if let Some(message) = self.prepare_failures.get(environment.name()) {
            return Err(PlatformError::Failed(message.clone()));
        }
        Ok(!self.infeasible.contains(environment.name()))
    }

    async fn deploy(&self, environment: &mut Environment) -> PlatformResult<()> {
        self.record("deploy", environment);
        let step = lock(&self.deploy_scripts)
            .get_mut(environment.name())
            .and_then(VecDeque::pop_front)
            .unwrap_or(ScriptedStep::Ok);
        match step {
            ScriptedStep::Ok => Ok(()),
            ScriptedStep::WaitMoreResource(message) => {
                Err(PlatformError::WaitMoreResource(message))
            }
            ScriptedStep::Fail(message) => Err(PlatformError::Failed(message)),
            ScriptedStep::Panic(message) => panic!("{message}"),
        }
    }

    async fn connect(&self, environment: &mut Environment) -> PlatformResult<()> {
        self.record("connect", environment);
        if self.connect_failures.contains(environment.name()) {
            return Err(PlatformError::Other(anyhow::anyhow!(
                "ssh handshake with {} refused",
                environment.name()
            )));
        }
        for node in environment.nodes_mut() {
            node.os = Some(self.connect_os.clone());
        }
        Ok(())
    }

    async fn delete(&self, environment: &mut Environment) -> PlatformResult<()> {
        self.record("delete", environment);
        if self.delete_failures.contains(environment.name()) {
            return Err(PlatformError::Failed("resource group is locked".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedSuite
// ---------------------------------------------------------------------------

/// One call of `run_case`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRun {
    pub result_id: String,
    /// `suite.case`
    pub case: String,
    pub attempt: u32,
    pub environment: String,
}

#[derive(Default)]
struct Counters {
    before_suite: AtomicUsize,
    after_suite: AtomicUsize,
    before_case: AtomicUsize,
    after_case: AtomicUsize,
}

/// Suite whose case outcomes and hook failures are scripted.
///
/// Outcomes are queued per case name; the last one keeps being returned
/// once the queue is down to it. Unscripted cases pass.
#[derive(Default)]
pub struct ScriptedSuite {
    outcomes: Mutex<HashMap<String, VecDeque<CaseOutcome>>>,
    delays: HashMap<String, Duration>,
    before_suite_failure: Option<String>,
    before_case_failures: Mutex<usize>,
    after_case_failure: Option<String>,
    after_suite_failure: Option<String>,
    counters: Counters,
    runs: Mutex<Vec<CaseRun>>,
}

impl ScriptedSuite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes for successive runs of `case` (the short case name).
    pub fn with_outcomes(self, case: impl Into<String>, outcomes: Vec<CaseOutcome>) -> Self {
        lock(&self.outcomes).insert(case.into(), outcomes.into());
        self
    }

    /// `run_case` for `case` sleeps for `delay` before answering.
    pub fn with_delay(mut self, case: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(case.into(), delay);
        self
    }

    pub fn failing_before_suite(mut self, message: impl Into<String>) -> Self {
        self.before_suite_failure = Some(message.into());
        self
    }

    /// The first `times` calls of `before_case` fail.
    pub fn failing_before_case(self, times: usize) -> Self {
        *lock(&self.before_case_failures) = times;
        self
    }

    pub fn failing_after_case(mut self, message: impl Into<String>) -> Self {
        self.after_case_failure = Some(message.into());
        self
    }

    pub fn failing_after_suite(mut self, message: impl Into<String>) -> Self {
        self.after_suite_failure = Some(message.into());
        self
    }

    pub fn before_suite_calls(&self) -> usize {
        self.counters.before_suite.load(Ordering::SeqCst)
    }

    pub fn after_suite_calls(&self) -> usize {
        self.counters.after_suite.load(Ordering::SeqCst)
    }

    pub fn before_case_calls(&self) -> usize {
        self.counters.before_case.load(Ordering::SeqCst)
    }

    pub fn after_case_calls(&self) -> usize {
        self.counters.after_case.load(Ordering::SeqCst)
    }

    /// Every `run_case` call in order.
    pub fn runs(&self) -> Vec<CaseRun> {
        lock(&self.runs).clone()
    }

    fn next_outcome(&self, case: &str) -> CaseOutcome {
        let mut outcomes = lock(&self.outcomes);
        match outcomes.get_mut(case) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(CaseOutcome::Passed),
            Some(queue) => queue.front().cloned().unwrap_or(CaseOutcome::Passed),
            None => CaseOutcome::Passed,
        }
    }
}

#[async_trait]
impl TestSuite for ScriptedSuite {
    async fn before_suite(&self, _ctx: &SuiteContext<'_>) -> anyhow::Result<()> {
        self.counters.before_suite.fetch_add(1, Ordering::SeqCst);
        match &self.before_suite_failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }

    async fn after_suite(&self, _ctx: &SuiteContext<'_>) -> anyhow::Result<()> {
        self.counters.after_suite.fetch_add(1, Ordering::SeqCst);
        match &self.after_suite_failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }

    async fn before_case(&self, ctx: &CaseContext<'_>) -> anyhow::Result<()> {
        self.counters.before_case.fetch_add(1, Ordering::SeqCst);
        let mut remaining = lock(&self.before_case_failures);
        if *remaining > 0 {
            *remaining -= 1;
            anyhow::bail!("setup of {} failed", ctx.case.full_name);
        }
        Ok(())
    }

    async fn after_case(&self, _ctx: &CaseContext<'_>) -> anyhow::Result<()> {
        self.counters.after_case.fetch_add(1, Ordering::SeqCst);
        match &self.after_case_failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(()),
        }
    }

    async fn run_case(&self, ctx: &CaseContext<'_>) -> CaseOutcome {
        lock(&self.runs).push(CaseRun {
            result_id: ctx.result_id.to_string(),
            case: ctx.case.full_name.clone(),
            attempt: ctx.attempt,
            environment: ctx.environment.name().to_string(),
        });
        if let Some(delay) = self.delays.get(&ctx.case.name) {
            tokio::time::sleep(*delay).await;
        }
        self.next_outcome(&ctx.case.name)
    }
}
