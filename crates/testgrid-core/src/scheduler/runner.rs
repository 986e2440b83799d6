//! The scheduler: matches queued results to environments and drives each
//! environment through prepare, deploy, run, connect, run and delete.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::{FutureExt, StreamExt};
use tracing::{debug, info, instrument, warn, Instrument};
use uuid::Uuid;

use testgrid_space::Requirement;

use super::cancel::CancelToken;
use super::config::{KeepEnvironment, RunnerConfig};
use super::error::{SchedulerError, SchedulerResult};
use super::fitness::{evaluate, evaluate_for_connection, Stage};
use super::report::RunReport;
use crate::environment::{
    Environment, EnvironmentPool, EnvironmentSpec, EnvironmentStatus, LifecyclePhase,
    SharedEnvironment,
};
use crate::metrics::METRICS;
use crate::notifier::{Message, MessageBody, NotifierBus};
use crate::obs::{self, RunSpan};
use crate::platform::Platform;
use crate::result::{ClaimTarget, ResultBoard, TestResult, TestStatus};
use crate::suite::executor::panic_message;
use crate::suite::{CaseRuntime, Registry, SuiteExecutor};

/// Runs selected cases against a platform.
pub struct Scheduler {
    platform: Arc<dyn Platform>,
    registry: Arc<Registry>,
    bus: Arc<NotifierBus>,
    config: RunnerConfig,
    cancel: CancelToken,
}

/// State shared by the environment workers of one run.
struct RunState {
    board: Arc<ResultBoard>,
    executor: SuiteExecutor,
}

fn claim_target(env: &Environment) -> ClaimTarget {
    ClaimTarget {
        env_id: env.id(),
        env_name: env.name().to_string(),
        is_new: env.is_new(),
        source_result: env.source_result().map(str::to_string),
    }
}

/// Group claimed results by suite. Suites are ordered by their best (lowest)
/// case priority, ties by first appearance; each batch keeps claim order.
fn batch_by_suite(claimed: Vec<TestResult>) -> Vec<(String, Vec<TestResult>)> {
    let mut batches: Vec<(String, Vec<TestResult>)> = Vec::new();
    for result in claimed {
        match batches.iter_mut().find(|(suite, _)| suite == result.suite()) {
            Some((_, batch)) => batch.push(result),
            None => batches.push((result.suite().to_string(), vec![result])),
        }
    }
    batches.sort_by_key(|(_, batch)| {
        batch
            .iter()
            .map(|r| r.runtime.spec.priority)
            .min()
            .unwrap_or(u8::MAX)
    });
    batches
}

impl Scheduler {
    pub fn new(
        platform: Arc<dyn Platform>,
        registry: Arc<Registry>,
        bus: Arc<NotifierBus>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            platform,
            registry,
            bus,
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Token that stops the run at the next environment or batch boundary.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn bus(&self) -> &Arc<NotifierBus> {
        &self.bus
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `cases` on `predefined` environments plus any generated ones.
    ///
    /// Structural problems (config, unknown suites, malformed requirements)
    /// abort before anything is scheduled. Everything else is reported per
    /// result, and every result in the returned report is terminal.
    pub async fn run(
        &self,
        cases: Vec<CaseRuntime>,
        predefined: Vec<EnvironmentSpec>,
    ) -> SchedulerResult<RunReport> {
        self.validate(&cases)?;
        let run_id = Uuid::new_v4().to_string();
        let span = RunSpan::span(&run_id);
        self.execute(run_id, cases, predefined).instrument(span).await
    }

    fn validate(&self, cases: &[CaseRuntime]) -> SchedulerResult<()> {
        self.config.validate()?;
        if self.platform.platform_type().trim().is_empty() {
            return Err(SchedulerError::EmptyPlatformType);
        }
        for case in cases {
            if self.registry.suite(&case.spec.suite).is_none() {
                return Err(SchedulerError::UnknownSuite {
                    case: case.spec.full_name.clone(),
                    suite: case.spec.suite.clone(),
                });
            }
            case.spec
                .requirement
                .validate()
                .map_err(|source| SchedulerError::InvalidRequirement {
                    case: case.spec.full_name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Requirement after the platform-wide merge and feature filtering.
    fn effective_requirement(&self, requirement: &Requirement) -> Result<Requirement, String> {
        let merged = match &self.config.platform_requirement {
            Some(platform) => requirement
                .merge_platform(platform)
                .map_err(|e| format!("platform requirement: {e}"))?,
            None => requirement.clone(),
        };
        Ok(merged.without_features(&self.config.ignored_features))
    }

    async fn execute(
        &self,
        run_id: String,
        cases: Vec<CaseRuntime>,
        predefined: Vec<EnvironmentSpec>,
    ) -> SchedulerResult<RunReport> {
        let started_at = Utc::now();
        let predefined_count = predefined.len();
        let pool = EnvironmentPool::load(predefined, Arc::clone(&self.bus))?;
        let board = Arc::new(ResultBoard::new(Arc::clone(&self.bus)));

        let mut pending = Vec::new();
        let mut repetitions: HashMap<String, u32> = HashMap::new();
        for runtime in cases {
            let effective = self.effective_requirement(&runtime.spec.requirement);
            for _ in 0..runtime.times.max(1) {
                let n = repetitions.entry(runtime.spec.full_name.clone()).or_insert(0);
                let mut result =
                    TestResult::new(format!("{}#{n}", runtime.spec.full_name), runtime.clone());
                *n += 1;
                if let Ok(requirement) = &effective {
                    result.requirement = requirement.clone();
                }
                board.push(result.clone());
                pending.push((result, effective.clone()));
            }
        }

        obs::emit_run_started(&run_id, board.len(), predefined_count);
        self.bus.publish(Message::new(MessageBody::RunStarted {
            run_id: run_id.clone(),
            test_count: board.len(),
        }));

        self.match_requirements(&pool, &board, pending, predefined_count)
            .await?;
        self.prepare_environments(&pool, &board).await?;

        let state = RunState {
            executor: SuiteExecutor::new(
                Arc::clone(&board),
                Arc::new(self.config.variables.clone()),
            )
            .with_backoff(self.config.retry_backoff_ms),
            board: Arc::clone(&board),
        };
        let order = pool.schedule_order().await;
        debug!(environments = order.len(), "processing environments");
        // every worker runs to completion, even after another one failed
        let outcomes: Vec<SchedulerResult<()>> = futures::stream::iter(order)
            .map(|handle| self.guarded_environment(handle, &state))
            .buffer_unordered(self.config.max_concurrency)
            .collect()
            .await;
        if let Some(err) = outcomes.into_iter().find_map(Result::err) {
            let abandoned = board.abandon_unresolved(&format!("run aborted: {err}"));
            warn!(error = %err, abandoned, "run aborted");
            METRICS.flush();
            return Err(err);
        }

        let reason = if self.cancel.is_cancelled() {
            "run cancelled"
        } else {
            "no available environment"
        };
        let skipped = board.skip_queued(reason);
        if skipped > 0 {
            info!(skipped, reason, "finalized queued results");
        }

        let unresolved = board.unresolved();
        if !unresolved.is_empty() {
            return Err(SchedulerError::Unresolved { ids: unresolved });
        }

        let report = RunReport {
            run_id: run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            results: board.snapshot(),
        };
        self.bus.publish(Message::new(MessageBody::RunFinished {
            run_id: run_id.clone(),
            counts: report.counts(),
            exit_code: report.exit_code(),
        }));
        obs::emit_run_finished(
            &run_id,
            report.duration_ms(),
            report.results.len(),
            report.count(TestStatus::Failed),
        );
        METRICS.flush();
        Ok(report)
    }

    /// Platform check, then find or generate an environment per result.
    async fn match_requirements(
        &self,
        pool: &EnvironmentPool,
        board: &ResultBoard,
        pending: Vec<(TestResult, Result<Requirement, String>)>,
        predefined_count: usize,
    ) -> SchedulerResult<()> {
        let platform_type = self.platform.platform_type();
        let generate = self.config.generates(predefined_count);
        for (result, effective) in pending {
            let platform_check = result.requirement.check_platform(platform_type);
            if !platform_check.is_ok() {
                board.set_status(&result.id, TestStatus::Skipped, Some(&platform_check.joined()));
                continue;
            }
            let requirement = match effective {
                Ok(requirement) => requirement,
                Err(message) => {
                    board.set_status(&result.id, TestStatus::Skipped, Some(&message));
                    continue;
                }
            };
            if generate {
                pool.get_or_create(
                    &requirement,
                    result.runtime.use_new_environment,
                    Some(&result.id),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn prepare_environments(
        &self,
        pool: &EnvironmentPool,
        board: &ResultBoard,
    ) -> SchedulerResult<()> {
        for handle in pool.environments().await {
            let mut env = handle.lock().await;
            if env.status() != EnvironmentStatus::New {
                continue;
            }
            let failed = EnvironmentStatus::Failed(LifecyclePhase::Prepare);
            match self.platform.prepare(&mut env).await {
                Ok(true) => env.transition(EnvironmentStatus::Prepared, &self.bus)?,
                Ok(false) => {
                    info!(environment = %env.name(), "platform cannot host environment, dropped");
                    env.transition(failed, &self.bus)?;
                }
                Err(err) if err.is_wait() => {
                    info!(environment = %env.name(), error = %err, "environment dropped while preparing");
                    env.transition(failed, &self.bus)?;
                }
                Err(err) => {
                    obs::emit_platform_error(env.name(), "prepare", &err);
                    env.transition(failed, &self.bus)?;
                    board.attach_failure(&claim_target(&env), "prepare", &err.to_string(), |r| {
                        evaluate(r, &env, Stage::Probe)
                    });
                }
            }
        }
        Ok(())
    }

    /// [`Self::process_environment`], with a panic in platform code turned
    /// into an error once the environment has been torn down.
    async fn guarded_environment(
        &self,
        handle: SharedEnvironment,
        state: &RunState,
    ) -> SchedulerResult<()> {
        let worker = self.process_environment(Arc::clone(&handle), state);
        let payload = match AssertUnwindSafe(worker).catch_unwind().await {
            Ok(outcome) => return outcome,
            Err(payload) => payload,
        };
        let message = panic_message(payload.as_ref()).to_string();
        let mut env = handle.lock().await;
        warn!(environment = %env.name(), panic = %message, "environment worker panicked");
        if env.status() != EnvironmentStatus::Deleted {
            if let Err(err) = self.teardown(&mut env, &state.board).await {
                warn!(environment = %env.name(), error = %err, "teardown after panic failed");
            }
        }
        Err(SchedulerError::EnvironmentPanicked {
            environment: env.name().to_string(),
            message,
        })
    }

    /// Deploy, run, connect, run and delete one environment.
    ///
    /// The environment lock is held throughout, so nothing else touches it
    /// while its cases run. Teardown runs whenever the work after locking
    /// ends, successfully or not.
    async fn process_environment(
        &self,
        handle: SharedEnvironment,
        state: &RunState,
    ) -> SchedulerResult<()> {
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        let mut env = handle.lock().await;
        // cancellation may have arrived while waiting for the lock
        if self.cancel.is_cancelled() || env.status() != EnvironmentStatus::Prepared {
            return Ok(());
        }
        let outcome = self.deploy_and_run(&mut env, state).await;
        let teardown = self.teardown(&mut env, &state.board).await;
        outcome.and(teardown)
    }

    async fn deploy_and_run(&self, env: &mut Environment, state: &RunState) -> SchedulerResult<()> {
        let board = &state.board;
        if !board.peek(&claim_target(env), |r| evaluate(r, env, Stage::Probe)) {
            debug!(environment = %env.name(), "no queued result fits, not deploying");
            return Ok(());
        }

        match self.platform.deploy(env).await {
            Ok(()) => {
                env.transition(EnvironmentStatus::Deployed, &self.bus)?;
                METRICS.inc_deployed();
            }
            Err(err) if err.is_wait() => {
                METRICS.inc_deploy_waits();
                info!(event = "env.deploy_wait", environment = %env.name(), error = %err);
                return Ok(());
            }
            Err(err) => {
                obs::emit_platform_error(env.name(), "deploy", &err);
                env.transition(EnvironmentStatus::Failed(LifecyclePhase::Deploy), &self.bus)?;
                board.attach_failure(&claim_target(env), "deployment", &err.to_string(), |r| {
                    evaluate(r, env, Stage::Probe)
                });
                return Ok(());
            }
        }

        self.assign_and_run(env, state, Stage::Deployed).await?;

        if !self.cancel.is_cancelled()
            && board.peek(&claim_target(env), |r| evaluate_for_connection(r, env))
        {
            match self.platform.connect(env).await {
                Ok(()) => {
                    env.transition(EnvironmentStatus::Connected, &self.bus)?;
                    self.assign_and_run(env, state, Stage::Connected).await?;
                }
                Err(err) => {
                    obs::emit_platform_error(env.name(), "connect", &err);
                    env.transition(
                        EnvironmentStatus::Failed(LifecyclePhase::Connect),
                        &self.bus,
                    )?;
                    board.attach_failure(
                        &claim_target(env),
                        "connection",
                        &err.to_string(),
                        |r| evaluate_for_connection(r, env),
                    );
                }
            }
        }
        Ok(())
    }

    /// Claim and run batches until nothing else fits `env` at `stage`.
    #[instrument(skip_all, fields(environment = %env.name(), stage = ?stage))]
    async fn assign_and_run(
        &self,
        env: &mut Environment,
        state: &RunState,
        stage: Stage,
    ) -> SchedulerResult<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            let claimed = state
                .board
                .claim(&claim_target(env), |r| evaluate(r, env, stage));
            if claimed.is_empty() {
                return Ok(());
            }

            let mut batches = batch_by_suite(claimed).into_iter();
            while let Some((suite_name, batch)) = batches.next() {
                if self.cancel.is_cancelled() {
                    let mut unrun: Vec<String> = batch.into_iter().map(|r| r.id).collect();
                    unrun.extend(batches.by_ref().flat_map(|(_, rest)| rest).map(|r| r.id));
                    state.board.release(&unrun);
                    return Ok(());
                }
                match self.registry.suite(&suite_name) {
                    Some(suite) => {
                        state
                            .executor
                            .run_batch(suite.as_ref(), &suite_name, env, &batch)
                            .await;
                    }
                    None => {
                        let message = format!("suite {suite_name} is not registered");
                        for result in &batch {
                            state
                                .board
                                .set_status(&result.id, TestStatus::Skipped, Some(&message));
                        }
                    }
                }
                env.mark_used();
            }
        }
    }

    async fn teardown(&self, env: &mut Environment, board: &ResultBoard) -> SchedulerResult<()> {
        if !env.was_deployed() {
            return Ok(());
        }
        let keep = match self.config.keep_environment {
            KeepEnvironment::No => false,
            KeepEnvironment::Always => true,
            KeepEnvironment::Failed => board.has_failure_on(env.name()),
        };
        if keep {
            info!(event = "env.kept", environment = %env.name());
            return Ok(());
        }
        match self.platform.delete(env).await {
            Ok(()) => env.transition(EnvironmentStatus::Deleted, &self.bus)?,
            Err(err) => {
                warn!(environment = %env.name(), "delete failed, leaving environment behind");
                obs::emit_platform_error(env.name(), "delete", &err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedPlatform;
    use crate::suite::{CaseMetadata, SuiteMetadata};
    use testgrid_space::NodeSpace;

    fn result(suite: &str, case: &str, priority: u8) -> TestResult {
        let metadata = SuiteMetadata::new(suite)
            .with_case(CaseMetadata::new(case).with_priority(priority));
        let spec = metadata.cases[0].resolve(&metadata);
        TestResult::new(format!("{suite}.{case}#0"), CaseRuntime::new(Arc::new(spec)))
    }

    #[test]
    fn batches_follow_best_priority_then_first_appearance() {
        let claimed = vec![
            result("disk", "a", 3),
            result("net", "b", 2),
            result("disk", "c", 1),
            result("boot", "d", 2),
        ];
        let batches = batch_by_suite(claimed);
        let order: Vec<_> = batches.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, ["disk", "net", "boot"]);
        let disk: Vec<_> = batches[0].1.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(disk, ["disk.a#0", "disk.c#0"]);
    }

    #[tokio::test]
    async fn cancel_while_waiting_for_the_environment_lock_prevents_deploy() {
        let bus = Arc::new(NotifierBus::new());
        let platform = Arc::new(ScriptedPlatform::new("lab"));
        let scheduler = Scheduler::new(
            platform.clone(),
            Arc::new(Registry::new()),
            Arc::clone(&bus),
            RunnerConfig::default(),
        );
        let pool = EnvironmentPool::load(
            vec![EnvironmentSpec::new(vec![NodeSpace::default()]).named("east")],
            Arc::clone(&bus),
        )
        .unwrap();
        let handle = pool.environments().await.remove(0);
        handle
            .lock()
            .await
            .transition(EnvironmentStatus::Prepared, &bus)
            .unwrap();
        let board = Arc::new(ResultBoard::new(Arc::clone(&bus)));
        board.push(result("boot", "smoke", 1));
        let state = RunState {
            executor: SuiteExecutor::new(Arc::clone(&board), Arc::new(HashMap::new())),
            board,
        };

        let held = handle.lock().await;
        let worker = scheduler.process_environment(Arc::clone(&handle), &state);
        tokio::pin!(worker);
        assert!(futures::poll!(worker.as_mut()).is_pending());
        scheduler.cancel_token().cancel();
        drop(held);
        worker.await.unwrap();

        assert!(platform.calls_of("deploy").is_empty());
        assert_eq!(state.board.status_of("boot.smoke#0"), Some(TestStatus::Queued));
    }
}
