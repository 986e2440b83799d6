//! Runs one suite's batch of claimed results on one environment.
//!
//! Suite code runs behind [`guarded`]: a panic in a hook or case body is
//! reported as a failure of that call and never escapes the batch.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{debug, info, instrument, warn};

use super::metadata::CaseSpec;
use super::retry::{execute_with_retry, RetryPolicy};
use super::testsuite::{CaseContext, CaseOutcome, SuiteContext, TestSuite};
use crate::environment::Environment;
use crate::metrics::METRICS;
use crate::result::{ResultBoard, TestResult, TestStatus};

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic payload")
}

/// Await suite code, turning a panic into `Err("panicked: ...")`.
async fn guarded<T>(work: impl Future<Output = Result<T, String>>) -> Result<T, String> {
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => Err(format!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Drives suite hooks and case bodies, reporting through the result board.
pub struct SuiteExecutor {
    board: Arc<ResultBoard>,
    variables: Arc<HashMap<String, String>>,
    backoff_ms: u64,
}

impl SuiteExecutor {
    pub fn new(board: Arc<ResultBoard>, variables: Arc<HashMap<String, String>>) -> Self {
        Self {
            board,
            variables,
            backoff_ms: 0,
        }
    }

    /// Base delay between retried attempts.
    pub fn with_backoff(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Run `batch` (all from `suite_name`) and return each result's final status.
    #[instrument(
        skip_all,
        fields(suite = suite_name, environment = %environment.name(), cases = batch.len())
    )]
    pub async fn run_batch(
        &self,
        suite: &dyn TestSuite,
        suite_name: &str,
        environment: &Environment,
        batch: &[TestResult],
    ) -> Vec<TestStatus> {
        let suite_ctx = SuiteContext {
            suite: suite_name,
            environment,
            variables: self.variables.as_ref(),
        };
        // suite hooks are not retried
        let setup = guarded(async {
            suite
                .before_suite(&suite_ctx)
                .await
                .map_err(|e| format!("{e:#}"))
        })
        .await;

        let statuses = match setup {
            Err(err) => {
                warn!(error = %err, "before_suite failed, skipping batch");
                let message = format!("before_suite: {err}");
                for result in batch {
                    self.board
                        .set_status(&result.id, TestStatus::Skipped, Some(&message));
                }
                batch.iter().map(|_| TestStatus::Skipped).collect()
            }
            Ok(()) => {
                let mut statuses = Vec::with_capacity(batch.len());
                for result in batch {
                    statuses.push(self.run_case(suite, environment, result).await);
                }
                statuses
            }
        };

        let teardown = guarded(async {
            suite
                .after_suite(&suite_ctx)
                .await
                .map_err(|e| format!("{e:#}"))
        })
        .await;
        if let Err(err) = teardown {
            warn!(error = %err, "after_suite failed");
        }

        statuses
    }

    async fn run_case(
        &self,
        suite: &dyn TestSuite,
        environment: &Environment,
        result: &TestResult,
    ) -> TestStatus {
        let spec: &CaseSpec = &result.runtime.spec;
        let policy = RetryPolicy::new(result.runtime.retry).with_backoff(self.backoff_ms);
        let context = |attempt| CaseContext {
            case: spec,
            result_id: result.id.as_str(),
            attempt,
            environment,
            variables: self.variables.as_ref(),
        };

        self.board.set_status(&result.id, TestStatus::Running, None);
        METRICS.inc_cases_run();
        info!(case = %spec.full_name, result = %result.id, "case started");

        let setup = execute_with_retry(&policy, |attempt| {
            let ctx = context(attempt);
            async move {
                guarded(async { suite.before_case(&ctx).await.map_err(|e| format!("{e:#}")) })
                    .await
            }
        })
        .await;

        let (status, message) = match setup.value {
            Err(err) => (TestStatus::Skipped, format!("before_case: {err}")),
            Ok(()) => {
                let body_policy = policy.clone().with_timeout(spec.timeout);
                let body = execute_with_retry(&body_policy, |attempt| {
                    let ctx = context(attempt);
                    async move {
                        guarded(async { Ok(suite.run_case(&ctx).await) })
                            .await
                            .and_then(CaseOutcome::into_retryable)
                    }
                })
                .await;
                debug!(case = %spec.full_name, attempts = body.attempts, "case body finished");
                match body.value {
                    Ok(CaseOutcome::Passed) => (TestStatus::Passed, String::new()),
                    Ok(CaseOutcome::PassedWithWarning(m)) => {
                        (TestStatus::Passed, format!("warning: {m}"))
                    }
                    Ok(CaseOutcome::Skipped(m)) => (TestStatus::Skipped, format!("skipped: {m}")),
                    // into_retryable maps Failed to Err, guarded maps panics to Err
                    Ok(CaseOutcome::Failed(m)) | Err(m) if result.runtime.ignore_failure => {
                        (TestStatus::Attempted, format!("failed. {m}"))
                    }
                    Ok(CaseOutcome::Failed(m)) | Err(m) => {
                        (TestStatus::Failed, format!("failed. {m}"))
                    }
                }
            }
        };

        let message = (!message.is_empty()).then_some(message.as_str());
        self.board.set_status(&result.id, status, message);

        let teardown = execute_with_retry(&policy, |attempt| {
            let ctx = context(attempt);
            async move {
                guarded(async { suite.after_case(&ctx).await.map_err(|e| format!("{e:#}")) })
                    .await
            }
        })
        .await;
        if let Err(err) = teardown.value {
            warn!(case = %spec.full_name, error = %err, "after_case failed");
        }

        info!(case = %spec.full_name, result = %result.id, status = %status, "case finished");
        status
    }
}
