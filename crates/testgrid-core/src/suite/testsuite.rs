//! The contract between the scheduler and test suite implementations.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;

use super::metadata::CaseSpec;
use crate::environment::Environment;

/// What a case body reports.
///
/// Warnings and skips are expected outcomes, not errors; only `Failed` is
/// retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Passed,
    PassedWithWarning(String),
    Skipped(String),
    Failed(String),
}

impl CaseOutcome {
    pub fn failed(message: impl fmt::Display) -> Self {
        CaseOutcome::Failed(message.to_string())
    }

    /// `Err` for failures so the outcome can drive a retry loop.
    pub fn into_retryable(self) -> Result<CaseOutcome, String> {
        match self {
            CaseOutcome::Failed(message) => Err(message),
            other => Ok(other),
        }
    }
}

impl From<anyhow::Result<()>> for CaseOutcome {
    fn from(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => CaseOutcome::Passed,
            Err(err) => CaseOutcome::Failed(format!("{err:#}")),
        }
    }
}

/// Context handed to suite-level hooks.
pub struct SuiteContext<'a> {
    pub suite: &'a str,
    pub environment: &'a Environment,
    pub variables: &'a HashMap<String, String>,
}

/// Context handed to case-level hooks and the case body.
pub struct CaseContext<'a> {
    pub case: &'a CaseSpec,
    pub result_id: &'a str,
    /// 1-based attempt number of the current call.
    pub attempt: u32,
    pub environment: &'a Environment,
    pub variables: &'a HashMap<String, String>,
}

/// A group of cases sharing setup and teardown.
///
/// Hook errors are retried up to the case's retry budget. A failing
/// `before_suite` skips the whole batch; a failing `before_case` skips the
/// case; `after_*` failures are only logged.
#[async_trait]
pub trait TestSuite: Send + Sync {
    async fn before_suite(&self, _ctx: &SuiteContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_suite(&self, _ctx: &SuiteContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_case(&self, _ctx: &CaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_case(&self, _ctx: &CaseContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run_case(&self, ctx: &CaseContext<'_>) -> CaseOutcome;
}
