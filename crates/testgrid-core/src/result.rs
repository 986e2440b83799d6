//! Test results and the board that owns them for one run.
//!
//! The [`ResultBoard`] is the single owner of result state. Every status
//! change goes through [`ResultBoard::set_status`] or one of the claim
//! operations. Each queues a `TestResultStatusChanged` message under the
//! board lock; the queue is delivered in order after the lock is released,
//! so subscribers may read the board from their handlers.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use serde::{Deserialize, Serialize};

use testgrid_space::{CheckResult, Requirement};

use crate::notifier::{Message, MessageBody, NotifierBus};
use crate::obs;
use crate::suite::CaseRuntime;

/// Status of one test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Queued,
    Running,
    Passed,
    Failed,
    Skipped,
    Attempted,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Skipped | TestStatus::Attempted
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestStatus::Queued => "QUEUED",
            TestStatus::Running => "RUNNING",
            TestStatus::Passed => "PASSED",
            TestStatus::Failed => "FAILED",
            TestStatus::Skipped => "SKIPPED",
            TestStatus::Attempted => "ATTEMPTED",
        };
        f.write_str(name)
    }
}

/// Read-only view of a result, as carried by bus messages and the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub id: String,
    /// `suite.case`
    pub case: String,
    pub suite: String,
    pub status: TestStatus,
    pub message: String,
    pub environment: Option<String>,
}

/// One scheduled execution of a case.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub id: String,
    pub runtime: CaseRuntime,
    /// Case requirement after platform merge and feature filtering.
    pub requirement: Requirement,
    pub status: TestStatus,
    pub message: String,
    pub environment: Option<String>,
    /// Why environments were rejected, prefixed with their names.
    pub check_reasons: CheckResult,
    claimed_by: Option<u64>,
}

impl TestResult {
    pub fn new(id: impl Into<String>, runtime: CaseRuntime) -> Self {
        Self {
            id: id.into(),
            requirement: runtime.spec.requirement.clone(),
            runtime,
            status: TestStatus::Queued,
            message: String::new(),
            environment: None,
            check_reasons: CheckResult::ok(),
            claimed_by: None,
        }
    }

    pub fn suite(&self) -> &str {
        &self.runtime.spec.suite
    }

    pub fn case_name(&self) -> &str {
        &self.runtime.spec.full_name
    }

    /// Queued and not claimed by any environment.
    pub fn is_available(&self) -> bool {
        self.status == TestStatus::Queued && self.claimed_by.is_none()
    }

    pub fn snapshot(&self) -> ResultSnapshot {
        ResultSnapshot {
            id: self.id.clone(),
            case: self.runtime.spec.full_name.clone(),
            suite: self.runtime.spec.suite.clone(),
            status: self.status,
            message: self.message.clone(),
            environment: self.environment.clone(),
        }
    }
}

/// How well a queued result fits an environment right now.
#[derive(Debug, Clone, PartialEq)]
pub enum Fitness {
    Fits,
    /// The capability does not satisfy the requirement.
    Unfit(CheckResult),
    /// The result can never run here and should be finalized `SKIPPED`.
    Incompatible(String),
    /// Fits, but the environment has not reached the status the case needs.
    NotYet,
}

/// The environment asking for work.
#[derive(Debug, Clone)]
pub struct ClaimTarget {
    pub env_id: u64,
    pub env_name: String,
    pub is_new: bool,
    pub source_result: Option<String>,
}

#[derive(Default)]
struct BoardState {
    results: Vec<TestResult>,
    by_id: HashMap<String, usize>,
    outbox: VecDeque<Message>,
}

impl BoardState {
    /// Indices of available results, the target's source result first.
    fn candidates(&self, target: &ClaimTarget) -> Vec<usize> {
        let source = target
            .source_result
            .as_deref()
            .and_then(|id| self.by_id.get(id).copied())
            .filter(|&i| self.results[i].is_available());
        let rest = (0..self.results.len())
            .filter(|&i| Some(i) != source && self.results[i].is_available());
        source.into_iter().chain(rest).collect()
    }
}

/// Owner of every result of a run.
pub struct ResultBoard {
    state: Mutex<BoardState>,
    flushing: Mutex<()>,
    bus: Arc<NotifierBus>,
}

impl ResultBoard {
    pub fn new(bus: Arc<NotifierBus>) -> Self {
        Self {
            state: Mutex::new(BoardState::default()),
            flushing: Mutex::new(()),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish queued messages in the order they were produced.
    ///
    /// Only one caller drains at a time; anyone arriving while a drain is in
    /// progress leaves their messages to it. The board lock is never held
    /// while the bus delivers.
    fn flush(&self) {
        loop {
            let flushing = match self.flushing.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };
            loop {
                let next = self.lock().outbox.pop_front();
                let Some(message) = next else { break };
                self.bus.publish(message);
            }
            drop(flushing);
            // a message queued between the last pop and the unlock
            if self.lock().outbox.is_empty() {
                return;
            }
        }
    }

    /// Add a queued result. Ids must be unique within the run.
    pub fn push(&self, result: TestResult) {
        let mut state = self.lock();
        let index = state.results.len();
        state.by_id.insert(result.id.clone(), index);
        state.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.lock().results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change the status of `id`, appending `message` on its own line.
    ///
    /// A result that already reached a terminal status keeps it and its
    /// message; the change is still published so observers see the attempt.
    pub fn set_status(&self, id: &str, status: TestStatus, message: Option<&str>) {
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(&index) = state.by_id.get(id) else {
                tracing::warn!(result = id, "status change for unknown result");
                return;
            };
            let changed = Self::apply(&mut state.results[index], status, message);
            state.outbox.push_back(changed);
        }
        self.flush();
    }

    fn apply(result: &mut TestResult, status: TestStatus, message: Option<&str>) -> Message {
        let previous = result.status;
        if !previous.is_terminal() {
            result.status = status;
            if let Some(message) = message.filter(|m| !m.is_empty()) {
                if !result.message.is_empty() {
                    result.message.push('\n');
                }
                result.message.push_str(message);
            }
            if status.is_terminal() {
                result.claimed_by = None;
                obs::emit_result_finalized(&result.id, result.case_name(), status, &result.message);
            }
        }
        Message::new(MessageBody::TestResultStatusChanged {
            previous,
            result: result.snapshot(),
        })
    }

    pub fn get(&self, id: &str) -> Option<ResultSnapshot> {
        let state = self.lock();
        state.by_id.get(id).map(|&i| state.results[i].snapshot())
    }

    pub fn status_of(&self, id: &str) -> Option<TestStatus> {
        let state = self.lock();
        state.by_id.get(id).map(|&i| state.results[i].status)
    }

    /// Every result in creation order.
    pub fn snapshot(&self) -> Vec<ResultSnapshot> {
        self.lock().results.iter().map(TestResult::snapshot).collect()
    }

    /// Copies of all results still waiting for an environment.
    pub fn queued(&self) -> Vec<TestResult> {
        self.lock()
            .results
            .iter()
            .filter(|r| r.is_available())
            .cloned()
            .collect()
    }

    /// Ids of results that have not reached a terminal status.
    pub fn unresolved(&self) -> Vec<String> {
        self.lock()
            .results
            .iter()
            .filter(|r| !r.status.is_terminal())
            .map(|r| r.id.clone())
            .collect()
    }

    /// Whether a result run on `environment` ended `FAILED`.
    pub fn has_failure_on(&self, environment: &str) -> bool {
        self.lock().results.iter().any(|r| {
            r.status == TestStatus::Failed && r.environment.as_deref() == Some(environment)
        })
    }

    fn eligible(result: &TestResult, target: &ClaimTarget) -> bool {
        !result.runtime.use_new_environment || target.is_new
    }

    /// Whether any available result fits `target` without claiming it.
    ///
    /// Rejection reasons are recorded on the results for the final skip
    /// message.
    pub fn peek<F>(&self, target: &ClaimTarget, mut fitness: F) -> bool
    where
        F: FnMut(&TestResult) -> Fitness,
    {
        let mut state = self.lock();
        let mut found = false;
        for index in state.candidates(target) {
            let result = &mut state.results[index];
            if !Self::eligible(result, target) {
                continue;
            }
            match fitness(result) {
                Fitness::Fits => found = true,
                Fitness::Unfit(check) => result.check_reasons.merge(check, &target.env_name),
                Fitness::NotYet | Fitness::Incompatible(_) => {}
            }
        }
        found
    }

    /// Atomically claim every available result that fits `target`.
    ///
    /// A result asking for a new environment is claimed alone, and only while
    /// the environment is unused. Incompatible results are finalized
    /// `SKIPPED` on the spot.
    pub fn claim<F>(&self, target: &ClaimTarget, mut fitness: F) -> Vec<TestResult>
    where
        F: FnMut(&TestResult) -> Fitness,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut claimed = Vec::new();
        for index in state.candidates(target) {
            let result = &mut state.results[index];
            if !Self::eligible(result, target) {
                continue;
            }
            let exclusive = result.runtime.use_new_environment;
            if exclusive && !claimed.is_empty() {
                continue;
            }
            match fitness(result) {
                Fitness::Fits => {
                    result.claimed_by = Some(target.env_id);
                    result.environment = Some(target.env_name.clone());
                    claimed.push(result.clone());
                    if exclusive {
                        break;
                    }
                }
                Fitness::Unfit(check) => result.check_reasons.merge(check, &target.env_name),
                Fitness::Incompatible(reason) => {
                    result.environment = Some(target.env_name.clone());
                    let skipped = Self::apply(result, TestStatus::Skipped, Some(&reason));
                    state.outbox.push_back(skipped);
                }
                Fitness::NotYet => {}
            }
        }
        drop(guard);
        self.flush();
        claimed
    }

    /// Return claimed results that were not run to the queue.
    pub fn release(&self, ids: &[String]) {
        let mut state = self.lock();
        for id in ids {
            if let Some(&index) = state.by_id.get(id) {
                let result = &mut state.results[index];
                if result.status == TestStatus::Queued {
                    result.claimed_by = None;
                    result.environment = None;
                }
            }
        }
    }

    /// Finalize one result `FAILED` with `"{phase}: {error}"`.
    ///
    /// The environment's source result is preferred while still available;
    /// otherwise the first available result that fits. Returns the id of the
    /// result the failure was attached to.
    pub fn attach_failure<F>(
        &self,
        target: &ClaimTarget,
        phase: &str,
        error: &str,
        mut fitness: F,
    ) -> Option<String>
    where
        F: FnMut(&TestResult) -> Fitness,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        let source = target
            .source_result
            .as_deref()
            .and_then(|id| state.by_id.get(id).copied())
            .filter(|&i| state.results[i].is_available());
        let index = source.or_else(|| {
            state.candidates(target).into_iter().find(|&i| {
                let result = &state.results[i];
                Self::eligible(result, target)
                    && matches!(fitness(result), Fitness::Fits | Fitness::NotYet)
            })
        })?;
        let result = &mut state.results[index];
        result.environment = Some(target.env_name.clone());
        let id = result.id.clone();
        let failed = Self::apply(result, TestStatus::Failed, Some(&format!("{phase}: {error}")));
        state.outbox.push_back(failed);
        drop(guard);
        self.flush();
        Some(id)
    }

    /// Finalize every still-queued result `SKIPPED` with `reason`, followed
    /// by the environment rejections recorded for it.
    pub fn skip_queued(&self, reason: &str) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut skipped = 0;
        for result in state.results.iter_mut() {
            if result.status != TestStatus::Queued {
                continue;
            }
            let message = if result.check_reasons.reasons.is_empty() {
                reason.to_string()
            } else {
                format!("{reason}: {}", result.check_reasons.joined())
            };
            result.claimed_by = None;
            state
                .outbox
                .push_back(Self::apply(result, TestStatus::Skipped, Some(&message)));
            skipped += 1;
        }
        drop(guard);
        self.flush();
        skipped
    }

    /// Finalize every non-terminal result, queued or running, `SKIPPED`
    /// with `reason`. Used when a run is aborted.
    pub fn abandon_unresolved(&self, reason: &str) -> usize {
        let mut guard = self.lock();
        let state = &mut *guard;
        let mut abandoned = 0;
        for result in state.results.iter_mut() {
            if result.status.is_terminal() {
                continue;
            }
            result.claimed_by = None;
            state
                .outbox
                .push_back(Self::apply(result, TestStatus::Skipped, Some(reason)));
            abandoned += 1;
        }
        drop(guard);
        self.flush();
        abandoned
    }
}
