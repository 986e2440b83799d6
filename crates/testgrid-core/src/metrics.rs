//! Process-wide run counters.
//!
//! Counters are bumped silently where things happen; [`Metrics::flush`]
//! emits all of them as one `info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    environments_deployed: AtomicU64,
    deploy_waits: AtomicU64,
    cases_run: AtomicU64,
    case_retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            environments_deployed: AtomicU64::new(0),
            deploy_waits: AtomicU64::new(0),
            cases_run: AtomicU64::new(0),
            case_retries: AtomicU64::new(0),
        }
    }

    pub fn inc_deployed(&self) {
        self.environments_deployed.fetch_add(1, Ordering::Relaxed);
    }

    /// A deploy returned `WaitMoreResource`.
    pub fn inc_deploy_waits(&self) {
        self.deploy_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cases_run(&self) {
        self.cases_run.fetch_add(1, Ordering::Relaxed);
    }

    /// An attempt beyond the first, for hooks or case bodies.
    pub fn inc_retries(&self) {
        self.case_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            environments_deployed = self.environments_deployed(),
            deploy_waits = self.deploy_waits(),
            cases_run = self.cases_run(),
            case_retries = self.case_retries(),
        );
    }

    pub fn environments_deployed(&self) -> u64 {
        self.environments_deployed.load(Ordering::Relaxed)
    }

    pub fn deploy_waits(&self) -> u64 {
        self.deploy_waits.load(Ordering::Relaxed)
    }

    pub fn cases_run(&self) -> u64 {
        self.cases_run.load(Ordering::Relaxed)
    }

    pub fn case_retries(&self) -> u64 {
        self.case_retries.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.environments_deployed.store(0, Ordering::Relaxed);
        self.deploy_waits.store(0, Ordering::Relaxed);
        self.cases_run.store(0, Ordering::Relaxed);
        self.case_retries.store(0, Ordering::Relaxed);
    }
}
