//! End-of-run report.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::result::{ResultSnapshot, TestStatus};

/// Every result of one run, each in a terminal status.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub results: Vec<ResultSnapshot>,
}

impl RunReport {
    /// Number of results per status; statuses with no result are absent.
    pub fn counts(&self) -> BTreeMap<TestStatus, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, status: TestStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Process exit code: the number of failed results.
    pub fn exit_code(&self) -> i32 {
        i32::try_from(self.count(TestStatus::Failed)).unwrap_or(i32::MAX)
    }

    pub fn duration_ms(&self) -> u64 {
        u64::try_from((self.finished_at - self.started_at).num_milliseconds()).unwrap_or(0)
    }

    pub fn get(&self, id: &str) -> Option<&ResultSnapshot> {
        self.results.iter().find(|r| r.id == id)
    }

    /// Results whose case is `full_name`, in creation order.
    pub fn for_case<'a>(&'a self, full_name: &'a str) -> impl Iterator<Item = &'a ResultSnapshot> {
        self.results.iter().filter(move |r| r.case == full_name)
    }

    /// Plain-text summary: a TOTAL line, then one line per terminal status.
    /// `ATTEMPTED` is only listed when some result ended that way.
    pub fn render_summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<10}{}", "TOTAL", self.results.len());
        for status in [
            TestStatus::Passed,
            TestStatus::Failed,
            TestStatus::Skipped,
            TestStatus::Attempted,
        ] {
            let count = self.count(status);
            if status == TestStatus::Attempted && count == 0 {
                continue;
            }
            let _ = writeln!(out, "{:<10}{}", status.to_string(), count);
        }
        out
    }
}
