//! Environment lifecycle states and the allowed transitions between them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase that can fail an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Prepare,
    Deploy,
    Connect,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Prepare => f.write_str("prepare"),
            LifecyclePhase::Deploy => f.write_str("deploy"),
            LifecyclePhase::Connect => f.write_str("connect"),
        }
    }
}

/// Status of an environment within one run.
///
/// ```text
/// New ─► Prepared ─► Deployed ─► Connected ─► Deleted
///  │        │           │  └───────────────────▲
///  ▼        ▼           ▼                      │
/// Failed  Failed      Failed(Connect) ─────────┘
/// (Prepare)(Deploy)
/// ```
///
/// `Failed(_)` states are absorbing for the run, except that an environment
/// whose connection failed is still deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentStatus {
    New,
    Prepared,
    Deployed,
    Connected,
    Deleted,
    Failed(LifecyclePhase),
}

impl EnvironmentStatus {
    pub fn can_transition_to(self, next: EnvironmentStatus) -> bool {
        use EnvironmentStatus::*;
        matches!(
            (self, next),
            (New, Prepared)
                | (New, Failed(LifecyclePhase::Prepare))
                | (Prepared, Deployed)
                | (Prepared, Failed(LifecyclePhase::Deploy))
                | (Deployed, Connected)
                | (Deployed, Failed(LifecyclePhase::Connect))
                | (Deployed, Deleted)
                | (Connected, Deleted)
                | (Failed(LifecyclePhase::Connect), Deleted)
        )
    }

    /// Not yet deleted and not failed.
    pub fn is_alive(self) -> bool {
        matches!(
            self,
            EnvironmentStatus::New
                | EnvironmentStatus::Prepared
                | EnvironmentStatus::Deployed
                | EnvironmentStatus::Connected
        )
    }
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentStatus::New => f.write_str("new"),
            EnvironmentStatus::Prepared => f.write_str("prepared"),
            EnvironmentStatus::Deployed => f.write_str("deployed"),
            EnvironmentStatus::Connected => f.write_str("connected"),
            EnvironmentStatus::Deleted => f.write_str("deleted"),
            EnvironmentStatus::Failed(phase) => write!(f, "{phase}_failed"),
        }
    }
}
