//! Messages carried by the notifier bus.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::environment::EnvironmentStatus;
use crate::result::{ResultSnapshot, TestStatus};

/// Kinds a subscriber can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    RunStarted,
    RunFinished,
    EnvironmentStatusChanged,
    TestResultStatusChanged,
}

/// Payload of a [`Message`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    RunStarted {
        run_id: String,
        test_count: usize,
    },
    RunFinished {
        run_id: String,
        counts: BTreeMap<TestStatus, usize>,
        exit_code: i32,
    },
    EnvironmentStatusChanged {
        environment: String,
        previous: EnvironmentStatus,
        status: EnvironmentStatus,
    },
    TestResultStatusChanged {
        previous: TestStatus,
        result: ResultSnapshot,
    },
}

/// A timestamped bus message.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub time: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl Message {
    pub fn new(body: MessageBody) -> Self {
        Self {
            time: Utc::now(),
            body,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match &self.body {
            MessageBody::RunStarted { .. } => MessageKind::RunStarted,
            MessageBody::RunFinished { .. } => MessageKind::RunFinished,
            MessageBody::EnvironmentStatusChanged { .. } => MessageKind::EnvironmentStatusChanged,
            MessageBody::TestResultStatusChanged { .. } => MessageKind::TestResultStatusChanged,
        }
    }

    /// The result snapshot, for result status messages.
    pub fn result(&self) -> Option<&ResultSnapshot> {
        match &self.body {
            MessageBody::TestResultStatusChanged { result, .. } => Some(result),
            _ => None,
        }
    }
}
