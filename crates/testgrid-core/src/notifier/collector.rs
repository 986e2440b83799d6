//! Built-in subscriber that keeps the latest snapshot of every test result.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::bus::{NotifierBus, Subscriber, SubscriptionId};
use super::message::{Message, MessageKind};
use crate::result::{ResultSnapshot, TestStatus};

#[derive(Default)]
struct Collected {
    order: Vec<String>,
    latest: HashMap<String, ResultSnapshot>,
    transitions: HashMap<String, Vec<TestStatus>>,
}

/// Collects result notifications in first-seen order.
#[derive(Default)]
pub struct ResultCollector {
    collected: Mutex<Collected>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a collector and subscribe it to result messages at `priority`.
    pub fn attach(bus: &NotifierBus, priority: i32) -> (Arc<Self>, SubscriptionId) {
        let collector = Arc::new(Self::new());
        let id = bus.subscribe(
            &[MessageKind::TestResultStatusChanged],
            priority,
            collector.clone(),
        );
        (collector, id)
    }

    /// Latest snapshot of every result seen so far.
    pub fn results(&self) -> Vec<ResultSnapshot> {
        let collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        collected
            .order
            .iter()
            .filter_map(|id| collected.latest.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<ResultSnapshot> {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .latest
            .get(id)
            .cloned()
    }

    /// Every status a result was reported with, in delivery order.
    pub fn transitions(&self, id: &str) -> Vec<TestStatus> {
        self.collected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .transitions
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Subscriber for ResultCollector {
    fn on_message(&self, message: &Message) {
        let Some(result) = message.result() else {
            return;
        };
        let mut collected = self.collected.lock().unwrap_or_else(PoisonError::into_inner);
        if !collected.latest.contains_key(&result.id) {
            collected.order.push(result.id.clone());
        }
        collected
            .transitions
            .entry(result.id.clone())
            .or_default()
            .push(result.status);
        collected.latest.insert(result.id.clone(), result.clone());
    }
}
