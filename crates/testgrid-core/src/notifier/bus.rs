//! Priority-ordered publish/subscribe delivery.
//!
//! Subscribers are ordered by ascending priority, ties by registration
//! order. Delivery is synchronous and serialized: one message is handed to
//! every matching subscriber before the next message is delivered, so no
//! subscriber ever sees two messages interleaved. Handlers must be quick and
//! must not publish on the same bus.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::message::{Message, MessageKind};

/// Receiver of bus messages.
pub trait Subscriber: Send + Sync {
    fn on_message(&self, message: &Message);

    /// Called once when the owner shuts the bus down.
    fn finalize(&self) {}
}

impl<F> Subscriber for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_message(&self, message: &Message) {
        self(message)
    }
}

/// Handle returned by [`NotifierBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kinds: HashSet<MessageKind>,
    priority: i32,
    handler: Arc<dyn Subscriber>,
}

impl Subscription {
    fn wants(&self, kind: MessageKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }
}

/// The bus shared by the scheduler, the pool and the result board.
#[derive(Default)]
pub struct NotifierBus {
    subscriptions: Mutex<Vec<Subscription>>,
    delivery: Mutex<()>,
    next_id: AtomicU64,
}

impl NotifierBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kinds`; an empty slice subscribes to all kinds.
    pub fn subscribe(
        &self,
        kinds: &[MessageKind],
        priority: i32,
        handler: Arc<dyn Subscriber>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subs.push(Subscription {
            id,
            kinds: kinds.iter().copied().collect(),
            priority,
            handler,
        });
        // stable: equal priorities keep registration order
        subs.sort_by_key(|s| s.priority);
        id
    }

    /// Remove a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|s| s.id != id);
        subs.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Deliver `message` to every interested subscriber, in order.
    pub fn publish(&self, message: Message) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let kind = message.kind();
        let handlers: Vec<Arc<dyn Subscriber>> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|s| s.wants(kind))
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler.on_message(&message);
        }
    }

    /// Call [`Subscriber::finalize`] on every subscriber, in delivery order.
    pub fn finalize(&self) {
        let _delivery = self.delivery.lock().unwrap_or_else(PoisonError::into_inner);
        let handlers: Vec<Arc<dyn Subscriber>> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in handlers {
            handler.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MessageBody;

    fn run_started() -> Message {
        Message::new(MessageBody::RunStarted {
            run_id: "run-1".into(),
            test_count: 0,
        })
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Arc<dyn Subscriber> {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        Arc::new(move |_: &Message| log.lock().unwrap().push(tag.clone()))
    }

    #[test]
    fn delivery_follows_priority_then_registration() {
        let bus = NotifierBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(&[], 5, recorder(&log, "late"));
        bus.subscribe(&[], 1, recorder(&log, "first"));
        bus.subscribe(&[], 5, recorder(&log, "later"));
        bus.subscribe(&[], 1, recorder(&log, "second"));

        bus.publish(run_started());

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first", "second", "late", "later"]
        );
    }

    #[test]
    fn subscribers_only_receive_their_kinds() {
        let bus = NotifierBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(&[MessageKind::RunFinished], 0, recorder(&log, "finished"));
        bus.subscribe(&[MessageKind::RunStarted], 0, recorder(&log, "started"));

        bus.publish(run_started());

        assert_eq!(*log.lock().unwrap(), vec!["started"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = NotifierBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = bus.subscribe(&[], 0, recorder(&log, "x"));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(run_started());
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn finalize_reaches_every_subscriber() {
        struct Counting(std::sync::atomic::AtomicU32);
        impl Subscriber for Counting {
            fn on_message(&self, _message: &Message) {}
            fn finalize(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let bus = NotifierBus::new();
        let counting = Arc::new(Counting(std::sync::atomic::AtomicU32::new(0)));
        bus.subscribe(&[], 0, counting.clone());
        bus.subscribe(&[MessageKind::RunFinished], 3, counting.clone());
        bus.finalize();
        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
    }
}
