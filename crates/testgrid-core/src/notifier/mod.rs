//! Notifier bus: status-change events for observers.
//!
//! - [`message`]: `Message`, `MessageBody`, `MessageKind`
//! - [`bus`]: `NotifierBus`, `Subscriber`
//! - [`collector`]: `ResultCollector`

pub mod bus;
pub mod collector;
pub mod message;

pub use bus::{NotifierBus, Subscriber, SubscriptionId};
pub use collector::ResultCollector;
pub use message::{Message, MessageBody, MessageKind};
