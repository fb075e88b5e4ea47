//! Topic-based event bus for UI notifications.
//!
//! Reconciliation and the batcher publish [`Notification`]s to topics;
//! consumers subscribe only to the topics they need.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{Notification, Topic};
