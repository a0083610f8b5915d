//! The embedder-facing event surface: a subscribe list behind a lock, fed by
//! the dispatcher and write pump as the connection progresses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::frame::types::StreamId;

/// A token returned from [`EventBus::subscribe`], good for exactly one
/// [`EventBus::unsubscribe`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Something an embedder might want to react to. Deliberately coarse —
/// this is a notification surface, not a frame-by-frame trace; `log`
/// covers that at a finer grain.
#[derive(Debug, Clone)]
pub enum Event {
    /// A locally-built `SETTINGS` frame was handed to the write pump.
    SettingsSent,

    /// A frame was fully decoded off the wire and dispatched.
    FrameReceived { stream_id: StreamId, frame_type: &'static str },

    /// A request's `HEADERS` (and any `DATA`) were handed to the write pump.
    RequestSent { stream_id: StreamId },

    /// The session has torn down, locally or via `GOAWAY`, and will not
    /// process or emit further frames.
    SessionDisposed,
}

/// Anything that wants to receive [`Event`]s as they occur.
pub trait Subscriber: Send {
    fn on_event(&self, event: &Event);
}

impl<F: Fn(&Event) + Send> Subscriber for F {
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// The subscribe list itself. Cloning an [`EventBus`] shares the same
/// underlying list — every clone sees every subscriber.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<(SubscriptionId, Box<dyn Subscriber>)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus::default()
    }

    pub fn subscribe(&self, subscriber: Box<dyn Subscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, subscriber));
        id
    }

    /// Removes a subscriber. Returns `false` if `id` was never registered or
    /// was already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    pub fn publish(&self, event: Event) {
        for (_, subscriber) in self.subscribers.lock().iter() {
            subscriber.on_event(&event);
        }
    }

    /// Drops every registered subscriber. Called once a session has
    /// disposed: nothing further will ever be published.
    pub fn clear(&self) {
        self.subscribers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_subscriber_sees_every_event() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = count.clone();
        bus.subscribe(Box::new(move |_: &Event| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let c2 = count.clone();
        bus.subscribe(Box::new(move |_: &Event| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(Event::SettingsSent);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unsubscribed_subscriber_stops_receiving_events() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let id = bus.subscribe(Box::new(move |_: &Event| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(Event::SettingsSent);
        assert!(bus.unsubscribe(id));
        bus.publish(Event::SettingsSent);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!bus.unsubscribe(id));
    }
}
