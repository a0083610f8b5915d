//! Shared scaffolding for the black-box integration suite: an event
//! recorder embedders can poll without spinning a condvar of their own, plus
//! a couple of raw-frame helpers for tests that play one side of the
//! connection by hand instead of through a live `Session`.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use h2engine::events::Event;
use h2engine::frame::types::StreamId;

/// Collects every [`Event`] a session publishes, behind a lock a test thread
/// can poll from outside the pump threads that actually publish them.
#[derive(Clone, Default)]
pub struct EventRecorder {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A `Subscriber` closure bound to this recorder's storage. Pass the
    /// result straight to `Session::subscribe`.
    pub fn subscriber(&self) -> impl Fn(&Event) + Send + 'static {
        let events = self.events.clone();
        move |event: &Event| events.lock().unwrap().push(event.clone())
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Polls `predicate` against the current snapshot until it's satisfied
    /// or `timeout` elapses. Avoids a fixed sleep racing the pump threads.
    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&[Event]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.events.lock().unwrap()) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

pub fn disposed(events: &[Event]) -> bool {
    events.iter().any(|e| matches!(e, Event::SessionDisposed))
}

pub fn disposed_count(events: &[Event]) -> usize {
    events.iter().filter(|e| matches!(e, Event::SessionDisposed)).count()
}

pub fn frame_received_count(events: &[Event], want_type: &str, want_stream: StreamId) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, Event::FrameReceived { stream_id, frame_type } if *stream_id == want_stream && *frame_type == want_type))
        .count()
}
