//! The state shared between the read pump, the write pump, and the
//! embedder-facing [`crate::session::Session`] handle. Every field here is
//! behind the one `parking_lot::Mutex`; the two condvars hang off the same
//! lock for the one-shot waits section 5 describes (the `SETTINGS` and
//! `PING` acknowledgement timeouts).

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::config::SessionConfig;
use crate::events::EventBus;
use crate::flow::FlowController;
use crate::frame::types::StreamId;
use crate::headers::{ConnectionHeaders, HeaderCodec};
use crate::stream::{Role, StreamRegistry};

/// Everything that changes as frames are sent and received, guarded by one
/// lock so a `SETTINGS` change and a concurrent `WINDOW_UPDATE` can never
/// interleave inconsistently.
pub struct SharedState<C: HeaderCodec> {
    pub streams: StreamRegistry,
    pub flow: FlowController,
    pub headers: ConnectionHeaders<C>,
    /// Promised stream id -> `:path` of every `PUSH_PROMISE` whose header
    /// block has been fully assembled but whose stream hasn't closed yet
    /// (section 3's promised-resource map).
    pub promised: HashMap<StreamId, String>,
    pub settings_received: bool,
    pub settings_ack_pending: bool,
    pub ping_ack_pending: Option<u64>,
    pub goaway_sent: bool,
    pub goaway_received: bool,
    pub closed: bool,
}

/// The connection-wide state, reference-counted between the session handle
/// and both pump threads. Neither pump ever holds a raw pointer back to the
/// other; they share this `Arc` instead.
pub struct ConnectionState<C: HeaderCodec> {
    pub config: SessionConfig,
    pub role: Role,
    pub events: EventBus,
    pub shared: Mutex<SharedState<C>>,
    pub settings_ack: Condvar,
    pub ping_ack: Condvar,
    pub drain: Condvar,
}

impl<C: HeaderCodec> ConnectionState<C> {
    pub fn new(config: SessionConfig, role: Role, codec: C) -> Self {
        ConnectionState {
            events: EventBus::new(),
            shared: Mutex::new(SharedState {
                streams: StreamRegistry::new(role, config.max_concurrent_streams),
                flow: FlowController::new(config.initial_window_size),
                headers: ConnectionHeaders::new(codec),
                promised: HashMap::new(),
                settings_received: false,
                settings_ack_pending: false,
                ping_ack_pending: None,
                goaway_sent: false,
                goaway_received: false,
                closed: false,
            }),
            settings_ack: Condvar::new(),
            ping_ack: Condvar::new(),
            drain: Condvar::new(),
            config,
            role,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Idempotent: every disposal path (graceful shutdown, a `SETTINGS` or
    /// `PING` ack timeout, a connection-fatal read error, a write-pump
    /// failure) calls this, but `SessionDisposed` fires exactly once and the
    /// subscriber list is cleared only on the call that actually transitions
    /// `closed` (section 4.F/§8 invariant 8).
    pub fn mark_closed(&self) {
        let mut shared = self.shared.lock();
        if shared.closed {
            return;
        }
        shared.closed = true;
        drop(shared);
        self.drain.notify_all();
        self.events.publish(crate::events::Event::SessionDisposed);
        self.events.clear();
    }

    /// Blocks until a `SETTINGS` ack arrives or `timeout` elapses, per the
    /// 60-second default in section 6.5.3.
    pub fn wait_settings_ack(&self, timeout: Duration) -> bool {
        let mut shared = self.shared.lock();
        if !shared.settings_ack_pending {
            return true;
        }
        let result = self.settings_ack.wait_for(&mut shared, timeout);
        !shared.settings_ack_pending || !result.timed_out()
    }

    pub fn note_settings_ack_received(&self) {
        let mut shared = self.shared.lock();
        shared.settings_ack_pending = false;
        self.settings_ack.notify_all();
    }

    /// Blocks until a `PING` ack with the matching opaque data arrives, or
    /// `timeout` elapses, per the 3-second default.
    pub fn wait_ping_ack(&self, opaque_data: u64, timeout: Duration) -> bool {
        let mut shared = self.shared.lock();
        if shared.ping_ack_pending != Some(opaque_data) {
            return true;
        }
        let result = self.ping_ack.wait_for(&mut shared, timeout);
        shared.ping_ack_pending != Some(opaque_data) || !result.timed_out()
    }

    pub fn note_ping_ack_received(&self, opaque_data: u64) {
        let mut shared = self.shared.lock();
        if shared.ping_ack_pending == Some(opaque_data) {
            shared.ping_ack_pending = None;
        }
        self.ping_ack.notify_all();
    }
}
