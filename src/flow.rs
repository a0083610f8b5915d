//! Flow-control bookkeeping: one send window and one receive window per
//! stream, plus a pair for the connection as a whole. `DATA` frames are
//! gated against the smaller of the two applicable send windows; `WINDOW_UPDATE`
//! credits the relevant window back.

use crate::error::{Http2Error, Result};
use crate::frame::types::StreamId;

/// The largest value a flow-control window may hold, per section 6.9.1.
pub const MAX_WINDOW_SIZE: i64 = (1 << 31) - 1;

/// One direction's worth of flow-control credit. Signed because a `SETTINGS_
/// INITIAL_WINDOW_SIZE` change can legally drive a stream's window negative;
/// it must drain back above zero via `WINDOW_UPDATE` before more `DATA` is sent.
#[derive(Debug, Clone, Copy)]
pub struct Window {
    available: i64,
}

impl Window {
    pub fn new(initial: u32) -> Self {
        Window { available: initial as i64 }
    }

    pub fn available(self) -> i64 {
        self.available
    }

    /// Applies a `WINDOW_UPDATE` increment. Overflow past [`MAX_WINDOW_SIZE`]
    /// is a flow-control error the caller must turn into a `RST_STREAM` or
    /// `GOAWAY` depending on scope.
    pub fn credit(&mut self, increment: u32) -> Result<()> {
        let next = self.available + increment as i64;
        if next > MAX_WINDOW_SIZE {
            return Err(Http2Error::FlowControlError { stream_id: 0 });
        }
        self.available = next;
        Ok(())
    }

    /// Reserves `n` octets of send credit, failing if insufficient.
    pub fn reserve(&mut self, n: u32) -> Result<()> {
        if (n as i64) > self.available {
            return Err(Http2Error::FlowControlError { stream_id: 0 });
        }
        self.available -= n as i64;
        Ok(())
    }

    /// Applies `SETTINGS_INITIAL_WINDOW_SIZE` renegotiation: every open
    /// stream's send window shifts by the delta between old and new value.
    pub fn apply_initial_window_delta(&mut self, delta: i64) -> Result<()> {
        let next = self.available + delta;
        if next > MAX_WINDOW_SIZE {
            return Err(Http2Error::FlowControlError { stream_id: 0 });
        }
        self.available = next;
        Ok(())
    }
}

/// The send and receive windows for one stream, or for the connection
/// overall when keyed by [`StreamId::CONNECTION`].
#[derive(Debug, Clone, Copy)]
pub struct StreamWindows {
    pub send: Window,
    pub recv: Window,
}

impl StreamWindows {
    pub fn new(initial_window_size: u32) -> Self {
        StreamWindows { send: Window::new(initial_window_size), recv: Window::new(initial_window_size) }
    }
}

/// Connection-level windows plus a per-stream table, with the minimum-of-two
/// gating `DATA` emission requires.
#[derive(Debug, Clone)]
pub struct FlowController {
    connection: StreamWindows,
    streams: std::collections::HashMap<StreamId, StreamWindows>,
    initial_window_size: u32,
}

impl FlowController {
    pub fn new(initial_window_size: u32) -> Self {
        FlowController {
            connection: StreamWindows::new(initial_window_size),
            streams: std::collections::HashMap::new(),
            initial_window_size,
        }
    }

    pub fn register_stream(&mut self, stream_id: StreamId) {
        self.streams.entry(stream_id).or_insert_with(|| StreamWindows::new(self.initial_window_size));
    }

    pub fn remove_stream(&mut self, stream_id: StreamId) {
        self.streams.remove(&stream_id);
    }

    /// The largest `DATA` payload currently sendable on `stream_id`: bounded
    /// by both that stream's send window and the connection's.
    pub fn sendable(&self, stream_id: StreamId) -> i64 {
        let stream_available = self.streams.get(&stream_id).map(|w| w.send.available()).unwrap_or(0);
        stream_available.min(self.connection.send.available()).max(0)
    }

    /// Reserves `n` octets of send credit against both the stream and the
    /// connection window. Fails atomically: neither window is debited if
    /// either lacks the credit.
    pub fn reserve_send(&mut self, stream_id: StreamId, n: u32) -> Result<()> {
        if self.sendable(stream_id) < n as i64 {
            return Err(Http2Error::FlowControlError { stream_id: stream_id.value() });
        }
        self.connection.send.reserve(n)?;
        if let Some(windows) = self.streams.get_mut(&stream_id) {
            windows.send.reserve(n)?;
        }
        Ok(())
    }

    /// Applies an incoming `WINDOW_UPDATE`, connection-level if `stream_id`
    /// is [`StreamId::CONNECTION`].
    pub fn apply_window_update(&mut self, stream_id: StreamId, increment: u32) -> Result<()> {
        if stream_id.is_connection() {
            self.connection
                .send
                .credit(increment)
                .map_err(|_| Http2Error::FlowControlError { stream_id: 0 })
        } else {
            let windows = self.streams.entry(stream_id).or_insert_with(|| StreamWindows::new(self.initial_window_size));
            windows
                .send
                .credit(increment)
                .map_err(|_| Http2Error::FlowControlError { stream_id: stream_id.value() })
        }
    }

    /// Debits the receive windows as local `DATA` bytes are consumed, ahead
    /// of the session emitting a `WINDOW_UPDATE` to replenish them.
    pub fn consume_recv(&mut self, stream_id: StreamId, n: u32) -> Result<()> {
        self.connection.recv.reserve(n)?;
        if let Some(windows) = self.streams.get_mut(&stream_id) {
            windows.recv.reserve(n)?;
        }
        Ok(())
    }

    /// Re-credits the receive windows, mirroring a `WINDOW_UPDATE` we send.
    pub fn replenish_recv(&mut self, stream_id: StreamId, n: u32) -> Result<()> {
        self.connection.recv.credit(n)?;
        if let Some(windows) = self.streams.get_mut(&stream_id) {
            windows.recv.credit(n)?;
        }
        Ok(())
    }

    /// Propagates a change in `SETTINGS_INITIAL_WINDOW_SIZE` to every
    /// currently open stream's send window, per section 6.9.2.
    pub fn apply_initial_window_size_change(&mut self, new_value: u32) -> Result<()> {
        let delta = new_value as i64 - self.initial_window_size as i64;
        for windows in self.streams.values_mut() {
            windows.send.apply_initial_window_delta(delta)?;
        }
        self.initial_window_size = new_value;
        Ok(())
    }
}
