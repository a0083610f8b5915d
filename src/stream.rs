//! The per-stream lifecycle state machine (section 5.1) and the sparse
//! registry that backs it. Streams are created lazily, on first reference
//! (either a locally-issued id or a `HEADERS`/`PUSH_PROMISE` from the peer) —
//! there is no pre-allocated slot table.

use std::collections::HashMap;

use crate::error::{Http2Error, Result};
use crate::frame::types::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

impl StreamState {
    /// Whether a stream in this state counts against `SETTINGS_MAX_CONCURRENT_STREAMS`.
    /// Reserved streams do not count until they open (section 5.1.2).
    pub fn counts_toward_concurrency_limit(self) -> bool {
        matches!(self, StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote)
    }
}

/// One stream's state plus the priority weight it was opened or
/// re-prioritized with.
#[derive(Debug, Clone, Copy)]
pub struct StreamEntry {
    pub state: StreamState,
    pub weight: u8,
    /// Whether an `RST_STREAM` has already been emitted for this stream, so
    /// the dispatcher never sends a second one (section 5.1, section 8
    /// invariant 2).
    pub rst_sent: bool,
}

/// Which side of the connection this engine is acting as, for parity checks
/// on locally-initiated stream ids (section 5.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn owns_parity(self, id: u32) -> bool {
        match self {
            Role::Client => id % 2 == 1,
            Role::Server => id % 2 == 0,
        }
    }
}

/// The sparse, lazily-populated table of every stream this connection has
/// ever referenced, plus the monotonic-id and concurrency bookkeeping
/// section 5.1.1 requires.
#[derive(Debug)]
pub struct StreamRegistry {
    role: Role,
    max_concurrent_streams: u32,
    streams: HashMap<StreamId, StreamEntry>,
    highest_local_id: u32,
    highest_remote_id: u32,
}

impl StreamRegistry {
    pub fn new(role: Role, max_concurrent_streams: u32) -> Self {
        StreamRegistry {
            role,
            max_concurrent_streams,
            streams: HashMap::new(),
            highest_local_id: 0,
            highest_remote_id: 0,
        }
    }

    pub fn get(&self, stream_id: StreamId) -> Option<&StreamEntry> {
        self.streams.get(&stream_id)
    }

    fn open_count(&self) -> u32 {
        self.streams.values().filter(|e| e.state.counts_toward_concurrency_limit()).count() as u32
    }

    /// Allocates the next stream id this role is allowed to initiate, and
    /// registers it as idle. Does not itself open the stream — sending
    /// `HEADERS` does that via [`StreamRegistry::transition`].
    pub fn allocate_local_id(&mut self) -> StreamId {
        let next = if self.highest_local_id == 0 {
            if self.role == Role::Client { 1 } else { 2 }
        } else {
            self.highest_local_id + 2
        };
        self.highest_local_id = next;
        let id = StreamId::new(next);
        self.streams.insert(id, StreamEntry { state: StreamState::Idle, weight: 0, rst_sent: false });
        id
    }

    /// Validates and applies the effect of sending or receiving `HEADERS`
    /// with no `END_STREAM`/`PRIORITY`-only semantics folded in — callers
    /// translate the concrete frame into one of these three transitions.
    ///
    /// `locally_initiated` distinguishes a `HEADERS` we're sending (the id
    /// was already allocated by [`StreamRegistry::allocate_local_id`], and
    /// carries our own parity by construction) from one the peer sent: a
    /// peer-initiated id must carry the *peer's* parity, never ours, or it's
    /// a connection `PROTOCOL_ERROR` (section 5.1.1, section 8 invariant 1).
    pub fn open(&mut self, stream_id: StreamId, weight: u8, locally_initiated: bool) -> Result<()> {
        if stream_id.is_connection() {
            return Err(Http2Error::ProtocolError("HEADERS on stream 0"));
        }
        if !locally_initiated {
            if self.owns(stream_id) {
                return Err(Http2Error::ProtocolError("inbound HEADERS stream id parity matches this role's own"));
            }
            self.check_monotonic(stream_id, false)?;
        }
        if self.open_count() >= self.max_concurrent_streams {
            return Err(Http2Error::TooManyConcurrentStreams { limit: self.max_concurrent_streams });
        }
        let entry = self.streams.entry(stream_id).or_insert(StreamEntry { state: StreamState::Idle, weight, rst_sent: false });
        match entry.state {
            StreamState::Idle => {
                entry.state = StreamState::Open;
                entry.weight = weight;
                Ok(())
            }
            _ => Err(Http2Error::StreamProtocolError { stream_id: stream_id.value(), reason: "HEADERS on non-idle stream" }),
        }
    }

    /// Reserves a stream for a `PUSH_PROMISE`, local or remote depending on
    /// which side sent the promise.
    pub fn reserve(&mut self, stream_id: StreamId, locally_initiated: bool) -> Result<()> {
        if self.streams.contains_key(&stream_id) {
            return Err(Http2Error::ProtocolError("PUSH_PROMISE on an already-reserved stream"));
        }
        if !locally_initiated && stream_id.value() > self.highest_remote_id {
            self.highest_remote_id = stream_id.value();
        }
        let state = if locally_initiated { StreamState::ReservedLocal } else { StreamState::ReservedRemote };
        self.streams.insert(stream_id, StreamEntry { state, weight: 0, rst_sent: false });
        Ok(())
    }

    /// Applies a half-close (an `END_STREAM` flag, locally sent or remotely
    /// received) and returns the resulting state.
    pub fn half_close(&mut self, stream_id: StreamId, locally: bool) -> Result<StreamState> {
        let entry = self.streams.get_mut(&stream_id).ok_or(Http2Error::StreamClosed(stream_id.value()))?;
        let next = match (entry.state, locally) {
            (StreamState::Open, true) => StreamState::HalfClosedLocal,
            (StreamState::Open, false) => StreamState::HalfClosedRemote,
            (StreamState::HalfClosedRemote, true) => StreamState::Closed,
            (StreamState::HalfClosedLocal, false) => StreamState::Closed,
            (StreamState::ReservedLocal, true) => StreamState::HalfClosedRemote,
            (StreamState::ReservedRemote, false) => StreamState::HalfClosedLocal,
            (_, _) => {
                return Err(Http2Error::StreamProtocolError {
                    stream_id: stream_id.value(),
                    reason: "END_STREAM in unexpected state",
                });
            }
        };
        entry.state = next;
        Ok(next)
    }

    /// Closes a stream outright, as `RST_STREAM` does from any state.
    pub fn reset(&mut self, stream_id: StreamId) {
        self.streams
            .entry(stream_id)
            .and_modify(|e| e.state = StreamState::Closed)
            .or_insert(StreamEntry { state: StreamState::Closed, weight: 0, rst_sent: false });
    }

    /// Drops a closed stream's bookkeeping entirely. Safe to call once both
    /// sides have finished referencing it (after the brief `RST_STREAM`/
    /// `WINDOW_UPDATE` grace window section 5.1 allows).
    pub fn forget(&mut self, stream_id: StreamId) {
        self.streams.remove(&stream_id);
    }

    /// Materializes stream 1 as already half-closed, for the HTTP/1.1
    /// upgrade hand-off (section 6): the initial request was already carried
    /// in full over HTTP/1.1 before this connection's preface, so there is
    /// nothing left to send (client) or receive (server) on it. Advances the
    /// relevant id counter so subsequent id allocation/validation picks up
    /// from 1 rather than colliding with it.
    pub fn materialize_upgrade_stream(&mut self, weight: u8) -> StreamId {
        let id = StreamId::new(1);
        let state = if self.role == Role::Client { StreamState::HalfClosedLocal } else { StreamState::HalfClosedRemote };
        self.streams.insert(id, StreamEntry { state, weight, rst_sent: false });
        match self.role {
            Role::Client => self.highest_local_id = 1,
            Role::Server => self.highest_remote_id = 1,
        }
        id
    }

    /// The highest-numbered stream id the peer has initiated (or, on the
    /// client role, been promised via `PUSH_PROMISE`), for the `last_stream_id`
    /// a `GOAWAY` frame reports (section 4.F — 0 if none has ever arrived).
    pub fn highest_peer_stream_id(&self) -> u32 {
        self.highest_remote_id
    }

    pub fn is_closed(&self, stream_id: StreamId) -> bool {
        matches!(self.streams.get(&stream_id), Some(entry) if entry.state == StreamState::Closed)
    }

    /// Records that an `RST_STREAM` has been, or is about to be, emitted for
    /// `stream_id`, synthesizing a closed entry if none exists yet rather
    /// than assuming the caller already holds one. Returns `true` if an
    /// `RST_STREAM` was already sent for this stream previously, in which
    /// case the caller MUST NOT send another (section 8 invariant 2).
    pub fn mark_rst_sent(&mut self, stream_id: StreamId) -> bool {
        let entry = self
            .streams
            .entry(stream_id)
            .or_insert(StreamEntry { state: StreamState::Closed, weight: 0, rst_sent: false });
        let already_sent = entry.rst_sent;
        entry.rst_sent = true;
        already_sent
    }

    fn owns(&self, stream_id: StreamId) -> bool {
        self.role.owns_parity(stream_id.value())
    }

    fn check_monotonic(&mut self, stream_id: StreamId, locally_initiated: bool) -> Result<()> {
        let id = stream_id.value();
        if locally_initiated {
            if id <= self.highest_local_id {
                return Err(Http2Error::ProtocolError("stream id reused"));
            }
            self.highest_local_id = id;
        } else if id <= self.highest_remote_id {
            return Err(Http2Error::ProtocolError("stream id not monotonically increasing"));
        } else {
            self.highest_remote_id = id;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_allocates_odd_ids() {
        let mut reg = StreamRegistry::new(Role::Client, 100);
        let first = reg.allocate_local_id();
        let second = reg.allocate_local_id();
        assert_eq!(first.value(), 1);
        assert_eq!(second.value(), 3);
    }

    #[test]
    fn server_allocates_even_ids() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let first = reg.allocate_local_id();
        assert_eq!(first.value(), 2);
    }

    #[test]
    fn headers_opens_idle_stream() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let id = StreamId::new(1);
        reg.open(id, 16, false).unwrap();
        assert_eq!(reg.get(id).unwrap().state, StreamState::Open);
    }

    #[test]
    fn headers_on_already_open_stream_is_rejected() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let id = StreamId::new(1);
        reg.open(id, 16, false).unwrap();
        assert!(reg.open(id, 16, false).is_err());
    }

    #[test]
    fn concurrency_limit_is_enforced() {
        let mut reg = StreamRegistry::new(Role::Server, 1);
        reg.open(StreamId::new(1), 16, false).unwrap();
        let err = reg.open(StreamId::new(3), 16, false).unwrap_err();
        assert!(matches!(err, Http2Error::TooManyConcurrentStreams { limit: 1 }));
    }

    #[test]
    fn mutual_half_close_reaches_closed() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let id = StreamId::new(1);
        reg.open(id, 16, false).unwrap();
        let after_local = reg.half_close(id, true).unwrap();
        assert_eq!(after_local, StreamState::HalfClosedLocal);
        let after_remote = reg.half_close(id, false).unwrap();
        assert_eq!(after_remote, StreamState::Closed);
    }

    #[test]
    fn reset_closes_from_any_state() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let id = StreamId::new(1);
        reg.open(id, 16, false).unwrap();
        reg.reset(id);
        assert_eq!(reg.get(id).unwrap().state, StreamState::Closed);
    }

    #[test]
    fn push_promise_reserves_stream_once() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let id = StreamId::new(2);
        reg.reserve(id, true).unwrap();
        assert_eq!(reg.get(id).unwrap().state, StreamState::ReservedLocal);
        assert!(reg.reserve(id, true).is_err());
    }

    #[test]
    fn upgrade_stream_leaves_client_id_allocator_at_three() {
        let mut reg = StreamRegistry::new(Role::Client, 100);
        let upgraded = reg.materialize_upgrade_stream(16);
        assert_eq!(upgraded.value(), 1);
        assert_eq!(reg.get(upgraded).unwrap().state, StreamState::HalfClosedLocal);
        assert_eq!(reg.allocate_local_id().value(), 3);
    }

    #[test]
    fn upgrade_stream_is_half_closed_remote_for_server() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let upgraded = reg.materialize_upgrade_stream(16);
        assert_eq!(reg.get(upgraded).unwrap().state, StreamState::HalfClosedRemote);
    }

    #[test]
    fn highest_peer_stream_id_tracks_inbound_opens_and_reservations() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        assert_eq!(reg.highest_peer_stream_id(), 0);
        reg.open(StreamId::new(1), 16, false).unwrap();
        assert_eq!(reg.highest_peer_stream_id(), 1);
        reg.open(StreamId::new(3), 16, false).unwrap();
        assert_eq!(reg.highest_peer_stream_id(), 3);
    }

    #[test]
    fn inbound_headers_with_wrong_parity_is_a_protocol_error() {
        // A server's own ids are even; a client-initiated (inbound) HEADERS
        // must carry an odd id. An even inbound id must be rejected rather
        // than silently treated as if this side had opened it locally.
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let err = reg.open(StreamId::new(2), 16, false).unwrap_err();
        assert!(matches!(err, Http2Error::ProtocolError(_)));
    }

    #[test]
    fn rst_stream_is_recorded_only_once() {
        let mut reg = StreamRegistry::new(Role::Server, 100);
        let id = StreamId::new(1);
        assert!(!reg.mark_rst_sent(id));
        assert!(reg.mark_rst_sent(id));
        assert!(reg.is_closed(id));
    }
}
