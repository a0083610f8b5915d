//! Session construction and the embedder-facing API: the frame pump and
//! dispatcher described by the framing layer, wired to a concrete transport.

mod dispatcher;
mod state;
mod writer;

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::SessionConfig;
use crate::error::{Http2Error, Result};
use crate::events::{Event, Subscriber, SubscriptionId};
use crate::frame::types::{
    ErrorCode, Frame, SettingsParameter, StreamId, SETTINGS_INITIAL_WINDOW_SIZE,
    SETTINGS_MAX_CONCURRENT_STREAMS, SETTINGS_MAX_FRAME_SIZE,
};
use crate::headers::{HeaderCodec, HeaderField, HpackCodec};
use crate::preface::{is_valid_preface, CONNECTION_PREFACE};
use crate::queue::{Outgoing, OutgoingQueue, QueueSender};
use crate::stream::Role;

use state::ConnectionState;

/// A live HTTP/2 connection: two pump threads (read and write) plus the
/// shared state and outgoing queue they coordinate through. Dropping a
/// `Session` does not block on the pumps — call [`Session::shutdown`] first
/// if an orderly `GOAWAY` handshake matters.
pub struct Session<C: HeaderCodec = HpackCodec> {
    state: Arc<ConnectionState<C>>,
    queue: Arc<OutgoingQueue>,
    sender: QueueSender,
    read_handle: Option<JoinHandle<()>>,
    write_handle: Option<JoinHandle<()>>,
}

impl Session<HpackCodec> {
    /// Builds a session with the default HPACK-backed header codec.
    pub fn new<R, W>(reader: R, writer: W, role: Role, config: SessionConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Session::with_codec(reader, writer, role, config, HpackCodec::new(), None)
    }

    /// Builds a session that hands off from an HTTP/1.1 upgrade: `upgrade_request`
    /// is the already-decoded pseudo-header list of the request that was sent
    /// (client) or received (server) over HTTP/1.1 before this connection's
    /// preface. Only meaningful when `config.secure` is `false`.
    pub fn new_with_upgrade<R, W>(
        reader: R,
        writer: W,
        role: Role,
        config: SessionConfig,
        upgrade_request: Vec<HeaderField>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        Session::with_codec(reader, writer, role, config, HpackCodec::new(), Some(upgrade_request))
    }
}

impl<C: HeaderCodec + 'static> Session<C> {
    /// Builds a session with a caller-supplied header codec. Performs the
    /// connection preface handshake synchronously before spawning the pumps:
    /// a client writes the preface immediately, a server reads and validates
    /// it before trusting anything else on the wire. `upgrade_request`, when
    /// given, materializes stream 1 as the already-in-flight HTTP/1.1 request
    /// (section 6's upgrade hand-off) before anything else is sent.
    pub fn with_codec<R, W>(
        mut reader: R,
        mut writer: W,
        role: Role,
        config: SessionConfig,
        codec: C,
        upgrade_request: Option<Vec<HeaderField>>,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        match role {
            Role::Client => {
                writer.write_all(CONNECTION_PREFACE).map_err(Http2Error::Io)?;
            }
            Role::Server => {
                let mut buf = [0u8; 24];
                reader.read_exact(&mut buf).map_err(|_| Http2Error::ProtocolError("missing connection preface"))?;
                if !is_valid_preface(&buf) {
                    return Err(Http2Error::ProtocolError("invalid connection preface"));
                }
            }
        }

        let state = Arc::new(ConnectionState::new(config, role, codec));
        let (queue, sender) = OutgoingQueue::new();
        let queue = Arc::new(queue);

        if !config.secure {
            // The pseudo-headers themselves were already carried over HTTP/1.1
            // and aren't re-encoded onto this connection; their only remaining
            // relevance here is the `:path` default noted in section 6, which
            // is an HTTP-semantics concern this engine doesn't interpret (see
            // the header-compression collaborator boundary).
            if upgrade_request.is_some() {
                let mut shared = state.shared.lock();
                let stream_id = shared.streams.materialize_upgrade_stream(config.default_stream_priority);
                shared.flow.register_stream(stream_id);
                drop(shared);
                match role {
                    Role::Client => state.events.publish(Event::RequestSent { stream_id }),
                    Role::Server => {
                        state.events.publish(Event::FrameReceived { stream_id, frame_type: "HEADERS" })
                    }
                }
            }
        }

        let initial_settings = Frame::settings(vec![
            SettingsParameter { identifier: SETTINGS_MAX_FRAME_SIZE, value: config.max_frame_size },
            SettingsParameter { identifier: SETTINGS_INITIAL_WINDOW_SIZE, value: config.initial_window_size },
            SettingsParameter {
                identifier: SETTINGS_MAX_CONCURRENT_STREAMS,
                value: config.max_concurrent_streams,
            },
        ]);
        state.shared.lock().settings_ack_pending = true;
        sender.push(Outgoing::Immediate(initial_settings));
        state.events.publish(Event::SettingsSent);

        let write_handle = {
            let state = state.clone();
            let queue = queue.clone();
            thread::spawn(move || writer::run(writer, state, queue))
        };
        let read_handle = {
            let state = state.clone();
            let sender = sender.clone();
            thread::spawn(move || dispatcher::run(reader, state, sender))
        };

        Ok(Session {
            state,
            queue,
            sender,
            read_handle: Some(read_handle),
            write_handle: Some(write_handle),
        })
    }

    /// Registers a subscriber for every [`Event`] this session emits. The
    /// returned [`SubscriptionId`] can later be passed to
    /// [`Session::unsubscribe`].
    pub fn subscribe(&self, subscriber: impl Subscriber + 'static) -> SubscriptionId {
        self.state.events.subscribe(Box::new(subscriber))
    }

    /// Removes a previously registered subscriber. Returns `false` if it was
    /// already removed, or never existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.state.events.unsubscribe(id)
    }

    /// Allocates a new locally-initiated stream and queues its `HEADERS`
    /// frame. `headers` is encoded with the connection's shared HPACK
    /// encoder state, so calls from multiple embedder threads must not race —
    /// callers are expected to serialize their own `send_request` calls.
    /// `priority` is the stream's initial weight (section 3's `0..MaxPriority`
    /// range; pass `None` to take the configured default).
    pub fn send_request(&self, headers: &[HeaderField], priority: Option<u8>, end_stream: bool) -> Result<StreamId> {
        if self.state.is_closed() {
            return Err(Http2Error::SessionClosed);
        }
        let weight = priority.unwrap_or(self.state.config.default_stream_priority);
        if weight > self.state.config.max_priority {
            return Err(Http2Error::InvalidArgument("priority exceeds MaxPriority"));
        }
        let path = headers.iter().find(|(name, _)| name.as_slice() == b":path").map(|(_, v)| v.clone());

        let mut shared = self.state.shared.lock();
        if shared.goaway_received {
            return Err(Http2Error::SessionClosed);
        }
        if let Some(path) = &path {
            let requested = String::from_utf8_lossy(path);
            if shared.promised.values().any(|promised| promised == requested.as_ref()) {
                return Err(Http2Error::ResourcePromised(requested.into_owned()));
            }
        }
        let stream_id = shared.streams.allocate_local_id();
        shared.streams.open(stream_id, weight, true)?;
        shared.flow.register_stream(stream_id);
        let encoded = shared.headers.encode(headers);
        if end_stream {
            shared.streams.half_close(stream_id, true)?;
        }
        drop(shared);

        let frame = Frame::headers(stream_id, Bytes::from(encoded), end_stream, true);
        self.sender.push(Outgoing::Immediate(frame));
        self.state.events.publish(Event::RequestSent { stream_id });
        Ok(stream_id)
    }

    /// Queues a `DATA` frame. Subject to flow control: the write pump defers
    /// it rather than sending it if the stream or connection window lacks
    /// credit, and retries automatically as `WINDOW_UPDATE`s arrive.
    pub fn send_data(&self, stream_id: StreamId, data: Bytes, end_stream: bool) -> Result<()> {
        if self.state.is_closed() {
            return Err(Http2Error::SessionClosed);
        }
        if end_stream {
            self.state.shared.lock().streams.half_close(stream_id, true)?;
        }
        self.sender.push(Outgoing::Data(Frame::data(stream_id, data, end_stream)));
        Ok(())
    }

    /// Sends a `PING` and blocks the calling thread until the ack arrives or
    /// the configured timeout elapses, returning the measured round-trip
    /// time. Per section 5, a timed-out `PING` disposes the session (no
    /// `GOAWAY` is specified for this case, unlike the `SETTINGS` timeout).
    pub fn ping(&self, opaque_data: u64) -> Result<Duration> {
        let sent_at = Instant::now();
        self.state.shared.lock().ping_ack_pending = Some(opaque_data);
        self.sender.push(Outgoing::Immediate(Frame::ping(opaque_data, false)));
        if self.state.wait_ping_ack(opaque_data, self.state.config.ping_ack_timeout) {
            Ok(sent_at.elapsed())
        } else {
            self.state.mark_closed();
            Err(Http2Error::PingTimeout)
        }
    }

    /// Blocks until the locally-sent `SETTINGS` frame from session
    /// construction is acked, or the configured timeout elapses. A timeout
    /// writes `GOAWAY(SETTINGS_TIMEOUT)` and disposes the session (section 5).
    pub fn wait_settings_ack(&self) -> Result<()> {
        if self.state.wait_settings_ack(self.state.config.settings_ack_timeout) {
            Ok(())
        } else {
            self.shutdown(ErrorCode::SETTINGS_TIMEOUT, self.state.config.ping_ack_timeout);
            Err(Http2Error::SettingsTimeout)
        }
    }

    /// Writes a `SETTINGS` frame carrying `pairs`. `is_ack` true sends a bare
    /// acknowledgement (the embedder-facing mirror of what the dispatcher
    /// does automatically on receipt of a peer `SETTINGS`); `is_ack` false
    /// sends a parameter update and blocks the calling thread up to the
    /// configured timeout for the peer's ack, per section 5's "`WriteSettings`
    /// blocks up to 60s for a `SETTINGS` ack" — a timeout writes
    /// `GOAWAY(SETTINGS_TIMEOUT)` and disposes the session just as the initial
    /// handshake's `wait_settings_ack` does.
    pub fn write_settings(&self, pairs: Vec<SettingsParameter>, is_ack: bool) -> Result<()> {
        if is_ack {
            self.sender.push(Outgoing::Immediate(Frame::settings_ack()));
            return Ok(());
        }
        self.state.shared.lock().settings_ack_pending = true;
        self.sender.push(Outgoing::Immediate(Frame::settings(pairs)));
        self.state.events.publish(Event::SettingsSent);
        if self.state.wait_settings_ack(self.state.config.settings_ack_timeout) {
            Ok(())
        } else {
            self.shutdown(ErrorCode::SETTINGS_TIMEOUT, self.state.config.ping_ack_timeout);
            Err(Http2Error::SettingsTimeout)
        }
    }

    /// Sends an unsolicited `WINDOW_UPDATE` against the connection window,
    /// e.g. after an embedder frees buffered `DATA` outside the normal
    /// per-frame credit-back path.
    pub fn write_connection_window_update(&self, increment: u32) -> Result<()> {
        self.state.shared.lock().flow.replenish_recv(StreamId::CONNECTION, increment)?;
        self.sender.push(Outgoing::Immediate(Frame::window_update(StreamId::CONNECTION, increment)));
        Ok(())
    }

    /// Writes a `GOAWAY(code)` frame without tearing down the session: the
    /// embedder-facing half of section 6's `write_goaway`, distinct from
    /// [`Session::shutdown`] which additionally drains the queue and marks
    /// the session disposed. Useful for announcing an impending shutdown
    /// (e.g. a graceful drain window) before actually disposing.
    pub fn write_goaway(&self, error_code: ErrorCode) {
        let mut shared = self.state.shared.lock();
        let last_stream_id = StreamId::new(shared.streams.highest_peer_stream_id());
        shared.goaway_sent = true;
        drop(shared);
        self.sender.push(Outgoing::Immediate(Frame::go_away(last_stream_id, error_code, Bytes::new())));
    }

    /// Begins an orderly shutdown: sends `GOAWAY`, waits up to `drain_timeout`
    /// for the write pump to finish anything already queued, then marks the
    /// session closed so both pumps exit on their next loop iteration.
    /// Idempotent: a second call after the session is already closed is a
    /// no-op, rather than queuing a redundant `GOAWAY` (§8 invariant 8).
    pub fn shutdown(&self, error_code: ErrorCode, drain_timeout: Duration) {
        if self.state.is_closed() {
            return;
        }
        self.write_goaway(error_code);
        self.queue.wait_drained(drain_timeout);
        self.state.mark_closed();
    }
}

impl<C: HeaderCodec> Drop for Session<C> {
    /// Marks the shared state closed so each pump exits on its next loop
    /// iteration, but does not join them: a pump blocked in a transport read
    /// only wakes once the transport itself closes, which is the caller's
    /// responsibility (closing the socket) after [`Session::shutdown`].
    fn drop(&mut self) {
        self.state.mark_closed();
    }
}
