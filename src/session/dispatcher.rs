//! The read pump: the one thread that ever calls into the transport's read
//! half. It decodes frames, validates and applies them against the shared
//! connection state, and queues any reply frame for the write pump — it
//! never writes to the transport itself.

use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Http2Error;
use crate::events::Event;
use crate::flow::MAX_WINDOW_SIZE;
use crate::frame::codec::decode_next;
use crate::frame::flags::{
    ContinuationFlags, DataFlags, HeadersFlags, PingFlags, PushPromiseFlags, SettingsFlags,
};
use crate::frame::types::{
    ErrorCode, Frame, SettingsParameter, StreamId, SETTINGS_HEADER_TABLE_SIZE,
    SETTINGS_INITIAL_WINDOW_SIZE,
};
use crate::headers::{BlockKind, HeaderCodec};
use crate::queue::{Outgoing, QueueSender};
use crate::stream::Role;

use super::state::ConnectionState;

/// Runs until the transport closes, a connection-fatal error is decoded, or
/// the session is shut down locally. A peer `GOAWAY` does not stop this loop
/// by itself — in-flight streams may still have frames in either direction
/// until the peer actually closes its write half.
pub fn run<R, C>(mut reader: R, state: Arc<ConnectionState<C>>, sender: QueueSender)
where
    R: Read,
    C: HeaderCodec,
{
    loop {
        if state.is_closed() {
            break;
        }
        match decode_next(&mut reader, state.config.max_frame_size) {
            Ok(frame) => {
                if let Err(err) = handle_frame(frame, &state, &sender) {
                    if err.is_connection_fatal() {
                        emit_connection_error(err, &state, &sender);
                        break;
                    }
                    emit_stream_error(err, &state, &sender);
                }
            }
            Err(Http2Error::Truncated) => break,
            Err(err) => {
                emit_connection_error(err, &state, &sender);
                break;
            }
        }
    }
    state.mark_closed();
}

/// A connection error ends the session: reply with `GOAWAY` (section 7) and
/// let the caller break the read loop.
fn emit_connection_error<C: HeaderCodec>(err: Http2Error, state: &Arc<ConnectionState<C>>, sender: &QueueSender) {
    let code = err.error_code();
    log::warn!("connection error, sending GOAWAY: {}", err);
    let mut shared = state.shared.lock();
    let last_stream_id = StreamId::new(shared.streams.highest_peer_stream_id());
    shared.goaway_sent = true;
    drop(shared);
    sender.push(Outgoing::Immediate(Frame::go_away(last_stream_id, code, Bytes::new())));
}

/// A stream error terminates only the offending stream: reply with at most
/// one `RST_STREAM` (section 7, section 8 invariant 2) and keep the read
/// loop running.
fn emit_stream_error<C: HeaderCodec>(err: Http2Error, state: &Arc<ConnectionState<C>>, sender: &QueueSender) {
    log::debug!("stream error: {}", err);
    if let Some(id) = err.stream_id() {
        let stream_id = StreamId::new(id);
        let already_sent = state.shared.lock().streams.mark_rst_sent(stream_id);
        if !already_sent {
            sender.push(Outgoing::Immediate(Frame::rst_stream(stream_id, err.error_code())));
        }
    }
}

/// Frame types that are legal on a stream regardless of its lifecycle state
/// (`PRIORITY`) or that are never subject to the "closed stream" gate
/// because they carry their own reset semantics (`RST_STREAM`) or operate at
/// the connection level.
fn bypasses_closed_stream_gate(frame: &Frame) -> bool {
    matches!(
        frame,
        Frame::Priority { .. }
            | Frame::RstStream { .. }
            | Frame::Settings { .. }
            | Frame::Ping { .. }
            | Frame::GoAway { .. }
            | Frame::Unknown { .. }
    )
}

fn handle_frame<C: HeaderCodec>(
    frame: Frame,
    state: &Arc<ConnectionState<C>>,
    sender: &QueueSender,
) -> crate::error::Result<()> {
    let stream_id = frame.stream_id();
    state.events.publish(Event::FrameReceived { stream_id, frame_type: frame_type_name(&frame) });

    // Section 3.5 / section 4.F: on a secure connection, nothing but SETTINGS
    // may arrive before the peer's first SETTINGS frame.
    if state.config.secure && !matches!(frame, Frame::Settings { .. }) && !state.shared.lock().settings_received {
        return Err(Http2Error::ProtocolError("frame received before peer SETTINGS"));
    }

    // Section 6.10: while a header block is open, the only legal next frame
    // is a CONTINUATION for that same stream — this is a connection-wide
    // rule, not a per-stream one.
    if let Some(blocked) = state.shared.lock().headers.blocked_stream() {
        let is_continuation_for_blocked =
            matches!(&frame, Frame::Continuation { stream_id, .. } if *stream_id == blocked);
        if !is_continuation_for_blocked {
            return Err(Http2Error::ProtocolError("frame interleaved with an open header block"));
        }
    }

    // Section 5.1: once a stream is closed, every frame but PRIORITY is a
    // stream error, answered with at most one RST_STREAM.
    if !stream_id.is_connection() && !bypasses_closed_stream_gate(&frame) {
        let mut shared = state.shared.lock();
        if shared.streams.is_closed(stream_id) {
            let already_sent = shared.streams.mark_rst_sent(stream_id);
            drop(shared);
            if !already_sent {
                sender.push(Outgoing::Immediate(Frame::rst_stream(stream_id, ErrorCode::STREAM_CLOSED)));
            }
            return Ok(());
        }
    }

    match frame {
        Frame::Settings { flags, payload } => handle_settings(flags, payload, state, sender),
        Frame::Ping { flags, payload } => handle_ping(flags, payload, state, sender),
        Frame::WindowUpdate { stream_id, payload, .. } => {
            // Section 4.C: a zero increment is a protocol error, scoped to the
            // stream for a stream-level frame and to the connection for a
            // connection-level one (stream 0).
            if payload.window_size_increment == 0 {
                return Err(if stream_id.is_connection() {
                    Http2Error::ProtocolError("WINDOW_UPDATE with zero increment on connection")
                } else {
                    Http2Error::StreamProtocolError {
                        stream_id: stream_id.value(),
                        reason: "WINDOW_UPDATE with zero increment",
                    }
                });
            }
            state.shared.lock().flow.apply_window_update(stream_id, payload.window_size_increment)?;
            // The write pump may be parked in `recv()` with deferred DATA
            // that this credit now covers; nudge it without enqueueing a frame.
            sender.push(Outgoing::Wake);
            Ok(())
        }
        Frame::Headers { stream_id, flags, payload } => {
            let mut shared = state.shared.lock();
            let assembled =
                shared.headers.begin(stream_id, BlockKind::Headers, payload.header_block_fragment, flags.contains(HeadersFlags::END_HEADERS))?;
            shared.streams.open(stream_id, state.config.default_stream_priority, false)?;
            shared.flow.register_stream(stream_id);
            if let Some(block) = assembled {
                shared.headers.decode(&block)?;
            }
            let end_stream = flags.contains(HeadersFlags::END_STREAM);
            if end_stream {
                shared.streams.half_close(stream_id, false)?;
                shared.promised.remove(&stream_id);
            }
            Ok(())
        }
        Frame::Continuation { stream_id, flags, payload } => {
            let mut shared = state.shared.lock();
            let assembled = shared.headers.append(stream_id, payload.header_block_fragment, flags.contains(ContinuationFlags::END_HEADERS))?;
            if let Some((kind, block)) = assembled {
                apply_assembled_block(kind, &block, &mut shared)?;
            }
            Ok(())
        }
        Frame::Data { stream_id, flags, payload } => {
            let mut shared = state.shared.lock();
            let consumed = payload.data.len() as u32 + payload.pad_length.unwrap_or(0) as u32;
            shared.flow.consume_recv(stream_id, consumed)?;
            if flags.contains(DataFlags::END_STREAM) {
                shared.streams.half_close(stream_id, false)?;
                shared.promised.remove(&stream_id);
            }
            if consumed > 0 {
                // `consume_recv` above already debited both the stream and the
                // connection window in one call; `replenish_recv` mirrors that
                // and re-credits both, matching the pair of `WINDOW_UPDATE`s below.
                shared.flow.replenish_recv(stream_id, consumed)?;
            }
            drop(shared);
            if consumed > 0 {
                sender.push(Outgoing::Immediate(Frame::window_update(stream_id, consumed)));
                sender.push(Outgoing::Immediate(Frame::window_update(StreamId::CONNECTION, consumed)));
            }
            Ok(())
        }
        Frame::RstStream { stream_id, .. } => {
            let mut shared = state.shared.lock();
            shared.streams.reset(stream_id);
            shared.promised.remove(&stream_id);
            Ok(())
        }
        Frame::PushPromise { stream_id, flags, payload } => {
            if state.role != Role::Client {
                return Err(Http2Error::ProtocolError("PUSH_PROMISE received by a server"));
            }
            if !state.config.push_enabled {
                return Err(Http2Error::ProtocolError("PUSH_PROMISE received with push disabled"));
            }
            let promised_id = payload.promised_stream_id;
            let mut shared = state.shared.lock();
            shared.streams.reserve(promised_id, false)?;
            // Sequenced under `stream_id`, the stream the promise is
            // associated with — any trailing CONTINUATION carries that id in
            // its frame header, not the promised id riding in the payload.
            let assembled = shared.headers.begin(
                stream_id,
                BlockKind::PushPromise(promised_id),
                payload.header_block_fragment,
                flags.contains(PushPromiseFlags::END_HEADERS),
            )?;
            if let Some(block) = assembled {
                apply_assembled_block(BlockKind::PushPromise(promised_id), &block, &mut shared)?;
            }
            Ok(())
        }
        Frame::Priority { .. } => Ok(()),
        Frame::GoAway { payload, .. } => {
            log::info!("peer sent GOAWAY: last_stream_id={} error={:?}", payload.last_stream_id, payload.error_code);
            state.shared.lock().goaway_received = true;
            Ok(())
        }
        Frame::Unknown { .. } => Ok(()),
    }
}

/// Applies a just-completed header block: attaches decoded fields to the
/// stream for a regular request/response, or records the promised path for
/// a `PUSH_PROMISE` (section 3's promised-resource map, section 4.F).
fn apply_assembled_block<C: HeaderCodec>(
    kind: BlockKind,
    block: &[u8],
    shared: &mut super::state::SharedState<C>,
) -> crate::error::Result<()> {
    let fields = shared.headers.decode(block)?;
    match kind {
        BlockKind::Headers => Ok(()),
        BlockKind::PushPromise(promised_id) => {
            if let Some((_, path)) = fields.iter().find(|(name, _)| name.as_slice() == b":path") {
                shared.promised.insert(promised_id, String::from_utf8_lossy(path).into_owned());
            }
            Ok(())
        }
    }
}

fn handle_settings<C: HeaderCodec>(
    flags: SettingsFlags,
    payload: crate::frame::types::SettingsPayload,
    state: &Arc<ConnectionState<C>>,
    sender: &QueueSender,
) -> crate::error::Result<()> {
    if flags.contains(SettingsFlags::ACK) {
        state.note_settings_ack_received();
        return Ok(());
    }
    let mut shared = state.shared.lock();
    shared.settings_received = true;
    for SettingsParameter { identifier, value } in &payload.parameters {
        match *identifier {
            id if id == SETTINGS_INITIAL_WINDOW_SIZE => {
                if *value as u64 > MAX_WINDOW_SIZE as u64 {
                    return Err(Http2Error::FlowControlError { stream_id: 0 });
                }
                shared.flow.apply_initial_window_size_change(*value)?;
            }
            id if id == SETTINGS_HEADER_TABLE_SIZE => {
                shared.headers.set_max_dynamic_table_size(*value as usize);
            }
            _ => {}
        }
    }
    drop(shared);
    sender.push(Outgoing::Immediate(Frame::settings_ack()));
    Ok(())
}

fn handle_ping<C: HeaderCodec>(
    flags: PingFlags,
    payload: crate::frame::types::PingPayload,
    state: &Arc<ConnectionState<C>>,
    sender: &QueueSender,
) -> crate::error::Result<()> {
    if flags.contains(PingFlags::ACK) {
        state.note_ping_ack_received(payload.opaque_data);
        return Ok(());
    }
    sender.push(Outgoing::Immediate(Frame::ping(payload.opaque_data, true)));
    Ok(())
}

fn frame_type_name(frame: &Frame) -> &'static str {
    match frame {
        Frame::Data { .. } => "DATA",
        Frame::Headers { .. } => "HEADERS",
        Frame::Priority { .. } => "PRIORITY",
        Frame::RstStream { .. } => "RST_STREAM",
        Frame::Settings { .. } => "SETTINGS",
        Frame::PushPromise { .. } => "PUSH_PROMISE",
        Frame::Ping { .. } => "PING",
        Frame::GoAway { .. } => "GOAWAY",
        Frame::WindowUpdate { .. } => "WINDOW_UPDATE",
        Frame::Continuation { .. } => "CONTINUATION",
        Frame::Unknown { .. } => "UNKNOWN",
    }
}
