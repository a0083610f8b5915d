//! The write pump: the one thread that ever calls into the transport's write
//! half. It drains the outgoing queue, re-checking flow control on `DATA`
//! frames immediately before each send (credit may have changed since the
//! frame was queued), and retries deferred `DATA` whenever a `WINDOW_UPDATE`
//! frees room.

use std::io::Write;
use std::sync::Arc;

use crate::frame::codec::write_frame;
use crate::frame::flags::DataFlags;
use crate::frame::types::{Frame, StreamId};
use crate::headers::HeaderCodec;
use crate::queue::{DeferredData, Outgoing, OutgoingQueue};

use super::state::ConnectionState;

pub fn run<W, C>(mut writer: W, state: Arc<ConnectionState<C>>, queue: Arc<OutgoingQueue>)
where
    W: Write,
    C: HeaderCodec,
{
    let mut deferred = DeferredData::new();

    loop {
        if !retry_deferred(&mut writer, &state, &mut deferred) {
            break;
        }

        let item = match queue.recv() {
            Some(item) => item,
            None => break,
        };
        queue.mark_in_flight();

        let ok = match item {
            Outgoing::Immediate(frame) => send(&mut writer, &frame),
            Outgoing::Data(frame) => match send_if_creditable(&mut writer, &state, frame) {
                CreditResult::Sent => true,
                CreditResult::Failed => false,
                CreditResult::Deferred(remainder) => {
                    deferred.push_back(remainder);
                    true
                }
            },
            // No transport write of its own; just loops back to retry_deferred.
            Outgoing::Wake => true,
        };
        queue.mark_sent();
        if !ok {
            break;
        }
    }
    state.mark_closed();
}

/// Retries every deferred `DATA` frame that now has credit. Returns `false`
/// if a write failed and the pump should stop.
fn retry_deferred<W: Write, C: HeaderCodec>(writer: &mut W, state: &Arc<ConnectionState<C>>, deferred: &mut DeferredData) -> bool {
    while let Some(frame) = deferred.pop_front() {
        match send_if_creditable(writer, state, frame) {
            CreditResult::Sent => {}
            CreditResult::Failed => return false,
            CreditResult::Deferred(remainder) => {
                deferred.push_back(remainder);
                break;
            }
        }
    }
    true
}

enum CreditResult {
    Sent,
    Failed,
    Deferred(Frame),
}

/// Attempts to send a flow-controlled `DATA` frame, reserving whatever
/// credit is currently available against both the stream and connection
/// windows. A frame that doesn't fully fit is split: the portion that fits
/// goes out now (never carrying `END_STREAM`, since more of the payload is
/// still pending), and the remainder — carrying the original `END_STREAM`
/// flag — comes back as [`CreditResult::Deferred`] for the next retry, so a
/// single oversized write doesn't stall behind the full payload's credit.
fn send_if_creditable<W: Write, C: HeaderCodec>(writer: &mut W, state: &Arc<ConnectionState<C>>, frame: Frame) -> CreditResult {
    let (stream_id, len, end_stream) = match &frame {
        Frame::Data { stream_id, payload, flags } => {
            (*stream_id, payload.data.len() as u32, flags.contains(DataFlags::END_STREAM))
        }
        _ => (StreamId::CONNECTION, 0, false),
    };

    let mut shared = state.shared.lock();
    let available = shared.flow.sendable(stream_id).max(0) as u32;
    if available == 0 && len > 0 {
        drop(shared);
        return CreditResult::Deferred(frame);
    }
    let to_send = available.min(len);
    if shared.flow.reserve_send(stream_id, to_send).is_err() {
        drop(shared);
        return CreditResult::Deferred(frame);
    }
    drop(shared);

    if to_send == len {
        return if send(writer, &frame) { CreditResult::Sent } else { CreditResult::Failed };
    }

    let Frame::Data { stream_id, mut payload, .. } = frame else {
        unreachable!("non-DATA frames always have len == 0 and take the to_send == len branch above")
    };
    let chunk = payload.data.split_to(to_send as usize);
    let sent_frame = Frame::data(stream_id, chunk, false);
    if !send(writer, &sent_frame) {
        return CreditResult::Failed;
    }
    CreditResult::Deferred(Frame::data(stream_id, payload.data, end_stream))
}

fn send<W: Write>(writer: &mut W, frame: &Frame) -> bool {
    if let Err(err) = write_frame(writer, frame) {
        log::warn!("write pump: transport error, stopping: {}", err);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::headers::HpackCodec;
    use crate::stream::Role;
    use bytes::Bytes;

    fn state_with_window(initial_window_size: u32) -> Arc<ConnectionState<HpackCodec>> {
        let config = SessionConfig { initial_window_size, ..SessionConfig::default() };
        let state = Arc::new(ConnectionState::new(config, Role::Client, HpackCodec::new()));
        state.shared.lock().flow.register_stream(StreamId::new(1));
        state
    }

    #[test]
    fn frame_within_credit_sends_whole() {
        let state = state_with_window(100);
        let mut out = Vec::new();
        let frame = Frame::data(StreamId::new(1), Bytes::from_static(b"hello"), true);
        match send_if_creditable(&mut out, &state, frame) {
            CreditResult::Sent => {}
            _ => panic!("expected Sent"),
        }
        assert!(!out.is_empty());
    }

    #[test]
    fn oversized_frame_is_split_at_available_credit() {
        let state = state_with_window(100);
        let mut out = Vec::new();
        let frame = Frame::data(StreamId::new(1), Bytes::from(vec![0u8; 150]), true);
        match send_if_creditable(&mut out, &state, frame) {
            CreditResult::Deferred(Frame::Data { payload, flags, .. }) => {
                assert_eq!(payload.data.len(), 50);
                assert!(flags.contains(DataFlags::END_STREAM));
            }
            _ => panic!("expected a 50-byte remainder still carrying END_STREAM"),
        }
        assert!(!out.is_empty());
        assert_eq!(state.shared.lock().flow.sendable(StreamId::new(1)), 0);
    }

    #[test]
    fn zero_credit_defers_frame_untouched() {
        let state = state_with_window(0);
        let mut out = Vec::new();
        let frame = Frame::data(StreamId::new(1), Bytes::from_static(b"hello"), false);
        match send_if_creditable(&mut out, &state, frame) {
            CreditResult::Deferred(Frame::Data { payload, .. }) => assert_eq!(&payload.data[..], b"hello"),
            _ => panic!("expected the untouched frame back"),
        }
        assert!(out.is_empty());
    }
}
