//! Framing-layer conformance driven end to end: an oversize frame disposing
//! the connection, and a `HEADERS`/`CONTINUATION` pair reconstructing a
//! single header list (spec §8 scenarios 3 and 4).

mod common;

use std::io::Write;
use std::time::Duration;

use bytes::Bytes;

use h2engine::config::SessionConfig;
use h2engine::frame::types::{ErrorCode, Frame, StreamId};
use h2engine::frame::{decode_next, encode};
use h2engine::preface::CONNECTION_PREFACE;
use h2engine::session::Session;
use h2engine::stream::Role;
use h2engine::transport::InMemoryTransport;

/// Raw HPACK-encode a header list the same way `Session::send_request`
/// would, for tests that hand-craft frames instead of going through the
/// embedder API.
fn hpack_encode(headers: &[(&[u8], &[u8])]) -> Bytes {
    let mut codec = hpack::Encoder::new();
    Bytes::from(codec.encode(headers.iter().map(|(n, v)| (*n, *v))))
}

#[test]
fn oversize_frame_triggers_goaway_and_disposal() {
    let (mut client_raw, server_transport) = InMemoryTransport::pair();
    client_raw.write_all(CONNECTION_PREFACE).unwrap();
    client_raw.write_all(&encode(&Frame::settings(vec![]))).unwrap();

    let recorder = common::EventRecorder::new();
    let server = Session::new(server_transport.clone(), server_transport.clone(), Role::Server, SessionConfig::default()).unwrap();
    server.subscribe(recorder.subscriber());

    // Only now does the oversize frame go out, guaranteeing the subscriber
    // is wired up before the fatal frame can possibly be processed.
    let oversize = Frame::data(StreamId::new(1), Bytes::from(vec![0u8; 16385]), false);
    client_raw.write_all(&encode(&oversize)).unwrap();

    assert!(recorder.wait_for(Duration::from_secs(2), common::disposed));

    // The server's reply starts with its own initial SETTINGS (queued at
    // construction, ahead of anything the oversize frame could trigger),
    // followed by the SETTINGS ack for the client's own SETTINGS frame above,
    // and finally the GOAWAY the connection error produced. Blocking reads
    // mean this isn't a race against the write pump's own timing.
    let first = decode_next(&mut client_raw, 16384).unwrap();
    assert!(matches!(first, Frame::Settings { .. }));
    let second = decode_next(&mut client_raw, 16384).unwrap();
    assert!(matches!(second, Frame::Settings { .. }));
    let third = decode_next(&mut client_raw, 16384).unwrap();
    assert!(matches!(third, Frame::GoAway { .. }));
}

#[test]
fn continuation_completes_a_split_headers_block() {
    let (mut client_raw, server_transport) = InMemoryTransport::pair();
    client_raw.write_all(CONNECTION_PREFACE).unwrap();
    client_raw.write_all(&encode(&Frame::settings(vec![]))).unwrap();

    let recorder = common::EventRecorder::new();
    let server = Session::new(server_transport.clone(), server_transport.clone(), Role::Server, SessionConfig::default()).unwrap();
    server.subscribe(recorder.subscriber());

    let block = hpack_encode(&[(b":method", b"GET"), (b":path", b"/a"), (b":scheme", b"https")]);
    let split = block.len() / 2;
    let first_half = block.slice(..split);
    let second_half = block.slice(split..);

    let stream_id = StreamId::new(3);
    client_raw.write_all(&encode(&Frame::headers(stream_id, first_half, false, false))).unwrap();
    client_raw.write_all(&encode(&Frame::continuation(stream_id, second_half, true))).unwrap();

    assert!(recorder.wait_for(Duration::from_secs(2), |events| {
        common::frame_received_count(events, "CONTINUATION", stream_id) == 1
    }));

    // No connection error: the interleaved HEADERS/CONTINUATION pair was
    // accepted as a single atomic block, not rejected as out-of-order.
    assert!(!common::disposed(&recorder.snapshot()));
}

#[test]
fn zero_increment_window_update_resets_only_the_offending_stream() {
    let (mut client_raw, server_transport) = InMemoryTransport::pair();
    client_raw.write_all(CONNECTION_PREFACE).unwrap();
    client_raw.write_all(&encode(&Frame::settings(vec![]))).unwrap();

    let recorder = common::EventRecorder::new();
    let server = Session::new(server_transport.clone(), server_transport.clone(), Role::Server, SessionConfig::default()).unwrap();
    server.subscribe(recorder.subscriber());

    let block = hpack_encode(&[(b":method", b"GET"), (b":path", b"/a"), (b":scheme", b"https")]);
    let stream_id = StreamId::new(3);
    client_raw.write_all(&encode(&Frame::headers(stream_id, block, false, true))).unwrap();
    client_raw.write_all(&encode(&Frame::window_update(stream_id, 0))).unwrap();

    // The server's reply interleaves its own initial SETTINGS, a SETTINGS ack
    // for the client's SETTINGS frame above, and an RST_STREAM for the zero
    // increment, in some order relative to the first two (both unrelated to
    // stream 3) but always after the HEADERS on stream 3 is processed; scan
    // for the RST_STREAM rather than assume a fixed position.
    let mut saw_rst_stream = false;
    for _ in 0..8 {
        match decode_next(&mut client_raw, 16384) {
            Ok(Frame::RstStream { stream_id: id, payload, .. }) => {
                assert_eq!(id, stream_id);
                assert_eq!(payload.error_code, ErrorCode::PROTOCOL_ERROR);
                saw_rst_stream = true;
                break;
            }
            Ok(Frame::GoAway { .. }) => panic!("zero-increment WINDOW_UPDATE must not be connection-fatal"),
            Ok(_) => continue,
            Err(err) => panic!("unexpected decode error before RST_STREAM arrived: {err}"),
        }
    }
    assert!(saw_rst_stream, "expected an RST_STREAM reply for the zero-increment WINDOW_UPDATE");

    // The connection itself survives: no GOAWAY, no disposal.
    assert!(!common::disposed(&recorder.snapshot()));
}
