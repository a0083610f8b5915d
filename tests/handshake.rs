//! Connection setup: the preface handshake and the initial `SETTINGS`
//! exchange, driven over `InMemoryTransport` end to end (spec §8 scenarios
//! 1 and 2).

mod common;

use std::io::{Read, Write};
use std::time::Duration;

use h2engine::config::SessionConfig;
use h2engine::events::Event;
use h2engine::session::Session;
use h2engine::stream::Role;
use h2engine::transport::InMemoryTransport;

#[test]
fn preface_mismatch_ends_session_with_no_bytes_written_back() {
    let (mut client_raw, server_transport) = InMemoryTransport::pair();
    client_raw.write_all(&[b'A'; 24]).unwrap();

    let result = Session::new(server_transport.clone(), server_transport.clone(), Role::Server, SessionConfig::default());
    assert!(result.is_err());

    // Construction failed before any pump spawned, so the server transport
    // never had a write() call made on it at all; closing it lets the
    // client's read return a clean EOF instead of blocking forever.
    server_transport.close();
    let mut buf = [0u8; 1];
    let n = client_raw.read(&mut buf).unwrap();
    assert_eq!(n, 0);
}

#[test]
fn settings_handshake_completes_without_goaway() {
    let (a, b) = InMemoryTransport::pair();
    let client = Session::new(a.clone(), a, Role::Client, SessionConfig::default()).unwrap();
    let server = Session::new(b.clone(), b, Role::Server, SessionConfig::default()).unwrap();

    let client_events = common::EventRecorder::new();
    let server_events = common::EventRecorder::new();
    client.subscribe(client_events.subscriber());
    server.subscribe(server_events.subscriber());

    // Each side's own initial SETTINGS gets acked by the other within the
    // default 60s timeout; in a healthy exchange this returns almost at once.
    client.wait_settings_ack().unwrap();
    server.wait_settings_ack().unwrap();

    assert!(!common::disposed(&client_events.snapshot()));
    assert!(!common::disposed(&server_events.snapshot()));

    // Both sides observed the peer's SETTINGS frame land.
    assert!(client_events.wait_for(Duration::from_millis(200), |events| {
        events.iter().any(|e| matches!(e, Event::FrameReceived { frame_type, .. } if *frame_type == "SETTINGS"))
    }));
    assert!(server_events.wait_for(Duration::from_millis(200), |events| {
        events.iter().any(|e| matches!(e, Event::FrameReceived { frame_type, .. } if *frame_type == "SETTINGS"))
    }));
}

#[test]
fn shutdown_called_twice_fires_session_disposed_exactly_once() {
    let (a, b) = InMemoryTransport::pair();
    let client = Session::new(a.clone(), a, Role::Client, SessionConfig::default()).unwrap();
    let _server = Session::new(b.clone(), b, Role::Server, SessionConfig::default()).unwrap();

    let events = common::EventRecorder::new();
    client.subscribe(events.subscriber());

    client.shutdown(h2engine::frame::types::ErrorCode::NO_ERROR, Duration::from_secs(1));
    client.shutdown(h2engine::frame::types::ErrorCode::NO_ERROR, Duration::from_secs(1));

    assert!(events.wait_for(Duration::from_secs(2), |events| common::disposed_count(events) == 1));
    assert_eq!(common::disposed_count(&events.snapshot()), 1);
}

#[test]
fn ping_round_trips_between_two_live_sessions() {
    let (a, b) = InMemoryTransport::pair();
    let client = Session::new(a.clone(), a, Role::Client, SessionConfig::default()).unwrap();
    let server = Session::new(b.clone(), b, Role::Server, SessionConfig::default()).unwrap();

    client.wait_settings_ack().unwrap();
    server.wait_settings_ack().unwrap();

    // The server echoes an ACK with identical opaque data as soon as it
    // decodes the PING; this resolves well inside the 3s default timeout.
    let rtt = client.ping(0x2a2a2a2a2a2a2a2a).unwrap();
    assert!(rtt < Duration::from_secs(3));
}
