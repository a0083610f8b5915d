//! Construction-time configuration for a [`crate::session::Session`].
//!
//! Every field here corresponds to a value the framing and flow-control
//! layers would otherwise treat as a scattered magic number. Collecting
//! them lets an embedder override exactly one without guessing at the
//! others, and gives the dispatcher a single place to read negotiated
//! `SETTINGS` back into.

use std::time::Duration;

/// Tunables for one HTTP/2 session. Defaults match the draft-14 framing
/// layer's own defaults where one is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Whether this connection runs over TLS. Gates the "no frame but
    /// `SETTINGS` before the peer's `SETTINGS`" rule, which the framing
    /// layer only enforces once a connection is secure (section 3.5).
    pub secure: bool,

    /// Whether we accept `PUSH_PROMISE` from the peer (client role) or may
    /// send it (server role). Mirrors `SETTINGS_ENABLE_PUSH`.
    pub push_enabled: bool,

    /// `SETTINGS_MAX_FRAME_SIZE` we advertise and enforce on incoming frames.
    pub max_frame_size: u32,

    /// `SETTINGS_INITIAL_WINDOW_SIZE` for streams opened on this connection.
    pub initial_window_size: u32,

    /// `SETTINGS_MAX_CONCURRENT_STREAMS` we are willing to have open at once.
    pub max_concurrent_streams: u32,

    /// Priority weight assigned to a stream when the embedder doesn't name one.
    pub default_stream_priority: u8,

    /// The largest weight a `PRIORITY` frame we emit will carry.
    pub max_priority: u8,

    /// How long to wait for a `SETTINGS` ack before treating the connection
    /// as unresponsive.
    pub settings_ack_timeout: Duration,

    /// How long to wait for a `PING` ack before treating the connection as
    /// unresponsive.
    pub ping_ack_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            secure: true,
            push_enabled: true,
            max_frame_size: 16384,
            initial_window_size: 65535,
            max_concurrent_streams: 100,
            default_stream_priority: 127,
            max_priority: 255,
            settings_ack_timeout: Duration::from_secs(60),
            ping_ack_timeout: Duration::from_secs(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rfc_7540_draft_14() {
        let config = SessionConfig::default();
        assert_eq!(config.max_frame_size, 16384);
        assert_eq!(config.initial_window_size, 65535);
        assert_eq!(config.max_concurrent_streams, 100);
    }
}
