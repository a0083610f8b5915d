//! The error taxonomy used throughout the engine: connection-fatal errors,
//! stream-scoped errors, purely local misuse, and transport/codec failures.
//!
//! Connection and stream errors carry an [`crate::frame::types::ErrorCode`]
//! so the dispatcher can turn them directly into a `GOAWAY` or `RST_STREAM`
//! without a second translation step.

use std::io;

use thiserror::Error;

use crate::frame::types::ErrorCode;

pub type Result<T> = std::result::Result<T, Http2Error>;

/// Every way a session can fail, from a truncated read to a protocol
/// violation reported by the peer.
#[derive(Debug, Error)]
pub enum Http2Error {
    /// A frame's advertised length exceeded the negotiated
    /// `SETTINGS_MAX_FRAME_SIZE`. Caught before the payload is read.
    #[error("frame of length {length} exceeds max_frame_size {max_frame_size}")]
    FrameSizeError { length: u32, max_frame_size: u32 },

    /// A frame's layout didn't match its declared type (bad padding length,
    /// a fixed-size frame with the wrong length, truncated settings list).
    #[error("malformed {0} payload")]
    MalformedPayload(&'static str),

    /// The peer, or our own bookkeeping, violated the framing or stream
    /// state machine in a way not covered by a more specific variant.
    #[error("protocol error: {0}")]
    ProtocolError(&'static str),

    /// HPACK decompression failed. Connection-fatal: once the dynamic
    /// table desyncs, no subsequent header block can be trusted.
    #[error("header compression error: {0}")]
    CompressionError(String),

    /// A flow-control window would have gone negative or past 2^31-1.
    #[error("flow control error on stream {stream_id}")]
    FlowControlError { stream_id: u32 },

    /// No `SETTINGS` ack arrived within the configured timeout.
    #[error("settings ack not received within timeout")]
    SettingsTimeout,

    /// No `PING` ack arrived within the configured timeout.
    #[error("ping ack not received within timeout")]
    PingTimeout,

    /// A frame arrived for a stream that is already closed.
    #[error("stream {0} is closed")]
    StreamClosed(u32),

    /// A frame violated the state machine for one specific stream, without
    /// being fatal to the rest of the connection.
    #[error("stream {stream_id} protocol error: {reason}")]
    StreamProtocolError { stream_id: u32, reason: &'static str },

    /// The embedder asked for more concurrent streams than
    /// `SETTINGS_MAX_CONCURRENT_STREAMS` allows.
    #[error("too many concurrent streams (limit {limit})")]
    TooManyConcurrentStreams { limit: u32 },

    /// An embedder call was given an argument that can never be valid
    /// (e.g. opening a stream with an even id on the client role).
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The embedder asked to request a path the peer already pushed via
    /// `PUSH_PROMISE`.
    #[error("path {0:?} was already promised by the peer")]
    ResourcePromised(String),

    /// The connection shut down, locally or via a peer `GOAWAY`.
    #[error("session is closed")]
    SessionClosed,

    /// An unrecoverable bug in the engine itself, not a peer or embedder
    /// mistake. Always connection-fatal.
    #[error("internal error: {0}")]
    InternalError(&'static str),

    /// The transport ended before a full frame header or payload arrived.
    #[error("connection truncated mid-frame")]
    Truncated,

    /// Any other transport I/O failure.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

impl Http2Error {
    /// The `GOAWAY`/`RST_STREAM` error code this failure should be reported
    /// with, for the variants that are ever surfaced to the peer.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Http2Error::FrameSizeError { .. } => ErrorCode::FRAME_SIZE_ERROR,
            Http2Error::MalformedPayload(_) => ErrorCode::PROTOCOL_ERROR,
            Http2Error::ProtocolError(_) => ErrorCode::PROTOCOL_ERROR,
            Http2Error::CompressionError(_) => ErrorCode::COMPRESSION_ERROR,
            Http2Error::FlowControlError { .. } => ErrorCode::FLOW_CONTROL_ERROR,
            Http2Error::SettingsTimeout => ErrorCode::SETTINGS_TIMEOUT,
            Http2Error::PingTimeout => ErrorCode::PROTOCOL_ERROR,
            Http2Error::StreamClosed(_) => ErrorCode::STREAM_CLOSED,
            Http2Error::StreamProtocolError { .. } => ErrorCode::PROTOCOL_ERROR,
            Http2Error::TooManyConcurrentStreams { .. } => ErrorCode::REFUSED_STREAM,
            Http2Error::InvalidArgument(_) => ErrorCode::INTERNAL_ERROR,
            Http2Error::ResourcePromised(_) => ErrorCode::NO_ERROR,
            Http2Error::SessionClosed => ErrorCode::NO_ERROR,
            Http2Error::InternalError(_) => ErrorCode::INTERNAL_ERROR,
            Http2Error::Truncated => ErrorCode::PROTOCOL_ERROR,
            Http2Error::Io(_) => ErrorCode::INTERNAL_ERROR,
        }
    }

    /// Whether this error is fatal to the whole connection (warrants a
    /// `GOAWAY`) as opposed to scoped to a single stream (`RST_STREAM`).
    pub fn is_connection_fatal(&self) -> bool {
        !matches!(
            self,
            Http2Error::StreamClosed(_) | Http2Error::StreamProtocolError { .. }
        )
    }

    /// The stream an `RST_STREAM` reply should target, for the variants
    /// that are scoped to one stream rather than the whole connection.
    pub fn stream_id(&self) -> Option<u32> {
        match self {
            Http2Error::StreamClosed(id) => Some(*id),
            Http2Error::StreamProtocolError { stream_id, .. } => Some(*stream_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_error_maps_to_frame_size_error_code() {
        let err = Http2Error::FrameSizeError { length: 99999, max_frame_size: 16384 };
        assert!(matches!(err.error_code(), ErrorCode::FRAME_SIZE_ERROR));
        assert!(err.is_connection_fatal());
    }

    #[test]
    fn stream_protocol_error_is_not_connection_fatal() {
        let err = Http2Error::StreamProtocolError { stream_id: 3, reason: "headers after trailers" };
        assert!(!err.is_connection_fatal());
    }
}
