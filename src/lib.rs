//! An HTTP/2 session engine: given a duplex byte stream to a peer, this
//! crate multiplexes concurrent logical request/response streams over it
//! according to the HTTP/2 framing and state rules — connection setup,
//! frame demultiplexing and dispatch, per-stream state machines, header
//! block assembly, and flow-control coordination.
//!
//! HPACK-style header compression is a pluggable collaborator (see
//! [`headers::HeaderCodec`]); TLS/ALPN negotiation and the underlying
//! transport are the embedder's responsibility (see [`transport::Transport`]).

pub mod config;
pub mod error;
pub mod events;
pub mod flow;
pub mod frame;
pub mod headers;
pub mod preface;
pub mod queue;
pub mod session;
pub mod stream;
pub mod transport;

pub use config::SessionConfig;
pub use error::{Http2Error, Result};
pub use events::{Event, Subscriber, SubscriptionId};
pub use session::Session;
pub use stream::Role;
