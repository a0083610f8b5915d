//! Frame header bit layout, per-type flag sets, and the decode/encode codec.

pub mod codec;
pub mod flags;
pub mod types;

pub use codec::{decode_next, encode, write_frame};
pub use types::{Frame, FrameType, StreamId};
