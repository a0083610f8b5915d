//! The HTTP/2 frame header, the per-type payload structs, and the `Frame`
//! tagged union that the rest of the engine dispatches on.

use std::fmt;

use bitfield_struct::bitfield;
use bytes::Bytes;

use super::flags::{
    ContinuationFlags, DataFlags, GoAwayFlags, HeadersFlags, PingFlags, PriorityFlags,
    PushPromiseFlags, RstStreamFlags, SettingsFlags, UnknownFlags, WindowUpdateFlags,
};

/// The largest value a 31-bit stream identifier can hold.
pub const MAX_STREAM_ID: u32 = (1 << 31) - 1;

/// A 31-bit stream identifier. Id `0` is reserved for connection-level frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

impl StreamId {
    pub const CONNECTION: StreamId = StreamId(0);

    pub fn new(id: u32) -> Self {
        StreamId(id & MAX_STREAM_ID)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_connection(self) -> bool {
        self.0 == 0
    }

    /// Odd, non-zero ids are client-initiated per section 5.1.1.
    pub fn is_client_initiated(self) -> bool {
        self.0 != 0 && self.0 % 2 == 1
    }

    /// Even, non-zero ids are server-initiated (push) per section 5.1.1.
    pub fn is_server_initiated(self) -> bool {
        self.0 != 0 && self.0 % 2 == 0
    }
}

impl From<u32> for StreamId {
    fn from(v: u32) -> Self {
        StreamId::new(v)
    }
}

impl From<StreamId> for u32 {
    fn from(v: StreamId) -> Self {
        v.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[bitfield(u32)]
pub struct FrameHeaderLength {
    #[bits(24)]
    pub length: u32,
    #[bits(8)]
    __: u8,
}

#[bitfield(u32)]
pub struct StreamIdentifier {
    #[bits(1)]
    _reserved: u8,
    #[bits(31)]
    pub stream_identifier: u32,
}

#[bitfield(u32)]
pub struct StreamDependency {
    #[bits(1)]
    pub exclusive: bool,
    #[bits(31)]
    pub stream_identifier: u32,
}

#[bitfield(u32)]
pub struct WindowSizeIncrement {
    #[bits(1)]
    _reserved: u8,
    #[bits(31)]
    pub window_size: u32,
}

/// Error codes defined by section 7 of the framing layer.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NO_ERROR = 0x0,
    PROTOCOL_ERROR = 0x1,
    INTERNAL_ERROR = 0x2,
    FLOW_CONTROL_ERROR = 0x3,
    SETTINGS_TIMEOUT = 0x4,
    STREAM_CLOSED = 0x5,
    FRAME_SIZE_ERROR = 0x6,
    REFUSED_STREAM = 0x7,
    CANCEL = 0x8,
    COMPRESSION_ERROR = 0x9,
    CONNECT_ERROR = 0xa,
    ENHANCE_YOUR_CALM = 0xb,
    INADEQUATE_SECURITY = 0xc,
    HTTP_1_1_REQUIRED = 0xd,
    UNKNOWN(u32),
}

impl From<u32> for ErrorCode {
    fn from(v: u32) -> Self {
        match v {
            0x0 => ErrorCode::NO_ERROR,
            0x1 => ErrorCode::PROTOCOL_ERROR,
            0x2 => ErrorCode::INTERNAL_ERROR,
            0x3 => ErrorCode::FLOW_CONTROL_ERROR,
            0x4 => ErrorCode::SETTINGS_TIMEOUT,
            0x5 => ErrorCode::STREAM_CLOSED,
            0x6 => ErrorCode::FRAME_SIZE_ERROR,
            0x7 => ErrorCode::REFUSED_STREAM,
            0x8 => ErrorCode::CANCEL,
            0x9 => ErrorCode::COMPRESSION_ERROR,
            0xa => ErrorCode::CONNECT_ERROR,
            0xb => ErrorCode::ENHANCE_YOUR_CALM,
            0xc => ErrorCode::INADEQUATE_SECURITY,
            0xd => ErrorCode::HTTP_1_1_REQUIRED,
            other => ErrorCode::UNKNOWN(other),
        }
    }
}

impl From<ErrorCode> for u32 {
    fn from(v: ErrorCode) -> Self {
        match v {
            ErrorCode::NO_ERROR => 0x0,
            ErrorCode::PROTOCOL_ERROR => 0x1,
            ErrorCode::INTERNAL_ERROR => 0x2,
            ErrorCode::FLOW_CONTROL_ERROR => 0x3,
            ErrorCode::SETTINGS_TIMEOUT => 0x4,
            ErrorCode::STREAM_CLOSED => 0x5,
            ErrorCode::FRAME_SIZE_ERROR => 0x6,
            ErrorCode::REFUSED_STREAM => 0x7,
            ErrorCode::CANCEL => 0x8,
            ErrorCode::COMPRESSION_ERROR => 0x9,
            ErrorCode::CONNECT_ERROR => 0xa,
            ErrorCode::ENHANCE_YOUR_CALM => 0xb,
            ErrorCode::INADEQUATE_SECURITY => 0xc,
            ErrorCode::HTTP_1_1_REQUIRED => 0xd,
            ErrorCode::UNKNOWN(other) => other,
        }
    }
}

/// The frame type octet.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
    /// `ALTSVC`, RFC 7838. Recognized only with the `rfc7838` feature;
    /// otherwise its byte folds into [`FrameType::Unknown`].
    #[cfg(feature = "rfc7838")]
    AltSvc = 0xa,
    /// `ORIGIN`, RFC 8336. Recognized only with the `rfc8336` feature;
    /// otherwise its byte folds into [`FrameType::Unknown`].
    #[cfg(feature = "rfc8336")]
    Origin = 0xc,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => FrameType::Data,
            0x1 => FrameType::Headers,
            0x2 => FrameType::Priority,
            0x3 => FrameType::RstStream,
            0x4 => FrameType::Settings,
            0x5 => FrameType::PushPromise,
            0x6 => FrameType::Ping,
            0x7 => FrameType::GoAway,
            0x8 => FrameType::WindowUpdate,
            0x9 => FrameType::Continuation,
            #[cfg(feature = "rfc7838")]
            0xa => FrameType::AltSvc,
            #[cfg(feature = "rfc8336")]
            0xc => FrameType::Origin,
            other => FrameType::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(v: FrameType) -> Self {
        match v {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            #[cfg(feature = "rfc7838")]
            FrameType::AltSvc => 0xa,
            #[cfg(feature = "rfc8336")]
            FrameType::Origin => 0xc,
            FrameType::Unknown(other) => other,
        }
    }
}

/// A single `SETTINGS` key/value pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsParameter {
    pub identifier: u16,
    pub value: u32,
}

pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 0x1;
pub const SETTINGS_ENABLE_PUSH: u16 = 0x2;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u16 = 0x6;

#[derive(Debug, Clone)]
pub struct DataPayload {
    pub pad_length: Option<u8>,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct HeadersPayload {
    pub pad_length: Option<u8>,
    pub stream_dependency: Option<u32>,
    pub exclusive: Option<bool>,
    pub weight: Option<u8>,
    pub header_block_fragment: Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityPayload {
    pub stream_dependency: u32,
    pub exclusive: bool,
    pub weight: u8,
}

#[derive(Debug, Clone, Copy)]
pub struct RstStreamPayload {
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone)]
pub struct SettingsPayload {
    pub parameters: Vec<SettingsParameter>,
}

#[derive(Debug, Clone, Copy)]
pub struct PingPayload {
    pub opaque_data: u64,
}

#[derive(Debug, Clone)]
pub struct GoAwayPayload {
    pub last_stream_id: StreamId,
    pub error_code: ErrorCode,
    pub debug_data: Bytes,
}

#[derive(Debug, Clone)]
pub struct PushPromisePayload {
    pub pad_length: Option<u8>,
    pub promised_stream_id: StreamId,
    pub header_block_fragment: Bytes,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowUpdatePayload {
    pub window_size_increment: u32,
}

#[derive(Debug, Clone)]
pub struct ContinuationPayload {
    pub header_block_fragment: Bytes,
}

/// A single decoded HTTP/2 frame, header and payload together.
#[derive(Debug, Clone)]
pub enum Frame {
    Data {
        stream_id: StreamId,
        flags: DataFlags,
        payload: DataPayload,
    },
    Headers {
        stream_id: StreamId,
        flags: HeadersFlags,
        payload: HeadersPayload,
    },
    Priority {
        stream_id: StreamId,
        flags: PriorityFlags,
        payload: PriorityPayload,
    },
    RstStream {
        stream_id: StreamId,
        flags: RstStreamFlags,
        payload: RstStreamPayload,
    },
    Settings {
        flags: SettingsFlags,
        payload: SettingsPayload,
    },
    PushPromise {
        stream_id: StreamId,
        flags: PushPromiseFlags,
        payload: PushPromisePayload,
    },
    Ping {
        flags: PingFlags,
        payload: PingPayload,
    },
    GoAway {
        flags: GoAwayFlags,
        payload: GoAwayPayload,
    },
    WindowUpdate {
        stream_id: StreamId,
        flags: WindowUpdateFlags,
        payload: WindowUpdatePayload,
    },
    Continuation {
        stream_id: StreamId,
        flags: ContinuationFlags,
        payload: ContinuationPayload,
    },
    Unknown {
        frame_type: u8,
        stream_id: StreamId,
        flags: UnknownFlags,
        payload: Bytes,
    },
}

impl Frame {
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data { stream_id, .. }
            | Frame::Headers { stream_id, .. }
            | Frame::Priority { stream_id, .. }
            | Frame::RstStream { stream_id, .. }
            | Frame::PushPromise { stream_id, .. }
            | Frame::WindowUpdate { stream_id, .. }
            | Frame::Continuation { stream_id, .. }
            | Frame::Unknown { stream_id, .. } => *stream_id,
            Frame::Settings { .. } | Frame::GoAway { .. } => StreamId::CONNECTION,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Data { .. } => FrameType::Data,
            Frame::Headers { .. } => FrameType::Headers,
            Frame::Priority { .. } => FrameType::Priority,
            Frame::RstStream { .. } => FrameType::RstStream,
            Frame::Settings { .. } => FrameType::Settings,
            Frame::PushPromise { .. } => FrameType::PushPromise,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::GoAway { .. } => FrameType::GoAway,
            Frame::WindowUpdate { .. } => FrameType::WindowUpdate,
            Frame::Continuation { .. } => FrameType::Continuation,
            Frame::Unknown { frame_type, .. } => FrameType::Unknown(*frame_type),
        }
    }

    /// Whether this frame bears `END_HEADERS` (only meaningful for the two
    /// header-block-carrying frame types).
    pub fn ends_headers(&self) -> bool {
        match self {
            Frame::Headers { flags, .. } => flags.contains(HeadersFlags::END_HEADERS),
            Frame::Continuation { flags, .. } => flags.contains(ContinuationFlags::END_HEADERS),
            Frame::PushPromise { flags, .. } => flags.contains(PushPromiseFlags::END_HEADERS),
            _ => false,
        }
    }

    pub fn ends_stream(&self) -> bool {
        match self {
            Frame::Data { flags, .. } => flags.contains(DataFlags::END_STREAM),
            Frame::Headers { flags, .. } => flags.contains(HeadersFlags::END_STREAM),
            _ => false,
        }
    }

    pub fn settings_ack() -> Frame {
        Frame::Settings {
            flags: SettingsFlags::ACK,
            payload: SettingsPayload { parameters: Vec::new() },
        }
    }

    pub fn settings(parameters: Vec<SettingsParameter>) -> Frame {
        Frame::Settings {
            flags: SettingsFlags::empty(),
            payload: SettingsPayload { parameters },
        }
    }

    pub fn ping(opaque_data: u64, ack: bool) -> Frame {
        Frame::Ping {
            flags: if ack { PingFlags::ACK } else { PingFlags::empty() },
            payload: PingPayload { opaque_data },
        }
    }

    pub fn rst_stream(stream_id: StreamId, error_code: ErrorCode) -> Frame {
        Frame::RstStream {
            stream_id,
            flags: RstStreamFlags::empty(),
            payload: RstStreamPayload { error_code },
        }
    }

    pub fn go_away(last_stream_id: StreamId, error_code: ErrorCode, debug_data: Bytes) -> Frame {
        Frame::GoAway {
            flags: GoAwayFlags::empty(),
            payload: GoAwayPayload { last_stream_id, error_code, debug_data },
        }
    }

    pub fn window_update(stream_id: StreamId, window_size_increment: u32) -> Frame {
        Frame::WindowUpdate {
            stream_id,
            flags: WindowUpdateFlags::empty(),
            payload: WindowUpdatePayload { window_size_increment },
        }
    }

    pub fn headers(
        stream_id: StreamId,
        header_block_fragment: Bytes,
        end_stream: bool,
        end_headers: bool,
    ) -> Frame {
        let mut flags = HeadersFlags::empty();
        if end_stream {
            flags |= HeadersFlags::END_STREAM;
        }
        if end_headers {
            flags |= HeadersFlags::END_HEADERS;
        }
        Frame::Headers {
            stream_id,
            flags,
            payload: HeadersPayload {
                pad_length: None,
                stream_dependency: None,
                exclusive: None,
                weight: None,
                header_block_fragment,
            },
        }
    }

    pub fn continuation(stream_id: StreamId, header_block_fragment: Bytes, end_headers: bool) -> Frame {
        let mut flags = ContinuationFlags::empty();
        if end_headers {
            flags |= ContinuationFlags::END_HEADERS;
        }
        Frame::Continuation {
            stream_id,
            flags,
            payload: ContinuationPayload { header_block_fragment },
        }
    }

    pub fn data(stream_id: StreamId, data: Bytes, end_stream: bool) -> Frame {
        let mut flags = DataFlags::empty();
        if end_stream {
            flags |= DataFlags::END_STREAM;
        }
        Frame::Data {
            stream_id,
            flags,
            payload: DataPayload { pad_length: None, data },
        }
    }

    pub fn push_promise(
        stream_id: StreamId,
        promised_stream_id: StreamId,
        header_block_fragment: Bytes,
        end_headers: bool,
    ) -> Frame {
        let mut flags = PushPromiseFlags::empty();
        if end_headers {
            flags |= PushPromiseFlags::END_HEADERS;
        }
        Frame::PushPromise {
            stream_id,
            flags,
            payload: PushPromisePayload {
                pad_length: None,
                promised_stream_id,
                header_block_fragment,
            },
        }
    }

    pub fn priority(stream_id: StreamId, stream_dependency: u32, exclusive: bool, weight: u8) -> Frame {
        Frame::Priority {
            stream_id,
            flags: PriorityFlags::empty(),
            payload: PriorityPayload { stream_dependency, exclusive, weight },
        }
    }
}
