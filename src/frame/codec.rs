//! Decoding a byte stream into `Frame`s and encoding `Frame`s back to bytes.
//!
//! One `FrameCodec` is owned per session. `decode_next` performs exactly two
//! reads against the transport: the fixed 9-octet header, then the payload
//! whose length the header advertised. `encode` is the inverse, producing a
//! single contiguous buffer ready to hand to the transport.

use std::io::{self, Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use nom::{
    IResult,
    number::complete::{be_u8, be_u16, be_u24, be_u32, be_u64},
};

use crate::error::{Http2Error, Result};

use super::flags::{
    ContinuationFlags, DataFlags, GoAwayFlags, HeadersFlags, PingFlags, PriorityFlags,
    PushPromiseFlags, RstStreamFlags, SettingsFlags, UnknownFlags, WindowUpdateFlags,
};
use super::types::{
    ContinuationPayload, DataPayload, ErrorCode, Frame, FrameType, GoAwayPayload, HeadersPayload,
    PingPayload, PriorityPayload, PushPromisePayload, RstStreamPayload, SettingsParameter,
    SettingsPayload, StreamId, WindowUpdatePayload,
};

type NomResult<'a, T> = IResult<&'a [u8], T>;

fn parse_frame_header(input: &[u8]) -> NomResult<'_, (u32, u8, u8, u32)> {
    let (input, length) = be_u24(input)?;
    let (input, frame_type) = be_u8(input)?;
    let (input, flags) = be_u8(input)?;
    let (input, stream_id_raw) = be_u32(input)?;
    Ok((input, (length, frame_type, flags, stream_id_raw & 0x7fff_ffff)))
}

fn parse_optional_padding_length<'a>(
    input: &'a [u8],
    padded: bool,
) -> NomResult<'a, Option<u8>> {
    if padded {
        let (input, pad_len) = be_u8(input)?;
        Ok((input, Some(pad_len)))
    } else {
        Ok((input, None))
    }
}

fn split_padding(body: &[u8], pad_len: Option<u8>) -> std::result::Result<(&[u8], &[u8]), Http2Error> {
    match pad_len {
        None => Ok((body, &body[0..0])),
        Some(pad_len) => {
            let pad_len = pad_len as usize;
            if pad_len > body.len() {
                return Err(Http2Error::MalformedPayload("padding length exceeds frame payload"));
            }
            let split_at = body.len() - pad_len;
            Ok((&body[..split_at], &body[split_at..]))
        }
    }
}

fn parse_error_code(input: &[u8]) -> NomResult<'_, ErrorCode> {
    let (input, v) = be_u32(input)?;
    Ok((input, ErrorCode::from(v)))
}

/// Decodes one frame's header and payload from a blocking, readable transport.
///
/// `max_frame_size` enforces the session's configured `SETTINGS_MAX_FRAME_SIZE`
/// at the earliest possible point, before any payload bytes are even read.
pub fn decode_next<R: Read>(reader: &mut R, max_frame_size: u32) -> Result<Frame> {
    let mut header_buf = [0u8; 9];
    reader.read_exact(&mut header_buf).map_err(map_read_error)?;
    let (_, (length, frame_type, flags, stream_id_raw)) =
        parse_frame_header(&header_buf).map_err(|_| Http2Error::MalformedPayload("frame header"))?;

    if length > max_frame_size {
        return Err(Http2Error::FrameSizeError { length, max_frame_size });
    }

    let mut payload_buf = vec![0u8; length as usize];
    reader.read_exact(&mut payload_buf).map_err(map_read_error)?;
    let payload = Bytes::from(payload_buf);
    let stream_id = StreamId::new(stream_id_raw);

    decode_payload(FrameType::from(frame_type), flags, stream_id, payload)
}

fn map_read_error(err: io::Error) -> Http2Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Http2Error::Truncated
    } else {
        Http2Error::Io(err)
    }
}

fn decode_payload(
    frame_type: FrameType,
    raw_flags: u8,
    stream_id: StreamId,
    payload: Bytes,
) -> Result<Frame> {
    match frame_type {
        FrameType::Data => {
            let body: &[u8] = &payload;
            let flags = DataFlags::from_bits_truncate(raw_flags);
            let (body, pad_len) = parse_optional_padding_length(body, flags.contains(DataFlags::PADDED))
                .map_err(|_| Http2Error::MalformedPayload("DATA padding length"))?;
            let (data, _padding) = split_padding(body, pad_len)?;
            Ok(Frame::Data {
                stream_id,
                flags,
                payload: DataPayload { pad_length: pad_len, data: payload.slice_ref(data) },
            })
        }
        FrameType::Headers => {
            let body: &[u8] = &payload;
            let flags = HeadersFlags::from_bits_truncate(raw_flags);
            let (body, pad_len) = parse_optional_padding_length(body, flags.contains(HeadersFlags::PADDED))
                .map_err(|_| Http2Error::MalformedPayload("HEADERS padding length"))?;
            let (body, exclusive, stream_dependency, weight) = if flags.contains(HeadersFlags::PRIORITY) {
                let (body, dep_raw) =
                    be_u32(body).map_err(|_: nom::Err<nom::error::Error<&[u8]>>| {
                        Http2Error::MalformedPayload("HEADERS stream dependency")
                    })?;
                let (body, weight) = be_u8(body)
                    .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("HEADERS weight"))?;
                (body, Some(dep_raw & 0x8000_0000 != 0), Some(dep_raw & 0x7fff_ffff), Some(weight))
            } else {
                (body, None, None, None)
            };
            let (fragment, _padding) = split_padding(body, pad_len)?;
            Ok(Frame::Headers {
                stream_id,
                flags,
                payload: HeadersPayload {
                    pad_length: pad_len,
                    stream_dependency,
                    exclusive,
                    weight,
                    header_block_fragment: payload.slice_ref(fragment),
                },
            })
        }
        FrameType::Priority => {
            let body: &[u8] = &payload;
            if body.len() != 5 {
                return Err(Http2Error::FrameSizeError { length: body.len() as u32, max_frame_size: 5 });
            }
            let (body, dep_raw) = be_u32(body)
                .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("PRIORITY"))?;
            let (_, weight) = be_u8(body)
                .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("PRIORITY"))?;
            Ok(Frame::Priority {
                stream_id,
                flags: PriorityFlags::from_bits_truncate(raw_flags),
                payload: PriorityPayload {
                    stream_dependency: dep_raw & 0x7fff_ffff,
                    exclusive: dep_raw & 0x8000_0000 != 0,
                    weight,
                },
            })
        }
        FrameType::RstStream => {
            let body: &[u8] = &payload;
            let (_, error_code) =
                parse_error_code(body).map_err(|_| Http2Error::MalformedPayload("RST_STREAM"))?;
            Ok(Frame::RstStream {
                stream_id,
                flags: RstStreamFlags::from_bits_truncate(raw_flags),
                payload: RstStreamPayload { error_code },
            })
        }
        FrameType::Settings => {
            let body: &[u8] = &payload;
            let flags = SettingsFlags::from_bits_truncate(raw_flags);
            if flags.contains(SettingsFlags::ACK) {
                return Ok(Frame::Settings { flags, payload: SettingsPayload { parameters: Vec::new() } });
            }
            if body.len() % 6 != 0 {
                return Err(Http2Error::FrameSizeError { length: body.len() as u32, max_frame_size: 6 });
            }
            let mut parameters = Vec::with_capacity(body.len() / 6);
            let mut rest = body;
            while !rest.is_empty() {
                let (r, identifier) = be_u16(rest)
                    .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("SETTINGS"))?;
                let (r, value) =
                    be_u32(r).map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("SETTINGS"))?;
                parameters.push(SettingsParameter { identifier, value });
                rest = r;
            }
            Ok(Frame::Settings { flags, payload: SettingsPayload { parameters } })
        }
        FrameType::PushPromise => {
            let body: &[u8] = &payload;
            let flags = PushPromiseFlags::from_bits_truncate(raw_flags);
            let (body, pad_len) =
                parse_optional_padding_length(body, flags.contains(PushPromiseFlags::PADDED))
                    .map_err(|_| Http2Error::MalformedPayload("PUSH_PROMISE padding length"))?;
            let (body, promised_raw) = be_u32(body)
                .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("PUSH_PROMISE"))?;
            let (fragment, _padding) = split_padding(body, pad_len)?;
            Ok(Frame::PushPromise {
                stream_id,
                flags,
                payload: PushPromisePayload {
                    pad_length: pad_len,
                    promised_stream_id: StreamId::new(promised_raw & 0x7fff_ffff),
                    header_block_fragment: payload.slice_ref(fragment),
                },
            })
        }
        FrameType::Ping => {
            let body: &[u8] = &payload;
            if body.len() != 8 {
                return Err(Http2Error::FrameSizeError { length: body.len() as u32, max_frame_size: 8 });
            }
            let (_, opaque_data) =
                be_u64(body).map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("PING"))?;
            Ok(Frame::Ping { flags: PingFlags::from_bits_truncate(raw_flags), payload: PingPayload { opaque_data } })
        }
        FrameType::GoAway => {
            let body: &[u8] = &payload;
            let (body, last_stream_id_raw) = be_u32(body)
                .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("GOAWAY"))?;
            let (debug, error_code) =
                parse_error_code(body).map_err(|_| Http2Error::MalformedPayload("GOAWAY"))?;
            Ok(Frame::GoAway {
                flags: GoAwayFlags::from_bits_truncate(raw_flags),
                payload: GoAwayPayload {
                    last_stream_id: StreamId::new(last_stream_id_raw & 0x7fff_ffff),
                    error_code,
                    debug_data: payload.slice_ref(debug),
                },
            })
        }
        FrameType::WindowUpdate => {
            let body: &[u8] = &payload;
            if body.len() != 4 {
                return Err(Http2Error::FrameSizeError { length: body.len() as u32, max_frame_size: 4 });
            }
            let (_, increment_raw) = be_u32(body)
                .map_err(|_: nom::Err<nom::error::Error<&[u8]>>| Http2Error::MalformedPayload("WINDOW_UPDATE"))?;
            Ok(Frame::WindowUpdate {
                stream_id,
                flags: WindowUpdateFlags::from_bits_truncate(raw_flags),
                payload: WindowUpdatePayload { window_size_increment: increment_raw & 0x7fff_ffff },
            })
        }
        FrameType::Continuation => Ok(Frame::Continuation {
            stream_id,
            flags: ContinuationFlags::from_bits_truncate(raw_flags),
            payload: ContinuationPayload { header_block_fragment: payload.clone() },
        }),
        #[cfg(feature = "rfc7838")]
        FrameType::AltSvc => Ok(Frame::Unknown {
            frame_type: frame_type.into(),
            stream_id,
            flags: UnknownFlags::from_bits_truncate(raw_flags),
            payload,
        }),
        #[cfg(feature = "rfc8336")]
        FrameType::Origin => Ok(Frame::Unknown {
            frame_type: frame_type.into(),
            stream_id,
            flags: UnknownFlags::from_bits_truncate(raw_flags),
            payload,
        }),
        FrameType::Unknown(_) => Ok(Frame::Unknown {
            frame_type: frame_type.into(),
            stream_id,
            flags: UnknownFlags::from_bits_truncate(raw_flags),
            payload,
        }),
    }
}

fn write_header(buf: &mut BytesMut, length: u32, frame_type: u8, flags: u8, stream_id: StreamId) {
    buf.put_u8(((length >> 16) & 0xff) as u8);
    buf.put_u8(((length >> 8) & 0xff) as u8);
    buf.put_u8((length & 0xff) as u8);
    buf.put_u8(frame_type);
    buf.put_u8(flags);
    buf.put_u32(stream_id.value() & 0x7fff_ffff);
}

/// Serializes one frame into a contiguous buffer (header followed by payload).
pub fn encode(frame: &Frame) -> Bytes {
    let mut body = BytesMut::new();
    let frame_type: u8 = frame.frame_type().into();
    let raw_flags: u8;
    let stream_id = frame.stream_id();

    match frame {
        Frame::Data { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_slice(&payload.data);
        }
        Frame::Headers { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_slice(&payload.header_block_fragment);
        }
        Frame::Priority { flags, payload, .. } => {
            raw_flags = flags.bits();
            let dep = (payload.stream_dependency & 0x7fff_ffff)
                | if payload.exclusive { 0x8000_0000 } else { 0 };
            body.put_u32(dep);
            body.put_u8(payload.weight);
        }
        Frame::RstStream { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_u32(payload.error_code.into());
        }
        Frame::Settings { flags, payload } => {
            raw_flags = flags.bits();
            for param in &payload.parameters {
                body.put_u16(param.identifier);
                body.put_u32(param.value);
            }
        }
        Frame::PushPromise { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_u32(payload.promised_stream_id.value() & 0x7fff_ffff);
            body.put_slice(&payload.header_block_fragment);
        }
        Frame::Ping { flags, payload } => {
            raw_flags = flags.bits();
            body.put_u64(payload.opaque_data);
        }
        Frame::GoAway { flags, payload } => {
            raw_flags = flags.bits();
            body.put_u32(payload.last_stream_id.value() & 0x7fff_ffff);
            body.put_u32(payload.error_code.into());
            body.put_slice(&payload.debug_data);
        }
        Frame::WindowUpdate { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_u32(payload.window_size_increment & 0x7fff_ffff);
        }
        Frame::Continuation { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_slice(&payload.header_block_fragment);
        }
        Frame::Unknown { flags, payload, .. } => {
            raw_flags = flags.bits();
            body.put_slice(payload);
        }
    }

    let mut out = BytesMut::with_capacity(9 + body.len());
    write_header(&mut out, body.len() as u32, frame_type, raw_flags, stream_id);
    out.put_slice(&body);
    out.freeze()
}

/// Writes one encoded frame to a blocking writable transport.
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let bytes = encode(frame);
    writer.write_all(&bytes).map_err(Http2Error::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::flags::DataFlags;
    use std::io::Cursor;

    #[test]
    fn round_trip_ping() {
        let frame = Frame::ping(0x0102030405060708, false);
        let bytes = encode(&frame);
        let mut cursor = Cursor::new(bytes.to_vec());
        let decoded = decode_next(&mut cursor, 16384).unwrap();
        match decoded {
            Frame::Ping { payload, flags } => {
                assert_eq!(payload.opaque_data, 0x0102030405060708);
                assert!(!flags.contains(PingFlags::ACK));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn round_trip_data() {
        let frame = Frame::data(StreamId::new(3), Bytes::from_static(b"hello"), true);
        let bytes = encode(&frame);
        let mut cursor = Cursor::new(bytes.to_vec());
        let decoded = decode_next(&mut cursor, 16384).unwrap();
        match decoded {
            Frame::Data { stream_id, flags, payload } => {
                assert_eq!(stream_id.value(), 3);
                assert!(flags.contains(DataFlags::END_STREAM));
                assert_eq!(&payload.data[..], b"hello");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn oversize_frame_is_rejected_before_reading_payload() {
        let mut header = vec![0u8, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
        // length = 0x000100 = 256, but we cap max_frame_size at 16.
        header[0] = 0x00;
        let mut cursor = Cursor::new(header);
        let err = decode_next(&mut cursor, 16).unwrap_err();
        assert!(matches!(err, Http2Error::FrameSizeError { .. }));
    }

    #[test]
    fn settings_ack_has_no_parameters() {
        let frame = Frame::settings_ack();
        let bytes = encode(&frame);
        let mut cursor = Cursor::new(bytes.to_vec());
        let decoded = decode_next(&mut cursor, 16384).unwrap();
        match decoded {
            Frame::Settings { flags, payload } => {
                assert!(flags.contains(SettingsFlags::ACK));
                assert!(payload.parameters.is_empty());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn goaway_round_trip_preserves_debug_data() {
        let frame = Frame::go_away(StreamId::new(7), ErrorCode::PROTOCOL_ERROR, Bytes::from_static(b"oops"));
        let bytes = encode(&frame);
        let mut cursor = Cursor::new(bytes.to_vec());
        let decoded = decode_next(&mut cursor, 16384).unwrap();
        match decoded {
            Frame::GoAway { payload, .. } => {
                assert_eq!(payload.last_stream_id.value(), 7);
                assert_eq!(&payload.debug_data[..], b"oops");
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
