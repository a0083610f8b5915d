//! Header compression and the per-stream sequencing that keeps a `HEADERS`
//! frame and its trailing `CONTINUATION`s atomic: no other frame may be
//! interleaved on any stream until `END_HEADERS` arrives (section 6.10).

use bytes::Bytes;

use crate::error::{Http2Error, Result};
use crate::frame::types::StreamId;

/// A decoded header field. HTTP/2 headers are opaque byte strings at the
/// framing layer; pseudo-header validation (`:method`, `:path`, ...) is an
/// HTTP semantics concern this engine doesn't interpret.
pub type HeaderField = (Vec<u8>, Vec<u8>);

/// The header-compression collaborator a session is generic over. Kept
/// as a trait so the dynamic table's lifetime and any embedder-specific
/// size limits stay outside this crate.
pub trait HeaderCodec: Send {
    fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>>;
    fn encode(&mut self, headers: &[HeaderField]) -> Vec<u8>;

    /// Applies a peer-advertised `SETTINGS_HEADER_TABLE_SIZE`.
    fn set_max_dynamic_table_size(&mut self, size: usize);
}

/// The default codec, backed by the `hpack` crate's encoder/decoder pair.
pub struct HpackCodec {
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
}

impl HpackCodec {
    pub fn new() -> Self {
        HpackCodec { encoder: hpack::Encoder::new(), decoder: hpack::Decoder::new() }
    }
}

impl Default for HpackCodec {
    fn default() -> Self {
        HpackCodec::new()
    }
}

impl HeaderCodec for HpackCodec {
    fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        self.decoder
            .decode(block)
            .map(|fields| fields.into_iter().map(|(n, v)| (n.to_vec(), v.to_vec())).collect())
            .map_err(|e| Http2Error::CompressionError(format!("{:?}", e)))
    }

    fn encode(&mut self, headers: &[HeaderField]) -> Vec<u8> {
        self.encoder.encode(headers.iter().map(|(n, v)| (n.as_slice(), v.as_slice())))
    }

    fn set_max_dynamic_table_size(&mut self, size: usize) {
        self.decoder.set_max_table_size(size);
    }
}

/// Which kind of header block a sequence was opened for — a regular request/
/// response `HEADERS`, or the promised-stream headers that follow a
/// `PUSH_PROMISE`. The dispatcher needs this to know what to do with the
/// assembled block: attach it to a stream, or extract `:path` into the
/// promised-resource map.
///
/// `PushPromise` carries the *promised* stream id. The block itself is still
/// keyed and sequenced by the frame's own stream id — the stream the promise
/// is associated with, which is what any trailing `CONTINUATION` carries in
/// its frame header (section 6.10) — so the promised id has to ride along in
/// the kind instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Headers,
    PushPromise(StreamId),
}

/// The in-progress header block for one stream: every fragment seen since
/// the opening `HEADERS`/`PUSH_PROMISE`, until `END_HEADERS` closes it out.
struct PendingBlock {
    fragments: Vec<Bytes>,
}

/// Enforces that a `HEADERS`/`PUSH_PROMISE` block and its trailing
/// `CONTINUATION`s are atomic for the *whole connection*: while one is open,
/// no frame for any other stream — header-related or not — may be
/// dispatched (section 6.10). There is only ever one open block at a time.
#[derive(Default)]
pub struct HeaderSequencer {
    pending: Option<(StreamId, BlockKind, PendingBlock)>,
}

impl HeaderSequencer {
    pub fn new() -> Self {
        HeaderSequencer { pending: None }
    }

    /// Whether the connection currently has an open header block — while
    /// true, the dispatcher must reject any frame that isn't a
    /// `CONTINUATION` for [`HeaderSequencer::blocked_stream`].
    pub fn is_mid_block(&self) -> bool {
        self.pending.is_some()
    }

    pub fn blocked_stream(&self) -> Option<StreamId> {
        self.pending.as_ref().map(|(id, _, _)| *id)
    }

    /// Begins a header block for `stream_id` with its first fragment. If
    /// `end_headers` is set the block is already complete.
    pub fn begin(&mut self, stream_id: StreamId, kind: BlockKind, fragment: Bytes, end_headers: bool) -> Result<Option<Bytes>> {
        if self.pending.is_some() {
            return Err(Http2Error::ProtocolError("HEADERS while another header block is open"));
        }
        if end_headers {
            return Ok(Some(fragment));
        }
        self.pending = Some((stream_id, kind, PendingBlock { fragments: vec![fragment] }));
        Ok(None)
    }

    /// Appends a `CONTINUATION` fragment. Returns the fully assembled block,
    /// tagged with the kind it was opened as, once `end_headers` is set.
    pub fn append(&mut self, stream_id: StreamId, fragment: Bytes, end_headers: bool) -> Result<Option<(BlockKind, Bytes)>> {
        let (open_id, _kind, block) = self
            .pending
            .as_mut()
            .ok_or(Http2Error::ProtocolError("CONTINUATION with no open header block"))?;
        if *open_id != stream_id {
            return Err(Http2Error::ProtocolError("CONTINUATION for a different stream than the open block"));
        }
        block.fragments.push(fragment);
        if !end_headers {
            return Ok(None);
        }
        let (_, kind, block) = self.pending.take().unwrap();
        let total: usize = block.fragments.iter().map(|f| f.len()).sum();
        let mut joined = Vec::with_capacity(total);
        for fragment in block.fragments {
            joined.extend_from_slice(&fragment);
        }
        Ok(Some((kind, Bytes::from(joined))))
    }
}

/// The connection-wide HPACK state plus the single header sequencer that
/// enforces atomicity across every stream, matching section 4.3's
/// requirement that the dynamic table (and therefore header-block framing)
/// is connection-wide, not per-stream.
pub struct ConnectionHeaders<C: HeaderCodec> {
    codec: C,
    sequencer: HeaderSequencer,
}

impl<C: HeaderCodec> ConnectionHeaders<C> {
    pub fn new(codec: C) -> Self {
        ConnectionHeaders { codec, sequencer: HeaderSequencer::new() }
    }

    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>> {
        self.codec.decode(block)
    }

    pub fn encode(&mut self, headers: &[HeaderField]) -> Vec<u8> {
        self.codec.encode(headers)
    }

    pub fn set_max_dynamic_table_size(&mut self, size: usize) {
        self.codec.set_max_dynamic_table_size(size);
    }

    pub fn is_mid_block(&self) -> bool {
        self.sequencer.is_mid_block()
    }

    pub fn blocked_stream(&self) -> Option<StreamId> {
        self.sequencer.blocked_stream()
    }

    pub fn begin(&mut self, stream_id: StreamId, kind: BlockKind, fragment: Bytes, end_headers: bool) -> Result<Option<Bytes>> {
        self.sequencer.begin(stream_id, kind, fragment, end_headers)
    }

    pub fn append(&mut self, stream_id: StreamId, fragment: Bytes, end_headers: bool) -> Result<Option<(BlockKind, Bytes)>> {
        self.sequencer.append(stream_id, fragment, end_headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_headers_frame_with_end_headers_completes_immediately() {
        let mut seq = HeaderSequencer::new();
        let block = seq.begin(StreamId::new(1), BlockKind::Headers, Bytes::from_static(b"abc"), true).unwrap();
        assert_eq!(block.unwrap(), Bytes::from_static(b"abc"));
        assert!(!seq.is_mid_block());
    }

    #[test]
    fn continuation_assembles_fragments_in_order() {
        let mut seq = HeaderSequencer::new();
        assert!(seq.begin(StreamId::new(1), BlockKind::Headers, Bytes::from_static(b"ab"), false).unwrap().is_none());
        assert!(seq.is_mid_block());
        let (kind, block) = seq.append(StreamId::new(1), Bytes::from_static(b"cd"), true).unwrap().unwrap();
        assert_eq!(kind, BlockKind::Headers);
        assert_eq!(block, Bytes::from_static(b"abcd"));
        assert!(!seq.is_mid_block());
    }

    #[test]
    fn interleaved_headers_on_another_stream_is_rejected() {
        let mut seq = HeaderSequencer::new();
        seq.begin(StreamId::new(1), BlockKind::Headers, Bytes::from_static(b"ab"), false).unwrap();
        let err = seq.begin(StreamId::new(3), BlockKind::Headers, Bytes::from_static(b"xy"), true).unwrap_err();
        assert!(matches!(err, Http2Error::ProtocolError(_)));
    }

    #[test]
    fn continuation_for_wrong_stream_is_rejected() {
        let mut seq = HeaderSequencer::new();
        seq.begin(StreamId::new(1), BlockKind::Headers, Bytes::from_static(b"ab"), false).unwrap();
        let err = seq.append(StreamId::new(3), Bytes::from_static(b"xy"), true).unwrap_err();
        assert!(matches!(err, Http2Error::ProtocolError(_)));
    }

    #[test]
    fn push_promise_block_is_tagged_accordingly() {
        // The block is sequenced under the associated stream (1), the one
        // that sent PUSH_PROMISE, not the promised stream (2) — a trailing
        // CONTINUATION carries the associated stream's id in its frame header.
        let mut seq = HeaderSequencer::new();
        seq.begin(StreamId::new(1), BlockKind::PushPromise(StreamId::new(2)), Bytes::from_static(b"ab"), false).unwrap();
        assert_eq!(seq.blocked_stream(), Some(StreamId::new(1)));
        let (kind, block) = seq.append(StreamId::new(1), Bytes::from_static(b"cd"), true).unwrap().unwrap();
        assert_eq!(kind, BlockKind::PushPromise(StreamId::new(2)));
        assert_eq!(block, Bytes::from_static(b"abcd"));
    }

    #[test]
    fn hpack_round_trip_preserves_header_fields() {
        let mut codec = HpackCodec::new();
        let headers: Vec<HeaderField> = vec![
            (b":method".to_vec(), b"GET".to_vec()),
            (b":path".to_vec(), b"/".to_vec()),
        ];
        let encoded = codec.encode(&headers);
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, headers);
    }
}
