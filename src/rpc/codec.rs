//! Frame codec.
//!
//! Each frame is a 4-byte big-endian body length followed by a JSON body.
//! The same codec type serves both directions: the server decodes
//! [`RequestFrame`]s and encodes [`ResponseFrame`]s, the client the reverse.

use super::{RequestFrame, ResponseFrame};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Length prefix size.
pub const HEADER_LEN: usize = 4;

/// Result of decoding a frame from the wire.
#[derive(Debug)]
pub enum DecodeResult<T> {
    /// A complete frame was decoded.
    Complete(T),
    /// More data is needed to complete the frame.
    Incomplete,
    /// The input is invalid.
    Invalid(String),
}

/// Result of encoding a frame to the wire.
#[derive(Debug)]
pub enum EncodeResult {
    /// Successfully encoded.
    Ok(Bytes),
    /// Encoding failed.
    Error(String),
}

/// Trait for frame codecs.
pub trait ProtocolCodec: Send + Sync {
    /// Frame type decoded from the wire.
    type Inbound;

    /// Frame type encoded to the wire.
    type Outbound;

    /// Attempt to decode one frame from the buffer.
    ///
    /// On `Complete`, the decoded bytes are consumed from the buffer.
    fn decode(&self, buffer: &mut BytesMut) -> DecodeResult<Self::Inbound>;

    /// Encode one frame.
    fn encode(&self, frame: &Self::Outbound) -> EncodeResult;

    /// Get the protocol name.
    fn protocol_name(&self) -> &'static str;
}

/// Length-prefixed JSON codec.
#[derive(Debug)]
pub struct JsonFrameCodec<In, Out> {
    max_frame_bytes: usize,
    _frames: PhantomData<fn(In) -> Out>,
}

/// Server side: decode requests, encode responses.
pub type ServerCodec = JsonFrameCodec<RequestFrame, ResponseFrame>;

/// Client side: decode responses, encode requests.
pub type ClientCodec = JsonFrameCodec<ResponseFrame, RequestFrame>;

impl<In, Out> JsonFrameCodec<In, Out> {
    /// Create a codec rejecting bodies over `max_frame_bytes`.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            _frames: PhantomData,
        }
    }

    /// Largest accepted body.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl<In, Out> ProtocolCodec for JsonFrameCodec<In, Out>
where
    In: DeserializeOwned,
    Out: Serialize,
{
    type Inbound = In;
    type Outbound = Out;

    fn decode(&self, buffer: &mut BytesMut) -> DecodeResult<In> {
        if buffer.len() < HEADER_LEN {
            return DecodeResult::Incomplete;
        }

        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        if len > self.max_frame_bytes {
            return DecodeResult::Invalid(format!(
                "frame of {} bytes exceeds limit of {}",
                len, self.max_frame_bytes
            ));
        }

        if buffer.len() < HEADER_LEN + len {
            buffer.reserve(HEADER_LEN + len - buffer.len());
            return DecodeResult::Incomplete;
        }

        buffer.advance(HEADER_LEN);
        let body = buffer.split_to(len);
        match serde_json::from_slice(&body) {
            Ok(frame) => DecodeResult::Complete(frame),
            Err(e) => DecodeResult::Invalid(format!("malformed frame body: {}", e)),
        }
    }

    fn encode(&self, frame: &Out) -> EncodeResult {
        let body = match serde_json::to_vec(frame) {
            Ok(body) => body,
            Err(e) => return EncodeResult::Error(format!("failed to encode frame: {}", e)),
        };
        if body.len() > self.max_frame_bytes {
            return EncodeResult::Error(format!(
                "frame of {} bytes exceeds limit of {}",
                body.len(),
                self.max_frame_bytes
            ));
        }

        let mut out = BytesMut::with_capacity(HEADER_LEN + body.len());
        out.put_u32(body.len() as u32);
        out.put_slice(&body);
        EncodeResult::Ok(out.freeze())
    }

    fn protocol_name(&self) -> &'static str {
        "scopestore-json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::StoreError;
    use crate::rpc::{Reply, Request};
    use crate::store::scope::{Location, ScopeLocator};

    fn request_frame(id: u64) -> RequestFrame {
        RequestFrame {
            id,
            timeout_ms: Some(250),
            request: Request::KvGet {
                location: Location::new(ScopeLocator::bridge("b"), "k"),
            },
        }
    }

    fn encoded(frame: &RequestFrame) -> Bytes {
        match ClientCodec::new(1 << 20).encode(frame) {
            EncodeResult::Ok(bytes) => bytes,
            EncodeResult::Error(e) => panic!("encode failed: {e}"),
        }
    }

    #[test]
    fn test_decode_waits_for_full_frame() {
        let codec = ServerCodec::new(1 << 20);
        let bytes = encoded(&request_frame(1));

        let mut buffer = BytesMut::from(&bytes[..3]);
        assert!(matches!(codec.decode(&mut buffer), DecodeResult::Incomplete));

        buffer.extend_from_slice(&bytes[3..bytes.len() - 1]);
        assert!(matches!(codec.decode(&mut buffer), DecodeResult::Incomplete));

        buffer.extend_from_slice(&bytes[bytes.len() - 1..]);
        match codec.decode(&mut buffer) {
            DecodeResult::Complete(frame) => assert_eq!(frame, request_frame(1)),
            other => panic!("expected frame, got {other:?}"),
        }
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_pipelined_frames() {
        let codec = ServerCodec::new(1 << 20);
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&encoded(&request_frame(1)));
        buffer.extend_from_slice(&encoded(&request_frame(2)));

        let mut ids = Vec::new();
        while let DecodeResult::Complete(frame) = codec.decode(&mut buffer) {
            ids.push(frame.id);
        }
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let codec = ServerCodec::new(16);
        let mut buffer = BytesMut::new();
        buffer.put_u32(1_000);
        buffer.put_slice(b"{}");
        assert!(matches!(codec.decode(&mut buffer), DecodeResult::Invalid(_)));
    }

    #[test]
    fn test_malformed_body_is_consumed() {
        let codec = ServerCodec::new(1 << 20);
        let mut buffer = BytesMut::new();
        buffer.put_u32(5);
        buffer.put_slice(b"nope!");
        buffer.extend_from_slice(&encoded(&request_frame(3)));

        assert!(matches!(codec.decode(&mut buffer), DecodeResult::Invalid(_)));
        assert!(matches!(
            codec.decode(&mut buffer),
            DecodeResult::Complete(RequestFrame { id: 3, .. })
        ));
    }

    #[test]
    fn test_response_roundtrip() {
        let server = ServerCodec::new(1 << 20);
        let client = ClientCodec::new(1 << 20);
        let frame = ResponseFrame {
            id: 4,
            result: Err(StoreError::Expired {
                token: "global.k".into(),
            }),
        };
        let bytes = match server.encode(&frame) {
            EncodeResult::Ok(bytes) => bytes,
            EncodeResult::Error(e) => panic!("{e}"),
        };
        let mut buffer = BytesMut::from(&bytes[..]);
        match client.decode(&mut buffer) {
            DecodeResult::Complete(back) => assert_eq!(back, frame),
            other => panic!("expected frame, got {other:?}"),
        }

        let ok = ResponseFrame {
            id: 5,
            result: Ok(Reply::Count(3)),
        };
        assert!(matches!(server.encode(&ok), EncodeResult::Ok(_)));
        assert_eq!(server.protocol_name(), "scopestore-json");
    }
}
