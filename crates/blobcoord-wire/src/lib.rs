//! Wire codec: length-prefixed framing plus the request/response shapes
//! for the Get family of operations.
//!
//! Frames are `postcard`-encoded with a 4-byte big-endian length prefix,
//! the same shape a `BytesMut`-based connection buffer decodes
//! incrementally as more bytes arrive off the socket.

use blobcoord_types::{BlobId, ClientId, CorrelationId, GetFlags, MessageInfo, PartitionId, ServerErrorCode};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Header size: a 4-byte big-endian payload length.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Largest frame this codec will decode. Anything larger is treated as a
/// corrupt or hostile frame rather than buffered indefinitely.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame exceeds maximum size: {0} bytes")]
    FrameTooLarge(usize),
    #[error("malformed frame: {0}")]
    Codec(#[from] postcard::Error),
    #[error("message_info_list has {0} entries, expected exactly 1")]
    NotSingleMessage(usize),
}

pub type WireResult<T> = Result<T, WireError>;

/// A single decoded (or to-be-encoded) wire frame: just the raw payload
/// bytes, header already stripped (or not yet attached).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub payload: Bytes,
}

impl Frame {
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Attempts to decode one length-prefixed frame from the front of
    /// `buf`, advancing it past the frame on success. Returns `Ok(None)`
    /// if fewer than a full frame's worth of bytes are buffered yet —
    /// callers should read more off the socket and retry.
    pub fn decode(buf: &mut BytesMut) -> WireResult<Option<Frame>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes(buf[0..FRAME_HEADER_SIZE].try_into().unwrap()) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge(len));
        }
        if buf.len() < FRAME_HEADER_SIZE + len {
            return Ok(None);
        }
        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(len).freeze();
        Ok(Some(Frame::new(payload)))
    }

    /// Appends this frame's length-prefixed encoding to `buf`.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Encodes a serializable value directly into a length-prefixed frame.
    pub fn encode_value<T: Serialize>(value: &T) -> WireResult<Frame> {
        let bytes = postcard::to_allocvec(value)?;
        Ok(Frame::new(Bytes::from(bytes)))
    }

    /// Decodes this frame's payload as a `T`.
    pub fn decode_value<T: for<'de> Deserialize<'de>>(&self) -> WireResult<T> {
        Ok(postcard::from_bytes(&self.payload)?)
    }
}

/// Get-family wire request. Always carries exactly one blob id — the
/// server expects a list for protocol uniformity with batched operations
/// this coordinator does not implement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    pub correlation_id: CorrelationId,
    pub client_id: ClientId,
    pub flags: GetFlags,
    pub partition_id: PartitionId,
    pub blob_ids: Vec<BlobId>,
}

impl GetRequest {
    /// Builds a single-blob Get request, as every dispatched attempt does.
    pub fn single(
        correlation_id: CorrelationId,
        client_id: ClientId,
        flags: GetFlags,
        partition_id: PartitionId,
        blob_id: BlobId,
    ) -> Self {
        Self {
            correlation_id,
            client_id,
            flags,
            partition_id,
            blob_ids: vec![blob_id],
        }
    }
}

/// Get-family wire response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetResponse {
    pub correlation_id: CorrelationId,
    pub server_error_code: ServerErrorCode,
    pub message_info_list: Vec<MessageInfo>,
    pub payload: Option<Bytes>,
    pub user_metadata: Option<Bytes>,
}

impl GetResponse {
    /// Validates that exactly one message is present, as spec'd: a Get
    /// response's `message_info_list` must have size 1 on success.
    pub fn single_message(&self) -> WireResult<&MessageInfo> {
        match self.message_info_list.as_slice() {
            [info] => Ok(info),
            other => Err(WireError::NotSingleMessage(other.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> GetRequest {
        GetRequest::single(
            CorrelationId(1),
            ClientId(7),
            GetFlags::Blob,
            PartitionId(3),
            BlobId::from_partition_and_local(PartitionId(3), 99),
        )
    }

    #[test]
    fn frame_round_trips_a_request() {
        let request = sample_request();
        let frame = Frame::encode_value(&request).unwrap();
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);

        let decoded = Frame::decode(&mut buf).unwrap().expect("frame should be complete");
        let decoded_request: GetRequest = decoded.decode_value().unwrap();
        assert_eq!(decoded_request, request);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_returns_none_on_partial_header() {
        let mut buf = BytesMut::from(&b"\x00\x00"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_returns_none_on_partial_body() {
        let mut buf = BytesMut::new();
        buf.put_u32(10);
        buf.put_slice(b"short");
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_oversized_frame() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);
        let err = Frame::decode(&mut buf).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge(_)));
    }

    #[test]
    fn single_message_rejects_wrong_count() {
        let response = GetResponse {
            correlation_id: CorrelationId(1),
            server_error_code: ServerErrorCode::NoError,
            message_info_list: vec![],
            payload: None,
            user_metadata: None,
        };
        assert!(matches!(
            response.single_message(),
            Err(WireError::NotSingleMessage(0))
        ));
    }

    #[test]
    fn single_message_accepts_exactly_one() {
        let info = MessageInfo {
            blob_id: BlobId::from_partition_and_local(PartitionId(1), 1),
            size: 10,
            expiration_time_ms: None,
        };
        let response = GetResponse {
            correlation_id: CorrelationId(1),
            server_error_code: ServerErrorCode::NoError,
            message_info_list: vec![info.clone()],
            payload: Some(Bytes::from_static(b"hello")),
            user_metadata: None,
        };
        assert_eq!(response.single_message().unwrap(), &info);
    }
}
