//! Codecs for encoding and decoding hula frames.
//!
//! Two encodings are supported on the same channel:
//!
//! - **Text** - a single JSON document per message, the default for browsers.
//! - **Binary** - MessagePack with a big-endian length prefix, for native peers.
//!
//! A peer answers in the encoding the other side used.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Maximum frame size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// The two wire encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// JSON text messages.
    #[default]
    Text,
    /// Length-prefixed MessagePack binary messages.
    Binary,
}

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a frame to a JSON text message.
///
/// # Errors
///
/// Returns an error if the frame is too large or serialization fails.
pub fn encode_text(frame: &Frame) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(frame)?;

    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode a frame from a JSON text message.
///
/// # Errors
///
/// Returns an error if the message is too large or is not a valid frame.
pub fn decode_text(text: &str) -> Result<Frame, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }

    Ok(serde_json::from_str(text)?)
}

/// Encode a frame to bytes.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded frame
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::new();
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<(), ProtocolError> {
    let payload = rmp_serde::to_vec_named(frame)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(&payload);

    Ok(())
}

/// Decode a frame from bytes.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
    }

    let length = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if data.len() < total_size {
        return Err(ProtocolError::Incomplete(total_size - data.len()));
    }

    Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
}

/// Try to decode a frame from a buffer, advancing it if successful.
///
/// Returns `Ok(Some(frame))` if a complete frame was decoded,
/// `Ok(None)` if more data is needed, or `Err` on protocol error.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return Ok(None);
    }

    let length = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    if length > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(length));
    }

    let total_size = LENGTH_PREFIX_SIZE + length;
    if buf.len() < total_size {
        return Ok(None);
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    let payload = buf.split_to(length);
    let frame = rmp_serde::from_slice(&payload)?;

    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{Call, Query, Response};
    use serde_json::json;

    #[test]
    fn test_text_decode_call() {
        let frame = decode_text(
            r#"{"type":"call","id":4,"path":"/todo/list","query":{"page":"2"},"parents":true}"#,
        )
        .unwrap();

        let mut query = Query::new();
        query.insert("page".to_string(), json!("2"));
        assert_eq!(frame, Frame::call(4, "/todo/list", query, true));
    }

    #[test]
    fn test_text_rejects_unknown_type() {
        match decode_text(r#"{"type":"subscribe","id":1}"#) {
            Err(ProtocolError::Json(_)) => {}
            other => panic!("Expected Json error, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_response_with_json_result() {
        let call = Call::new(12, "/todo", Query::new(), false);
        let frame = Frame::Response(Response::success(
            call,
            json!({ "html": "<div></div>", "count": 2 }),
        ));

        let encoded = encode(&frame).unwrap();
        assert_eq!(decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&Frame::hello(1)).unwrap();

        match decode(&encoded[..5]) {
            Err(ProtocolError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let call = Call::new(1, "x".repeat(MAX_FRAME_SIZE + 1), Query::new(), false);

        match encode(&Frame::Call(call)) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_streaming_decode() {
        let frame1 = Frame::hello(0);
        let frame2 = Frame::reload();

        let mut buf = BytesMut::new();
        encode_into(&frame1, &mut buf).unwrap();
        encode_into(&frame2, &mut buf).unwrap();

        assert_eq!(decode_from(&mut buf).unwrap().unwrap(), frame1);
        assert_eq!(decode_from(&mut buf).unwrap().unwrap(), frame2);
        assert!(buf.is_empty());
    }
}
