//! Transport abstraction traits for hula.
//!
//! A [`Connection`] is one end of the shared duplex channel. Implementations
//! map their native message types onto protocol frames, remembering which
//! encoding each inbound frame used so replies can match it.

use async_trait::async_trait;
use bytes::BytesMut;
use hula_protocol::{codec, Encoding, Frame, ProtocolError};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a connection ID unique within this process.
    #[must_use]
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Failed to establish a connection.
    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A message could not be decoded into a frame.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the connection can keep going after this error.
    ///
    /// Malformed messages are dropped; everything else ends the connection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Protocol(_))
    }

    /// Whether a message was rejected for exceeding the size limit.
    ///
    /// The frame inside is lost unread, including any call id it carried.
    #[must_use]
    pub fn is_oversized(&self) -> bool {
        matches!(self, TransportError::Protocol(ProtocolError::FrameTooLarge(_)))
    }
}

/// A frame received from a peer, with the encoding it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    /// The decoded frame.
    pub frame: Frame,
    /// How it was encoded.
    pub encoding: Encoding,
}

/// An active connection over a duplex channel.
#[async_trait]
pub trait Connection: Send {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Receive the next frame.
    ///
    /// Returns `None` if the connection is closed cleanly.
    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError>;

    /// Send a frame in the given encoding.
    async fn send(&mut self, frame: &Frame, encoding: Encoding) -> Result<(), TransportError>;

    /// Close the connection gracefully.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Get the remote address of the connection, if available.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    /// Check if the connection is still open.
    fn is_open(&self) -> bool;
}

/// Establishes client connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;
}

/// An encoded outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outgoing {
    Text(String),
    Binary(Vec<u8>),
}

/// Encode a frame for the wire.
pub(crate) fn encode_frame(frame: &Frame, encoding: Encoding) -> Result<Outgoing, ProtocolError> {
    match encoding {
        Encoding::Text => Ok(Outgoing::Text(codec::encode_text(frame)?)),
        Encoding::Binary => Ok(Outgoing::Binary(codec::encode(frame)?.to_vec())),
    }
}

/// Append binary data to a read buffer and try to pull one frame out.
///
/// On a decode error the buffer is cleared, since its framing is lost.
pub(crate) fn decode_binary(
    buffer: &mut BytesMut,
    data: &[u8],
    max_message_size: usize,
) -> Result<Option<Incoming>, TransportError> {
    if data.len() > max_message_size {
        return Err(ProtocolError::FrameTooLarge(data.len()).into());
    }

    buffer.extend_from_slice(data);
    match codec::decode_from(buffer) {
        Ok(frame) => Ok(frame.map(|frame| Incoming {
            frame,
            encoding: Encoding::Binary,
        })),
        Err(e) => {
            buffer.clear();
            Err(e.into())
        }
    }
}

/// Decode a text message into a frame.
pub(crate) fn decode_text(text: &str, max_message_size: usize) -> Result<Incoming, TransportError> {
    if text.len() > max_message_size {
        return Err(ProtocolError::FrameTooLarge(text.len()).into());
    }

    Ok(Incoming {
        frame: codec::decode_text(text)?,
        encoding: Encoding::Text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_encode_matches_encoding() {
        let frame = Frame::hello(1);

        match encode_frame(&frame, Encoding::Text).unwrap() {
            Outgoing::Text(text) => assert!(text.contains("\"connectionOrdinal\":1")),
            other => panic!("Expected text, got {:?}", other),
        }
        assert!(matches!(
            encode_frame(&frame, Encoding::Binary).unwrap(),
            Outgoing::Binary(_)
        ));
    }

    #[test]
    fn test_decode_binary_in_pieces() {
        let encoded = codec::encode(&Frame::reload()).unwrap();
        let mut buffer = BytesMut::new();

        assert!(decode_binary(&mut buffer, &encoded[..3], 1024).unwrap().is_none());
        let incoming = decode_binary(&mut buffer, &encoded[3..], 1024).unwrap().unwrap();
        assert_eq!(incoming.frame, Frame::reload());
        assert_eq!(incoming.encoding, Encoding::Binary);
    }

    #[test]
    fn test_oversized_text_is_recoverable() {
        let err = decode_text(&"x".repeat(64), 16).unwrap_err();
        assert!(err.is_recoverable());
        assert!(err.is_oversized());
        assert!(!TransportError::ConnectionClosed.is_recoverable());
        assert!(!decode_text("{", 16).unwrap_err().is_oversized());
    }
}
