//! WebSocket transport implementation.
//!
//! This module provides a WebSocket connection using tokio-tungstenite, and
//! the [`WebSocketConnector`] a client uses to dial a hula server.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use hula_protocol::{Encoding, Frame};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::traits::{
    decode_binary, decode_text, encode_frame, Connection, ConnectionId, Connector, Incoming,
    Outgoing, TransportError,
};

/// Default maximum message size (64 KiB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// A WebSocket connection over any byte stream.
pub struct WebSocketConnection<S> {
    id: ConnectionId,
    stream: WebSocketStream<S>,
    remote_addr: Option<String>,
    is_open: bool,
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl<S> WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wrap an established WebSocket stream.
    #[must_use]
    pub fn new(stream: WebSocketStream<S>, max_message_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            remote_addr: None,
            is_open: true,
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }

    /// Record the peer address.
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }
}

#[async_trait]
impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_text(&text, self.max_message_size).map(Some);
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Some(incoming) =
                        decode_binary(&mut self.read_buffer, &data, self.max_message_size)?
                    {
                        return Ok(Some(incoming));
                    }
                    // Need more data, continue reading
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        warn!(connection = %self.id, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) => {
                    debug!(connection = %self.id, "Received close frame");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(WsError::ConnectionClosed)) | None => {
                    debug!(connection = %self.id, "WebSocket stream ended");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    error!(connection = %self.id, "WebSocket error: {}", e);
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    async fn send(&mut self, frame: &Frame, encoding: Encoding) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }

        let message = match encode_frame(frame, encoding)? {
            Outgoing::Text(text) => Message::Text(text),
            Outgoing::Binary(data) => Message::Binary(data),
        };

        self.stream
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(()); // Already closed
        }

        self.stream
            .close(None)
            .await
            .map_err(|e| TransportError::SendFailed(format!("Failed to close: {}", e)))
    }

    fn remote_addr(&self) -> Option<String> {
        self.remote_addr.clone()
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

/// Dials a hula server over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    max_message_size: usize,
}

impl WebSocketConnector {
    /// Create a connector for a `ws://` or `wss://` URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// The URL this connector dials.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let (stream, _response) = connect_async(self.url.as_str()).await.map_err(|e| {
            TransportError::ConnectFailed(format!("WebSocket handshake with {} failed: {}", self.url, e))
        })?;

        info!(url = %self.url, "WebSocket connected");

        let connection = WebSocketConnection::new(stream, self.max_message_size)
            .with_remote_addr(self.url.clone());
        Ok(Box::new(connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (
        WebSocketConnection<tokio::io::DuplexStream>,
        WebSocketConnection<tokio::io::DuplexStream>,
    ) {
        let (a, b) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (
            WebSocketConnection::new(client, DEFAULT_MAX_MESSAGE_SIZE),
            WebSocketConnection::new(server, DEFAULT_MAX_MESSAGE_SIZE),
        )
    }

    #[test]
    fn test_connector_defaults() {
        let connector = WebSocketConnector::new("ws://127.0.0.1:3000/ws");
        assert_eq!(connector.url(), "ws://127.0.0.1:3000/ws");
        assert_eq!(connector.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
    }

    #[tokio::test]
    async fn test_frames_keep_their_encoding() {
        let (mut client, mut server) = pair().await;

        client.send(&Frame::hello(0), Encoding::Text).await.unwrap();
        client.send(&Frame::hello(1), Encoding::Binary).await.unwrap();

        let first = server.recv().await.unwrap().unwrap();
        assert_eq!(first.frame, Frame::hello(0));
        assert_eq!(first.encoding, Encoding::Text);

        let second = server.recv().await.unwrap().unwrap();
        assert_eq!(second.frame, Frame::hello(1));
        assert_eq!(second.encoding, Encoding::Binary);
    }

    #[tokio::test]
    async fn test_malformed_text_is_recoverable() {
        let (mut client, mut server) = pair().await;

        client
            .stream
            .send(Message::Text("{\"type\":\"nonsense\"}".to_string()))
            .await
            .unwrap();
        client.send(&Frame::reload(), Encoding::Text).await.unwrap();

        let err = server.recv().await.unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(server.recv().await.unwrap().unwrap().frame, Frame::reload());
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (mut client, mut server) = pair().await;

        client.close().await.unwrap();
        assert!(!client.is_open());
        assert!(server.recv().await.unwrap().is_none());
        assert!(matches!(
            client.send(&Frame::reload(), Encoding::Text).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
