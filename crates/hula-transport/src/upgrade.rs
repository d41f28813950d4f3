//! Connection adapter for WebSockets upgraded by axum.
//!
//! The server accepts channel clients through an axum route; this wraps the
//! upgraded socket so the server loop only sees [`Connection`].

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use hula_protocol::{Encoding, Frame};
use tracing::{debug, warn};

use crate::traits::{
    decode_binary, decode_text, encode_frame, Connection, ConnectionId, Incoming, Outgoing,
    TransportError,
};

/// An axum WebSocket as a hula connection.
pub struct UpgradedConnection {
    id: ConnectionId,
    socket: WebSocket,
    remote_addr: Option<String>,
    is_open: bool,
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl UpgradedConnection {
    /// Wrap an upgraded socket.
    #[must_use]
    pub fn new(socket: WebSocket, max_message_size: usize) -> Self {
        Self {
            id: ConnectionId::generate(),
            socket,
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
impl Connection for UpgradedConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    return decode_text(&text, self.max_message_size).map(Some);
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Some(incoming) =
                        decode_binary(&mut self.read_buffer, &data, self.max_message_size)?
                    {
                        return Ok(Some(incoming));
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = self.socket.send(Message::Pong(data)).await {
                        warn!(connection = %self.id, "Failed to send pong: {}", e);
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection = %self.id, "WebSocket closed by peer");
                    self.is_open = false;
                    return Ok(None);
                }
                Some(Err(e)) => {
                    warn!(connection = %self.id, error = %e, "WebSocket error");
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

        self.socket
            .send(message)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if !std::mem::replace(&mut self.is_open, false) {
            return Ok(());
        }

        self.socket
            .send(Message::Close(None))
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
