//! # hula-transport
//!
//! The duplex channel between a hula client and server.
//!
//! - **Connection** - One end of a channel, carrying protocol frames
//! - **UpgradedConnection** - Server side, over a socket upgraded by axum
//! - **WebSocketConnector** - Client side, dialing with tokio-tungstenite
//! - **ChannelClient** - Correlates concurrent calls over one connection
//!
//! Frames may arrive as JSON text or as length-prefixed msgpack binary;
//! every [`Incoming`] frame records which, so replies go back the same way.
//!
//! ```rust,ignore
//! use hula_transport::{ChannelClient, ClientConfig, WebSocketConnector};
//!
//! let client = ChannelClient::spawn(
//!     WebSocketConnector::new("ws://127.0.0.1:3000/ws"),
//!     ClientConfig::default(),
//! );
//! let html = client.call("/todo/list", Default::default(), false).await?;
//! ```

pub mod client;
pub mod traits;
pub mod upgrade;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use client::{ChannelClient, ClientConfig, ClientEvent};
pub use traits::{Connection, ConnectionId, Connector, Incoming, TransportError};
pub use upgrade::UpgradedConnection;

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector, DEFAULT_MAX_MESSAGE_SIZE};
