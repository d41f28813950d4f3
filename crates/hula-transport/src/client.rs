//! Client side of the request/response channel.
//!
//! A [`ChannelClient`] owns one logical connection to a server, kept alive by
//! a background driver task. Calls from any number of callers share it; each
//! call parks in the client's [`PendingCalls`] table and is settled when the
//! response carrying its id arrives, in whatever order responses come back.
//!
//! On every (re)connection the driver sends `Hello` with a connection
//! ordinal. When a connection drops, every outstanding call is failed with
//! [`CallError::Disconnected`] before the driver reconnects.

use crate::traits::{Connection, Connector, Incoming};
use hula_core::{CallError, PendingCalls};
use hula_protocol::{codec, Encoding, Frame, Query};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server channel endpoint, e.g. `ws://127.0.0.1:3000/ws`.
    pub url: String,
    /// Largest inbound message accepted. Defaults to the largest frame the
    /// protocol allows, so any response a server can encode gets through.
    pub max_message_size: usize,
    /// How long a call may wait for its response. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Pause between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Encoding used for outbound frames.
    pub encoding: Encoding,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:3000/ws".to_string(),
            max_message_size: codec::MAX_FRAME_SIZE,
            call_timeout: None,
            reconnect_delay: Duration::from_secs(1),
            encoding: Encoding::Text,
            event_capacity: 16,
        }
    }
}

/// Connection lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A connection was established and announced with this ordinal.
    Connected { ordinal: u64 },
    /// The connection dropped; outstanding calls were failed.
    Disconnected { failed_calls: usize },
    /// The server asked the client to discard its state and reload.
    Reload,
}

/// A shared call/response channel to a hula server.
pub struct ChannelClient {
    pending: Arc<PendingCalls>,
    outgoing: mpsc::UnboundedSender<Frame>,
    events: broadcast::Sender<ClientEvent>,
    call_timeout: Option<Duration>,
    driver: JoinHandle<()>,
}

impl ChannelClient {
    /// Start a client that connects (and reconnects) through `connector`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn<C: Connector>(connector: C, config: ClientConfig) -> Self {
        let pending = Arc::new(PendingCalls::new());
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        let driver = Driver {
            connector,
            pending: Arc::clone(&pending),
            outgoing: outgoing_rx,
            events: events.clone(),
            config: config.clone(),
            ordinal: 0,
        };

        Self {
            pending,
            outgoing,
            events,
            call_timeout: config.call_timeout,
            driver: tokio::spawn(driver.run()),
        }
    }

    /// Start a client dialing `config.url` over WebSocket.
    #[cfg(feature = "websocket")]
    #[must_use]
    pub fn connect(config: ClientConfig) -> Self {
        let connector = crate::websocket::WebSocketConnector::new(config.url.clone())
            .with_max_message_size(config.max_message_size);
        Self::spawn(connector, config)
    }

    /// Call a server route and wait for its JSON result.
    ///
    /// # Errors
    ///
    /// Returns the server's error, or a local error if the client is shut
    /// down, the connection drops or the call times out.
    pub async fn call(
        &self,
        path: impl Into<String>,
        query: Query,
        parents: bool,
    ) -> Result<Value, CallError> {
        let pending = self.pending.register();
        let id = pending.id();

        if self.outgoing.send(Frame::call(id, path, query, parents)).is_err() {
            self.pending.cancel(id);
            return Err(CallError::Send("client has shut down".to_string()));
        }

        match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    self.pending.cancel(id);
                    debug!(call = id, "Call timed out");
                    Err(CallError::Timeout)
                }
            },
            None => pending.wait().await,
        }
    }

    /// Subscribe to connection lifecycle events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Number of calls awaiting a response.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for ChannelClient {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Background task owning the live connection.
struct Driver<C> {
    connector: C,
    pending: Arc<PendingCalls>,
    outgoing: mpsc::UnboundedReceiver<Frame>,
    events: broadcast::Sender<ClientEvent>,
    config: ClientConfig,
    ordinal: u64,
}

/// Why a connection's pump loop ended.
enum Exit {
    Dropped,
    Shutdown,
}

impl<C: Connector> Driver<C> {
    async fn run(mut self) {
        loop {
            match self.connector.connect().await {
                Ok(mut connection) => {
                    let exit = self.serve(connection.as_mut()).await;
                    let failed_calls = self.fail_outstanding();
                    let _ = self.events.send(ClientEvent::Disconnected { failed_calls });

                    if let Exit::Shutdown = exit {
                        let _ = connection.close().await;
                        debug!("Client shut down");
                        return;
                    }
                    info!(failed_calls, "Connection dropped, reconnecting");
                }
                Err(e) => warn!(error = %e, "Connect failed"),
            }

            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn serve(&mut self, connection: &mut dyn Connection) -> Exit {
        let ordinal = self.ordinal;
        self.ordinal += 1;

        if let Err(e) = connection
            .send(&Frame::hello(ordinal), self.config.encoding)
            .await
        {
            warn!(error = %e, "Failed to send hello");
            return Exit::Dropped;
        }
        debug!(connection = %connection.id(), ordinal, "Announced connection");
        let _ = self.events.send(ClientEvent::Connected { ordinal });

        loop {
            tokio::select! {
                outbound = self.outgoing.recv() => {
                    let Some(frame) = outbound else {
                        return Exit::Shutdown;
                    };
                    if let Err(e) = connection.send(&frame, self.config.encoding).await {
                        warn!(error = %e, "Failed to send frame");
                        return Exit::Dropped;
                    }
                }

                inbound = connection.recv() => {
                    match inbound {
                        Ok(Some(incoming)) => self.dispatch(incoming),
                        Ok(None) => return Exit::Dropped,
                        Err(e) if e.is_oversized() => {
                            // the response it held can never be settled
                            warn!(error = %e, "Oversized message, dropping connection");
                            return Exit::Dropped;
                        }
                        Err(e) if e.is_recoverable() => {
                            warn!(error = %e, "Dropping malformed message");
                        }
                        Err(e) => {
                            warn!(error = %e, "Connection failed");
                            return Exit::Dropped;
                        }
                    }
                }
            }
        }
    }

    /// Fail every pending call, including calls still queued for sending.
    ///
    /// Queued frames are discarded rather than replayed on the next
    /// connection, where their callers would no longer be listening.
    fn fail_outstanding(&mut self) -> usize {
        let mut failed = self.pending.fail_all(&CallError::Disconnected);
        while let Ok(frame) = self.outgoing.try_recv() {
            if let Frame::Call(call) = frame {
                if self.pending.reject(call.id, CallError::Disconnected) {
                    failed += 1;
                }
                trace!(call = call.id, "Discarded queued call");
            }
        }
        failed
    }

    fn dispatch(&self, incoming: Incoming) {
        match incoming.frame {
            Frame::Response(response) => {
                let id = response.id;
                let settlement = self.pending.settle(response);
                trace!(call = id, ?settlement, "Settled response");
            }
            Frame::Reload => {
                info!("Server requested reload");
                let _ = self.events.send(ClientEvent::Reload);
            }
            other => {
                warn!(frame_type = other.frame_type().as_str(), "Unexpected frame from server");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ConnectionId;
    use async_trait::async_trait;
    use crate::traits::{decode_text, TransportError};
    use hula_protocol::{Call, Response};
    use serde_json::json;

    /// The server half of an in-memory connection.
    struct Peer {
        inbox: mpsc::UnboundedReceiver<Frame>,
        outbox: mpsc::UnboundedSender<Frame>,
    }

    impl Peer {
        async fn expect_call(&mut self) -> Call {
            match self.inbox.recv().await {
                Some(Frame::Call(call)) => call,
                other => panic!("Expected call, got {:?}", other),
            }
        }
    }

    struct MemoryConnection {
        id: ConnectionId,
        inbox: mpsc::UnboundedReceiver<Frame>,
        outbox: mpsc::UnboundedSender<Frame>,
        open: bool,
        max_message_size: usize,
    }

    #[async_trait]
    impl Connection for MemoryConnection {
        fn id(&self) -> &ConnectionId {
            &self.id
        }

        async fn recv(&mut self) -> Result<Option<Incoming>, TransportError> {
            let Some(frame) = self.inbox.recv().await else {
                return Ok(None);
            };
            let text = codec::encode_text(&frame)?;
            decode_text(&text, self.max_message_size).map(Some)
        }

        async fn send(&mut self, frame: &Frame, _encoding: Encoding) -> Result<(), TransportError> {
            self.outbox
                .send(frame.clone())
                .map_err(|_| TransportError::ConnectionClosed)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.open = false;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    /// Hands out one in-memory connection per connect, exposing the peers.
    struct MemoryConnector {
        peers: mpsc::UnboundedSender<Peer>,
        max_message_size: usize,
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
            let (to_client, inbox) = mpsc::unbounded_channel();
            let (outbox, from_client) = mpsc::unbounded_channel();
            self.peers
                .send(Peer {
                    inbox: from_client,
                    outbox: to_client,
                })
                .map_err(|_| TransportError::ConnectFailed("test over".to_string()))?;
            Ok(Box::new(MemoryConnection {
                id: ConnectionId::generate(),
                inbox,
                outbox,
                open: true,
                max_message_size: self.max_message_size,
            }))
        }
    }

    fn client(config: ClientConfig) -> (ChannelClient, mpsc::UnboundedReceiver<Peer>) {
        let (peers, peer_rx) = mpsc::unbounded_channel();
        let connector = MemoryConnector {
            peers,
            max_message_size: config.max_message_size,
        };
        (ChannelClient::spawn(connector, config), peer_rx)
    }

    async fn connected_peer(peers: &mut mpsc::UnboundedReceiver<Peer>, ordinal: u64) -> Peer {
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(peer.inbox.recv().await, Some(Frame::hello(ordinal)));
        peer
    }

    #[tokio::test]
    async fn test_call_round_trip() {
        let (client, mut peers) = client(ClientConfig::default());
        let mut peer = connected_peer(&mut peers, 0).await;

        let mut query = Query::new();
        query.insert("q".to_string(), json!(1));
        let calling = client.call("/x", query.clone(), true);

        let serving = async {
            let call = peer.expect_call().await;
            assert_eq!(call.path, "/x");
            assert_eq!(call.query, query);
            assert!(call.parents);
            peer.outbox
                .send(Frame::Response(Response::success(call, json!("<p></p>"))))
                .unwrap();
        };

        let (result, ()) = tokio::join!(calling, serving);
        assert_eq!(result.unwrap(), json!("<p></p>"));
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_settle_independently() {
        let (client, mut peers) = client(ClientConfig::default());
        let mut peer = connected_peer(&mut peers, 0).await;
        let client = Arc::new(client);

        let first = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("/a", Query::new(), false).await }
        });
        let first_call = peer.expect_call().await;

        let second = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("/b", Query::new(), false).await }
        });
        let second_call = peer.expect_call().await;
        assert!(second_call.id > first_call.id);

        // answer out of order; the first one fails
        peer.outbox
            .send(Frame::Response(Response::success(second_call, json!("b"))))
            .unwrap();
        peer.outbox
            .send(Frame::Response(Response::failure(first_call, "boom", Some(500))))
            .unwrap();

        assert_eq!(second.await.unwrap().unwrap(), json!("b"));
        assert_eq!(
            first.await.unwrap().unwrap_err(),
            CallError::Remote {
                message: "boom".to_string(),
                code: Some(500)
            }
        );
    }

    #[tokio::test]
    async fn test_unmatched_response_is_ignored() {
        let (client, mut peers) = client(ClientConfig::default());
        let mut peer = connected_peer(&mut peers, 0).await;

        let stray = Call::new(4242, "/stray", Query::new(), false);
        peer.outbox
            .send(Frame::Response(Response::success(stray, json!(null))))
            .unwrap();

        let calling = client.call("/x", Query::new(), false);
        let serving = async {
            let call = peer.expect_call().await;
            peer.outbox
                .send(Frame::Response(Response::success(call, json!(1))))
                .unwrap();
        };

        let (result, ()) = tokio::join!(calling, serving);
        assert_eq!(result.unwrap(), json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_releases_entry() {
        let config = ClientConfig {
            call_timeout: Some(Duration::from_millis(50)),
            ..ClientConfig::default()
        };
        let (client, mut peers) = client(config);
        let _peer = connected_peer(&mut peers, 0).await;

        let err = client.call("/slow", Query::new(), false).await.unwrap_err();
        assert_eq!(err, CallError::Timeout);
        assert_eq!(client.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_fails_pending_and_increments_ordinal() {
        let (client, mut peers) = client(ClientConfig::default());
        let mut events = client.events();
        let mut peer = connected_peer(&mut peers, 0).await;
        assert_eq!(events.recv().await.unwrap(), ClientEvent::Connected { ordinal: 0 });

        let client = Arc::new(client);
        let waiting = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.call("/x", Query::new(), false).await }
        });
        peer.expect_call().await;

        // dropping the server half ends the connection
        drop(peer);

        assert_eq!(waiting.await.unwrap().unwrap_err(), CallError::Disconnected);
        assert_eq!(
            events.recv().await.unwrap(),
            ClientEvent::Disconnected { failed_calls: 1 }
        );

        let _peer = connected_peer(&mut peers, 1).await;
        assert_eq!(events.recv().await.unwrap(), ClientEvent::Connected { ordinal: 1 });
    }

    #[tokio::test]
    async fn test_reload_event() {
        let (client, mut peers) = client(ClientConfig::default());
        let mut events = client.events();
        let peer = connected_peer(&mut peers, 0).await;
        assert_eq!(events.recv().await.unwrap(), ClientEvent::Connected { ordinal: 0 });

        peer.outbox.send(Frame::reload()).unwrap();
        assert_eq!(events.recv().await.unwrap(), ClientEvent::Reload);
    }

    #[tokio::test]
    async fn test_call_after_driver_stops() {
        let (mut client, _peers) = client(ClientConfig::default());
        client.driver.abort();
        assert!((&mut client.driver).await.unwrap_err().is_cancelled());

        let err = client.call("/x", Query::new(), false).await.unwrap_err();
        assert!(matches!(err, CallError::Send(_)));
        assert_eq!(client.pending(), 0);
    }

    #[test]
    fn test_default_limit_admits_any_frame() {
        assert_eq!(ClientConfig::default().max_message_size, codec::MAX_FRAME_SIZE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_response_fails_call() {
        let config = ClientConfig {
            max_message_size: 1024,
            ..ClientConfig::default()
        };
        let (client, mut peers) = client(config);
        let mut peer = connected_peer(&mut peers, 0).await;

        let calling = client.call("/big", Query::new(), false);
        let serving = async {
            let call = peer.expect_call().await;
            let html = format!("<div>{}</div>", "x".repeat(2048));
            peer.outbox
                .send(Frame::Response(Response::success(call, json!(html))))
                .unwrap();
        };

        let (result, ()) = tokio::join!(calling, serving);
        assert_eq!(result.unwrap_err(), CallError::Disconnected);
        assert_eq!(client.pending(), 0);

        // the client comes back and small responses still get through
        let mut peer = connected_peer(&mut peers, 1).await;
        let calling = client.call("/small", Query::new(), false);
        let serving = async {
            let call = peer.expect_call().await;
            peer.outbox
                .send(Frame::Response(Response::success(call, json!("ok"))))
                .unwrap();
        };
        let (result, ()) = tokio::join!(calling, serving);
        assert_eq!(result.unwrap(), json!("ok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_call_is_not_replayed_after_disconnect() {
        let (client, mut peers) = client(ClientConfig::default());
        let peer = connected_peer(&mut peers, 0).await;

        // queue a call and lose the connection before the driver runs
        let stale = client.pending.register();
        client
            .outgoing
            .send(Frame::call(stale.id(), "/stale", Query::new(), false))
            .unwrap();
        drop(peer);

        assert_eq!(stale.wait().await.unwrap_err(), CallError::Disconnected);

        let mut peer = connected_peer(&mut peers, 1).await;
        let calling = client.call("/fresh", Query::new(), false);
        let serving = async {
            let call = peer.expect_call().await;
            assert_eq!(call.path, "/fresh");
            peer.outbox
                .send(Frame::Response(Response::success(call, json!(1))))
                .unwrap();
        };
        let (result, ()) = tokio::join!(calling, serving);
        assert_eq!(result.unwrap(), json!(1));
    }
}
