//! WebSocket transport abstraction
//!
//! This module provides a trait-based seam over the WebSocket connection,
//! enabling unit testing of the multiplexer without real network calls.
//! The connection is handed out as split halves: the lifecycle manager
//! keeps the sink for outgoing commands while the background receive loop
//! owns the stream.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Transport layer errors
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("connection timeout after {0:?}")]
    Timeout(Duration),

    /// Send failed
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Frame was not valid text
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Write half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;

    /// Close the connection gracefully
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait FrameStream: Send {
    /// Receive one text frame; `None` means the peer closed the connection
    async fn next(&mut self) -> Result<Option<String>, TransportError>;
}

/// Opens connections and hands out split halves
///
/// Implemented by [`WsConnector`] for production and by
/// [`mock::MockConnector`] for tests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to the given URL
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;
}

/// Real WebSocket connector using tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    /// Create a connector with the default 10 second connect timeout
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the connect timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

type WsSplitSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSplitStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self))]
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        debug!("connecting to WebSocket");

        let (ws_stream, _response) = timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (sink, stream) = ws_stream.split();
        debug!("WebSocket connected");
        Ok((Box::new(WsSink(sink)), Box::new(WsStream(stream))))
    }
}

struct WsSink(WsSplitSink);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        self.0
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.0
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}

struct WsStream(WsSplitStream);

#[async_trait]
impl FrameStream for WsStream {
    async fn next(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            match self.0.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data)
                        .map(Some)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                // tungstenite handles pong replies; skip control frames
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::ReceiveFailed(e.to_string())),
                None => return Ok(None),
            }
        }
    }
}

/// Mock transport for testing
///
/// [`MockServer`](mock::MockServer) plays the provider side of the
/// protocol: it acknowledges the connect handshake, answers auth and
/// subscribe/unsubscribe commands, captures every outbound frame, and lets
/// tests inject data frames or a server-side close.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    type SessionItem = Result<Option<String>, TransportError>;

    /// Scripted provider endpoint shared across mock connections
    pub struct MockServer {
        connects: AtomicUsize,
        inner: Mutex<Inner>,
    }

    struct Inner {
        sent: Vec<String>,
        session: Option<mpsc::UnboundedSender<SessionItem>>,
        connect_status: String,
        auth_status: String,
        command_status: String,
        fail_connect: bool,
    }

    impl MockServer {
        /// Create a well-behaved server: connects, authenticates, and
        /// acknowledges every command with `success`
        pub fn new() -> Arc<Self> {
            Arc::new(Self {
                connects: AtomicUsize::new(0),
                inner: Mutex::new(Inner {
                    sent: Vec::new(),
                    session: None,
                    connect_status: "connected".to_string(),
                    auth_status: "auth_success".to_string(),
                    command_status: "success".to_string(),
                    fail_connect: false,
                }),
            })
        }

        /// Override the handshake status record
        pub fn set_connect_status(&self, status: impl Into<String>) {
            self.inner.lock().connect_status = status.into();
        }

        /// Override the auth ack status
        pub fn set_auth_status(&self, status: impl Into<String>) {
            self.inner.lock().auth_status = status.into();
        }

        /// Override the subscribe/unsubscribe ack status
        pub fn set_command_status(&self, status: impl Into<String>) {
            self.inner.lock().command_status = status.into();
        }

        /// Make the next connect attempt fail at the transport level
        pub fn set_fail_connect(&self, fail: bool) {
            self.inner.lock().fail_connect = fail;
        }

        /// Number of connections opened so far
        pub fn connect_count(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        /// All frames the client has sent, oldest first
        pub fn sent_frames(&self) -> Vec<String> {
            self.inner.lock().sent.clone()
        }

        /// Count sent frames containing the given fragment
        pub fn count_sent(&self, fragment: &str) -> usize {
            self.inner
                .lock()
                .sent
                .iter()
                .filter(|f| f.contains(fragment))
                .count()
        }

        /// Inject a raw frame into the live session
        pub fn push_frame(&self, frame: impl Into<String>) {
            if let Some(session) = &self.inner.lock().session {
                let _ = session.send(Ok(Some(frame.into())));
            }
        }

        /// Simulate the server closing the connection
        pub fn push_server_close(&self) {
            if let Some(session) = &self.inner.lock().session {
                let _ = session.send(Ok(None));
            }
        }

        /// Simulate a transport failure on the read side
        pub fn push_receive_error(&self, message: impl Into<String>) {
            if let Some(session) = &self.inner.lock().session {
                let _ = session.send(Err(TransportError::ReceiveFailed(message.into())));
            }
        }

        fn open_session(&self) -> Result<mpsc::UnboundedReceiver<SessionItem>, TransportError> {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut inner = self.inner.lock();
            if inner.fail_connect {
                return Err(TransportError::ConnectionFailed(
                    "mock connection refused".into(),
                ));
            }
            let _ = tx.send(Ok(Some(format!(
                r#"[{{"ev":"status","status":"{}","message":"Connected Successfully"}}]"#,
                inner.connect_status
            ))));
            inner.session = Some(tx);
            Ok(rx)
        }

        fn record_send(&self, frame: &str) {
            let mut inner = self.inner.lock();
            inner.sent.push(frame.to_string());

            let Ok(command) = serde_json::from_str::<serde_json::Value>(frame) else {
                return;
            };
            let action = command.get("action").and_then(|v| v.as_str());
            let params = command
                .get("params")
                .and_then(|v| v.as_str())
                .unwrap_or_default();

            let reply = match action {
                Some("auth") => format!(
                    r#"[{{"ev":"status","status":"{}","message":"authenticated"}}]"#,
                    inner.auth_status
                ),
                Some("subscribe") => format!(
                    r#"[{{"ev":"status","status":"{}","message":"subscribed to: {}"}}]"#,
                    inner.command_status, params
                ),
                Some("unsubscribe") => format!(
                    r#"[{{"ev":"status","status":"{}","message":"unsubscribed to: {}"}}]"#,
                    inner.command_status, params
                ),
                _ => return,
            };
            if let Some(session) = &inner.session {
                let _ = session.send(Ok(Some(reply)));
            }
        }
    }

    /// [`Connector`] backed by a shared [`MockServer`]
    pub struct MockConnector {
        server: Arc<MockServer>,
    }

    impl MockConnector {
        /// Create a connector for the given server
        pub fn new(server: &Arc<MockServer>) -> Self {
            Self {
                server: Arc::clone(server),
            }
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            _url: &str,
        ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
            self.server.connects.fetch_add(1, Ordering::SeqCst);
            let rx = self.server.open_session()?;
            Ok((
                Box::new(MockSink {
                    server: Arc::clone(&self.server),
                }),
                Box::new(MockStream { rx }),
            ))
        }
    }

    struct MockSink {
        server: Arc<MockServer>,
    }

    #[async_trait]
    impl FrameSink for MockSink {
        async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
            self.server.record_send(frame);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.server.inner.lock().session = None;
            Ok(())
        }
    }

    struct MockStream {
        rx: mpsc::UnboundedReceiver<SessionItem>,
    }

    #[async_trait]
    impl FrameStream for MockStream {
        async fn next(&mut self) -> Result<Option<String>, TransportError> {
            match self.rx.recv().await {
                Some(item) => item,
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockConnector, MockServer};
    use super::*;

    #[tokio::test]
    async fn mock_handshake_and_auto_ack() {
        let server = MockServer::new();
        let connector = MockConnector::new(&server);

        let (mut sink, mut stream) = connector.connect("wss://mock.test/stocks").await.unwrap();
        assert_eq!(server.connect_count(), 1);

        let hello = stream.next().await.unwrap().unwrap();
        assert!(hello.contains("connected"));

        sink.send(r#"{"action":"subscribe","params":"AM.SPY"}"#)
            .await
            .unwrap();
        let ack = stream.next().await.unwrap().unwrap();
        assert!(ack.contains("subscribed to: AM.SPY"));
        assert_eq!(server.count_sent("subscribe"), 1);
    }

    #[tokio::test]
    async fn mock_connect_failure() {
        let server = MockServer::new();
        server.set_fail_connect(true);

        let connector = MockConnector::new(&server);
        let result = connector.connect("wss://mock.test/stocks").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn mock_server_close_ends_stream() {
        let server = MockServer::new();
        let connector = MockConnector::new(&server);

        let (_sink, mut stream) = connector.connect("wss://mock.test/stocks").await.unwrap();
        let _ = stream.next().await.unwrap(); // handshake frame

        server.push_server_close();
        assert!(stream.next().await.unwrap().is_none());
    }
}
