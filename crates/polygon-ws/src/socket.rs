//! Connection lifecycle and subscription multiplexing
//!
//! [`SocketManager`] owns at most one WebSocket connection. The connection
//! is opened lazily when the first subscription attaches, authenticated
//! during the handshake, and torn down when the last subscription detaches.
//! A single spawned receive loop routes every inbound message to the
//! per-key broadcast queue it belongs to.

use crate::broadcast::BroadcastQueue;
use crate::codec::{self, Command};
use crate::transport::{Connector, FrameSink, FrameStream, WsConnector};
use dashmap::{DashMap, DashSet};
use polygon_types::{DataStatus, Market, PolygonError, StatusMessage, SubscriptionKey};
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

/// Buffer depth for internal acknowledgment queues
const ACK_QUEUE_CAPACITY: usize = 4;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Live connection resources, present only while connected
struct Link {
    sink: Box<dyn FrameSink>,
    loop_handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Multiplexes logical subscriptions over one WebSocket connection
///
/// Consumers attach with [`events_for_key`](Self::events_for_key) and get
/// an independent [`EventStream`]. The first attach for a key sends the
/// wire `subscribe`; the last detach sends `unsubscribe`. When the last
/// key goes away the connection is closed. A manager whose connection has
/// dropped does not reconnect; attached streams observe
/// [`PolygonError::LoopTerminated`] and new attaches open a fresh
/// connection.
///
/// Cloning is cheap and every clone drives the same connection.
#[derive(Clone)]
pub struct SocketManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    api_key: String,
    url: String,
    connector: Arc<dyn Connector>,
    /// One broadcast queue per key, data and status alike
    channels: Arc<DashMap<SubscriptionKey, Arc<BroadcastQueue>>>,
    /// Keys currently subscribed on the wire
    subscriptions: DashSet<SubscriptionKey>,
    state: Arc<parking_lot::RwLock<ConnectionState>>,
    /// Serializes connect, subscribe, unsubscribe, and teardown
    lifecycle: Mutex<Option<Link>>,
}

impl SocketManager {
    /// Create a manager for the given feed and market
    pub fn new(data_status: DataStatus, market: Market, api_key: impl Into<String>) -> Self {
        Self::with_connector(data_status, market, api_key, Arc::new(WsConnector::new()))
    }

    /// Create a manager with a custom transport connector
    pub fn with_connector(
        data_status: DataStatus,
        market: Market,
        api_key: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                api_key: api_key.into(),
                url: format!("{}/{}", data_status.host(), market.path()),
                connector,
                channels: Arc::new(DashMap::new()),
                subscriptions: DashSet::new(),
                state: Arc::new(parking_lot::RwLock::new(ConnectionState::Disconnected)),
                lifecycle: Mutex::new(None),
            }),
        }
    }

    /// Endpoint this manager connects to
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    /// Attach a consumer to the given key
    ///
    /// The first consumer of a key triggers the wire subscribe (and the
    /// connection handshake if no connection is up). Later consumers share
    /// the existing subscription and start receiving from the next message
    /// onward. `capacity` bounds the key's shared buffer and is fixed by
    /// the first attach of an active interval; a full buffer drops new
    /// messages rather than blocking the feed.
    pub async fn events_for_key<T>(
        &self,
        key: SubscriptionKey,
        capacity: usize,
    ) -> Result<EventStream<T>, PolygonError>
    where
        T: DeserializeOwned,
    {
        let queue = self.inner.queue_for(&key, capacity);

        // Held across the subscribe so a detach of the same key cannot
        // interleave with this attach.
        let mut members = queue.lock_members().await;
        let opened = queue.open_channel(&mut members);
        if opened && !key.is_status() {
            if let Err(err) = self.inner.subscribe(&key).await {
                queue.retire(&mut members);
                return Err(err);
            }
        }
        let id = members.join();
        drop(members);

        Ok(EventStream {
            inner: Some(StreamInner {
                manager: Arc::clone(&self.inner),
                key,
                queue,
                id,
            }),
            finished: false,
            _marker: PhantomData,
        })
    }

    /// Close the connection and end every attached stream
    pub async fn shutdown(&self) {
        {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            self.inner.subscriptions.clear();
            self.inner.teardown(&mut lifecycle).await;
        }
        // Retire queues without holding the lifecycle lock: an in-flight
        // attach may hold a queue's membership lock while waiting for it.
        let queues: Vec<Arc<BroadcastQueue>> = self
            .inner
            .channels
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for queue in queues {
            let mut members = queue.lock_members().await;
            queue.retire(&mut members);
        }
    }
}

impl ManagerInner {
    fn queue_for(&self, key: &SubscriptionKey, capacity: usize) -> Arc<BroadcastQueue> {
        Arc::clone(
            &self
                .channels
                .entry(key.clone())
                .or_insert_with(|| Arc::new(BroadcastQueue::new(capacity))),
        )
    }

    /// Subscribe a key on the wire, connecting first if necessary
    #[instrument(skip_all, fields(key = %key))]
    async fn subscribe(&self, key: &SubscriptionKey) -> Result<(), PolygonError> {
        let mut lifecycle = self.lifecycle.lock().await;
        // Re-check under the lock; a racing attach may have won.
        if self.subscriptions.contains(key) {
            return Ok(());
        }
        let link = self.ensure_started(&mut lifecycle).await?;

        let ack = self
            .exchange_command(link, Command::Subscribe(key.as_str().to_string()), key)
            .await?;
        if !ack.is_success() {
            return Err(PolygonError::subscription_rejected(
                key.as_str(),
                format!("{}: {}", ack.status, ack.message),
            ));
        }

        self.subscriptions.insert(key.clone());
        info!(key = %key, "subscribed");
        Ok(())
    }

    /// Unsubscribe a key; tears the connection down when it was the last
    ///
    /// Detach cleanup cannot propagate errors, so failures are logged. The
    /// key leaves the subscription set either way.
    #[instrument(skip_all, fields(key = %key))]
    async fn unsubscribe(&self, key: &SubscriptionKey) {
        let mut lifecycle = self.lifecycle.lock().await;
        self.subscriptions.remove(key);

        // A dead receive loop cannot deliver the ack; skip the exchange.
        match lifecycle.as_mut() {
            Some(link) if !link.loop_handle.is_finished() => {
                match self
                    .exchange_command(link, Command::Unsubscribe(key.as_str().to_string()), key)
                    .await
                {
                    Ok(ack) if ack.is_success() => debug!(key = %key, "unsubscribed"),
                    Ok(ack) => {
                        warn!(key = %key, status = %ack.status, "unsubscribe not acknowledged")
                    }
                    Err(err) => warn!(key = %key, %err, "unsubscribe failed"),
                }
            }
            _ => {}
        }

        if self.subscriptions.is_empty() {
            info!("last subscription removed, closing connection");
            self.teardown(&mut lifecycle).await;
        }
    }

    /// Send a command and wait for its ack on the paired status queue
    ///
    /// The ack listener is registered before the frame goes out, so the
    /// reply cannot race past us. Acks carry no correlation id; they are
    /// matched purely by the key named in the status text.
    async fn exchange_command(
        &self,
        link: &mut Link,
        command: Command,
        key: &SubscriptionKey,
    ) -> Result<StatusMessage, PolygonError> {
        let status_key = SubscriptionKey::status(key.as_str());
        let queue = self.queue_for(&status_key, ACK_QUEUE_CAPACITY);
        let id = {
            let mut members = queue.lock_members().await;
            queue.open_channel(&mut members);
            members.join()
        };

        let outcome = match link.sink.send(&command.to_frame()?).await {
            Err(err) => Err(PolygonError::Transport(err.to_string())),
            Ok(()) => match queue.next_for(id).await {
                Some(Ok(payload)) => {
                    serde_json::from_value::<StatusMessage>((*payload).clone())
                        .map_err(PolygonError::from)
                }
                Some(Err(err)) => Err(err),
                None => Err(PolygonError::protocol("ack stream closed before reply")),
            },
        };

        let mut members = queue.lock_members().await;
        if members.leave(id) {
            queue.retire(&mut members);
        }
        drop(members);

        outcome
    }

    async fn ensure_started<'a>(
        &self,
        lifecycle: &'a mut Option<Link>,
    ) -> Result<&'a mut Link, PolygonError> {
        // A link whose loop already died is unusable; replace it.
        let dead = lifecycle
            .as_ref()
            .map_or(false, |link| link.loop_handle.is_finished());
        if dead {
            self.teardown(lifecycle).await;
        }
        if lifecycle.is_none() {
            *lifecycle = Some(self.start().await?);
        }
        lifecycle
            .as_mut()
            .ok_or_else(|| PolygonError::protocol("connection unavailable"))
    }

    /// Connect, handshake, authenticate, and spawn the receive loop
    #[instrument(skip_all, fields(url = %self.url))]
    async fn start(&self) -> Result<Link, PolygonError> {
        *self.state.write() = ConnectionState::Connecting;
        match self.start_inner().await {
            Ok(link) => {
                *self.state.write() = ConnectionState::Connected;
                info!("connected and authenticated");
                Ok(link)
            }
            Err(err) => {
                *self.state.write() = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    async fn start_inner(&self) -> Result<Link, PolygonError> {
        let (mut sink, mut stream) =
            self.connector
                .connect(&self.url)
                .await
                .map_err(|err| PolygonError::ConnectionFailed {
                    url: self.url.clone(),
                    reason: err.to_string(),
                })?;

        let greeting = expect_status(stream.as_mut()).await?;
        if !greeting.status.eq_ignore_ascii_case("connected") {
            let _ = sink.close().await;
            return Err(PolygonError::protocol(format!(
                "unexpected greeting status: {}",
                greeting.status
            )));
        }

        sink.send(&Command::Auth(self.api_key.clone()).to_frame()?)
            .await
            .map_err(|err| PolygonError::Transport(err.to_string()))?;
        let ack = expect_status(stream.as_mut()).await?;
        if !ack.status.eq_ignore_ascii_case("auth_success") {
            let _ = sink.close().await;
            return Err(PolygonError::AuthenticationFailed {
                reason: format!("{}: {}", ack.status, ack.message),
            });
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_handle = tokio::spawn(receive_loop(
            stream,
            Arc::clone(&self.channels),
            Arc::clone(&self.state),
            shutdown_rx,
        ));

        Ok(Link {
            sink,
            loop_handle,
            shutdown: shutdown_tx,
        })
    }

    /// Close the connection and stop the receive loop
    ///
    /// Callers must hold the lifecycle lock. Queues are not failed here;
    /// an orderly teardown happens only once every consumer is gone.
    async fn teardown(&self, lifecycle: &mut Option<Link>) {
        if let Some(mut link) = lifecycle.take() {
            // Stop the loop before closing the sink so the loop exits on
            // the shutdown signal rather than on a mid-close read error.
            let _ = link.shutdown.send(true);
            let _ = link.loop_handle.await;
            let _ = link.sink.close().await;
        }
        *self.state.write() = ConnectionState::Disconnected;
    }
}

/// Read one handshake frame carrying exactly one status record
async fn expect_status(stream: &mut dyn FrameStream) -> Result<StatusMessage, PolygonError> {
    let frame = stream
        .next()
        .await
        .map_err(|err| PolygonError::Transport(err.to_string()))?
        .ok_or_else(|| PolygonError::protocol("connection closed during handshake"))?;
    let mut messages = codec::parse_frame(&frame)?;
    if messages.len() != 1 {
        return Err(PolygonError::protocol(
            "expected exactly one status record during handshake",
        ));
    }
    Ok(serde_json::from_value(messages.remove(0))?)
}

/// Route inbound frames until shutdown or connection loss
///
/// Malformed or unroutable messages are dropped with a warning; only
/// transport-level failures end the loop. On an unplanned exit every
/// queue is failed so blocked consumers wake with the reason.
async fn receive_loop(
    mut stream: Box<dyn FrameStream>,
    channels: Arc<DashMap<SubscriptionKey, Arc<BroadcastQueue>>>,
    state: Arc<parking_lot::RwLock<ConnectionState>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let reason = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("receive loop stopping on shutdown signal");
                return;
            }
            item = stream.next() => match item {
                Ok(Some(frame)) => route_frame(&frame, &channels),
                Ok(None) => break "connection closed by server".to_string(),
                Err(err) => break err.to_string(),
            }
        }
    };

    warn!(%reason, "receive loop terminated");
    *state.write() = ConnectionState::Disconnected;
    for entry in channels.iter() {
        entry.value().fail(&reason);
    }
}

fn route_frame(frame: &str, channels: &DashMap<SubscriptionKey, Arc<BroadcastQueue>>) {
    let messages = match codec::parse_frame(frame) {
        Ok(messages) => messages,
        Err(err) => {
            warn!(%err, "dropping malformed frame");
            return;
        }
    };

    for message in messages {
        let key = match codec::routing_key(&message) {
            Ok(key) => key,
            Err(err) => {
                warn!(%err, "dropping unroutable message");
                continue;
            }
        };
        match channels.get(&key) {
            Some(queue) => {
                if !queue.publish(message) {
                    trace!(key = %key, "dropped message for idle or saturated queue");
                }
            }
            None => trace!(key = %key, "no listener for key"),
        }
    }
}

struct StreamInner {
    manager: Arc<ManagerInner>,
    key: SubscriptionKey,
    queue: Arc<BroadcastQueue>,
    id: u64,
}

impl StreamInner {
    /// Leave the queue; the last consumer out unsubscribes and retires it
    async fn detach(self) {
        let mut members = self.queue.lock_members().await;
        if members.leave(self.id) {
            if !self.key.is_status() {
                self.manager.unsubscribe(&self.key).await;
            }
            self.queue.retire(&mut members);
        }
    }
}

/// One consumer's view of a subscription key
///
/// Each stream reads at its own pace from a private cursor; all streams on
/// the same key see the same messages in the same order. Messages decode
/// to `T` lazily at [`recv`](Self::recv). Dropping the stream detaches it
/// in the background; call [`close`](Self::close) for deterministic
/// cleanup.
pub struct EventStream<T> {
    inner: Option<StreamInner>,
    finished: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("key", &self.inner.as_ref().map(|inner| &inner.key))
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl<T> EventStream<T>
where
    T: DeserializeOwned,
{
    /// Receive the next event
    ///
    /// Returns `None` once the stream has ended: after an orderly shutdown,
    /// or on the call following a [`PolygonError::LoopTerminated`] error.
    pub async fn recv(&mut self) -> Option<Result<T, PolygonError>> {
        if self.finished {
            return None;
        }
        let inner = self.inner.as_ref()?;
        match inner.queue.next_for(inner.id).await {
            Some(Ok(payload)) => {
                Some(serde_json::from_value::<T>((*payload).clone()).map_err(PolygonError::from))
            }
            Some(Err(err)) => {
                self.finished = true;
                Some(Err(err))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl<T> EventStream<T> {
    /// Detach from the subscription, unsubscribing if this was the last
    /// consumer of the key
    pub async fn close(&mut self) {
        self.finished = true;
        if let Some(inner) = self.inner.take() {
            inner.detach().await;
        }
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(inner.detach());
                }
                Err(_) => warn!(key = %inner.key, "stream dropped outside a runtime, skipping detach"),
            }
        }
    }
}
