use std::{
    fmt, io,
    str::FromStr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard,
        RwLockWriteGuard, Weak,
    },
    time::Duration,
};

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, Mutex as AsyncMutex},
    time::{sleep, timeout},
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        error::Error as WS_ERROR,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    configuration::Config,
    error::Error,
    types::{
        to_message, InboundMessage, Ledger, LedgerRequest, SubscribeRequest,
        SubscribeResponse,
    },
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

type LedgerCallback = Arc<dyn Fn(&Ledger) + Send + Sync>;
/// Observer that is also told whether the ledger reached the channel.
type DeliveryCallback = Arc<dyn Fn(&Ledger, bool) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// What to do with a ledger when the ledger channel is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the incoming ledger and log a warning; the read loop never
    /// waits on the consumer.
    #[default]
    DropNewest,
    /// Wait for channel capacity, pausing the read loop.
    Block,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OverflowPolicy::DropNewest => write!(f, "drop_newest"),
            OverflowPolicy::Block => write!(f, "block"),
        }
    }
}

impl FromStr for OverflowPolicy {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<OverflowPolicy, Self::Err> {
        match value {
            "drop_newest" => Ok(OverflowPolicy::DropNewest),
            "block" => Ok(OverflowPolicy::Block),
            _ => Err(io::Error::other("Overflow policy not supported")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: String,
    pub ledger_buffer: usize,
    pub error_buffer: usize,
    pub reconnect_delay: Duration,
    /// `None` retries forever.
    pub max_retries: Option<u32>,
    pub fetch_timeout: Duration,
    pub handshake_timeout: Duration,
    pub overflow_policy: OverflowPolicy,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        ClientConfig {
            url: url.into(),
            ledger_buffer: 100,
            error_buffer: 10,
            reconnect_delay: Duration::from_secs(5),
            max_retries: None,
            fetch_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            overflow_policy: OverflowPolicy::DropNewest,
        }
    }
}

impl From<&Config> for ClientConfig {
    fn from(config: &Config) -> Self {
        ClientConfig {
            url: config.rippled_ws.to_owned(),
            ledger_buffer: config.ledger_buffer,
            error_buffer: config.error_buffer,
            reconnect_delay: Duration::from_secs(
                config.socket_reconnect_interval,
            ),
            max_retries: config.socket_max_retries,
            fetch_timeout: Duration::from_secs(config.fetch_timeout),
            handshake_timeout: Duration::from_secs(config.handshake_timeout),
            overflow_policy: config.ledger_overflow_policy,
        }
    }
}

/// Receiving ends of the client's ledger and error channels.
#[derive(Debug)]
pub struct LedgerStream {
    pub ledgers: mpsc::Receiver<Ledger>,
    pub errors: mpsc::Receiver<Error>,
}

struct Inner {
    config: ClientConfig,
    state: Mutex<ConnectionState>,
    sink: AsyncMutex<Option<WsSink>>,
    connect_lock: AsyncMutex<()>,
    reconnecting: AtomicBool,
    cancel: CancellationToken,
    ledger_tx: mpsc::Sender<Ledger>,
    error_tx: mpsc::Sender<Error>,
    on_ledger: RwLock<Option<LedgerCallback>>,
    on_error: RwLock<Option<ErrorCallback>>,
    watchers: RwLock<Vec<(u64, DeliveryCallback)>>,
    next_watcher: AtomicU64,
}

/// Streaming client for the ledger node.
///
/// Keeps one subscription to the `ledger` stream alive, fetches the full
/// ledger for every close notification and publishes validated ledgers on
/// the [`LedgerStream`] returned by [`LedgerClient::new`]. Read failures
/// trigger a reconnect loop that resubscribes on success.
#[derive(Clone)]
pub struct LedgerClient {
    inner: Arc<Inner>,
}

impl fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LedgerClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .finish()
    }
}

impl LedgerClient {
    pub fn new(config: ClientConfig) -> (LedgerClient, LedgerStream) {
        let (ledger_tx, ledgers) = mpsc::channel(config.ledger_buffer.max(1));
        let (error_tx, errors) = mpsc::channel(config.error_buffer.max(1));

        let inner = Inner {
            config,
            state: Mutex::new(ConnectionState::Disconnected),
            sink: AsyncMutex::new(None),
            connect_lock: AsyncMutex::new(()),
            reconnecting: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            ledger_tx,
            error_tx,
            on_ledger: RwLock::new(None),
            on_error: RwLock::new(None),
            watchers: RwLock::new(Vec::new()),
            next_watcher: AtomicU64::new(0),
        };

        (
            LedgerClient {
                inner: Arc::new(inner),
            },
            LedgerStream { ledgers, errors },
        )
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.inner.state)
    }

    /// Token cancelled by [`LedgerClient::close`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    pub async fn connect(&self) -> Result<(), Error> {
        let _connecting = self.inner.connect_lock.lock().await;
        let source = self.inner.open().await?;
        self.spawn_reader(source);

        Ok(())
    }

    pub async fn subscribe(&self) -> Result<(), Error> {
        let request = to_message(&SubscribeRequest::ledger_stream())?;
        self.inner.send(request).await?;
        info!("Subscribed to ledger stream");

        Ok(())
    }

    /// Requests ledger `ledger_index` and waits for it to arrive on the
    /// stream. The ledger is also published to the channel and callbacks;
    /// if the channel drops it, the fetch fails with `LedgerDropped`.
    pub async fn fetch_ledger_sync(
        &self,
        ledger_index: u64,
    ) -> Result<Ledger, Error> {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));

        let _watcher = self.watch_deliveries(move |ledger, queued| {
            if ledger.ledger_index != ledger_index {
                return;
            }
            if let Some(tx) = lock(&slot).take() {
                let _ = tx.send(queued.then(|| ledger.clone()));
            }
        });

        self.request_ledger(ledger_index).await?;

        match timeout(self.inner.config.fetch_timeout, rx).await {
            Ok(Ok(Some(ledger))) => Ok(ledger),
            Ok(Ok(None)) => Err(Error::LedgerDropped(ledger_index)),
            Ok(Err(_)) => Err(Error::ClientClosed),
            Err(_) => Err(Error::FetchTimeout(ledger_index)),
        }
    }

    pub fn on_ledger<F>(&self, callback: F)
    where
        F: Fn(&Ledger) + Send + Sync + 'static,
    {
        *write(&self.inner.on_ledger) = Some(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        *write(&self.inner.on_error) = Some(Arc::new(callback));
    }

    /// Registers an extra ledger observer alongside the `on_ledger`
    /// callback. It stays registered until the returned guard is dropped.
    pub fn watch_ledgers<F>(&self, watcher: F) -> ObserverGuard
    where
        F: Fn(&Ledger) + Send + Sync + 'static,
    {
        self.watch_deliveries(move |ledger, _| watcher(ledger))
    }

    fn watch_deliveries<F>(&self, watcher: F) -> ObserverGuard
    where
        F: Fn(&Ledger, bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_watcher.fetch_add(1, Ordering::SeqCst);
        write(&self.inner.watchers).push((id, Arc::new(watcher)));

        ObserverGuard {
            inner: Arc::downgrade(&self.inner),
            id,
        }
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.inner.cancel.cancel();

        let previous = {
            let mut state = lock(&self.inner.state);
            std::mem::replace(&mut *state, ConnectionState::Closed)
        };
        if previous == ConnectionState::Closed {
            return Ok(());
        }

        if let Some(mut sink) = self.inner.sink.lock().await.take() {
            match timeout(self.inner.config.handshake_timeout, sink.close()).await
            {
                Ok(Ok(())) => {},
                Ok(Err(e)) => debug!("Close handshake failed: {}", e),
                Err(_) => debug!("Close handshake timed out"),
            }
        }
        info!("Connection to rippled closed");

        Ok(())
    }

    async fn request_ledger(&self, ledger_index: u64) -> Result<(), Error> {
        let request = to_message(&LedgerRequest::full(ledger_index))?;
        self.inner.send(request).await
    }

    fn spawn_reader(&self, source: WsSource) {
        tokio::spawn(self.clone().read_loop(source));
    }

    async fn read_loop(self, mut source: WsSource) {
        loop {
            let error = match self.read_frames(source).await {
                Some(error) => error,
                None => return,
            };

            self.inner.teardown().await;
            self.inner.emit_error(error);

            source = match self.reconnect().await {
                Some(source) => source,
                None => return,
            };
        }
    }

    /// Returns the error that ended the connection, or `None` on shutdown.
    async fn read_frames(&self, mut source: WsSource) -> Option<Error> {
        loop {
            let frame = tokio::select! {
                _ = self.inner.cancel.cancelled() => return None,
                frame = source.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    self.handle_message(text.as_str()).await
                },
                Some(Ok(Message::Close(frame))) => {
                    return Some(close_error(frame));
                },
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    let abnormal = !matches!(e, WS_ERROR::ConnectionClosed);
                    if abnormal {
                        warn!("WebSocket error: {}", e);
                    }
                    return Some(Error::ReadError {
                        message: e.to_string(),
                        abnormal,
                    });
                },
                None => {
                    return Some(Error::ReadError {
                        message: String::from("stream ended"),
                        abnormal: true,
                    })
                },
            }
        }
    }

    async fn handle_message(&self, text: &str) {
        match InboundMessage::classify(text) {
            InboundMessage::LedgerClosed(notification) => {
                let ledger_index = notification.ledger_index;
                debug!("Ledger {} closed, requesting full ledger", ledger_index);

                let client = self.clone();
                tokio::spawn(async move {
                    match client.request_ledger(ledger_index).await {
                        Ok(()) => {},
                        Err(Error::NotConnected) => {
                            warn!("Not connected, skipping ledger {}", ledger_index)
                        },
                        Err(e) => {
                            warn!("Failed to request ledger {}: {}", ledger_index, e)
                        },
                    }
                });
            },
            InboundMessage::LedgerResponse(ledger) => {
                self.inner.publish(ledger).await;
            },
            InboundMessage::SubscribeResponse(response) => {
                self.handle_subscribe_response(response)
            },
            InboundMessage::Unknown => {
                let preview: String = text.chars().take(100).collect();
                debug!("Received unknown message: {}", preview);
            },
        }
    }

    fn handle_subscribe_response(&self, response: SubscribeResponse) {
        if response.status == "success" {
            info!("✓ Subscription confirmed");
            return;
        }

        match response.error.filter(|error| !error.is_empty()) {
            Some(error) => self.inner.emit_error(Error::SubscribeError {
                error,
                message: response.error_message.unwrap_or_default(),
            }),
            None => debug!("Response with status {}", response.status),
        }
    }

    async fn reconnect(&self) -> Option<WsSource> {
        if self.inner.reconnecting.swap(true, Ordering::SeqCst) {
            return None;
        }

        let source = self.reconnect_loop().await;
        self.inner.reconnecting.store(false, Ordering::SeqCst);

        source
    }

    async fn reconnect_loop(&self) -> Option<WsSource> {
        let mut attempt: u32 = 0;

        loop {
            if self.inner.cancel.is_cancelled() {
                return None;
            }

            if let Some(max_retries) = self.inner.config.max_retries {
                if attempt >= max_retries {
                    error!("Max reconnection retries reached");
                    self.inner.emit_error(Error::ConnectError(format!(
                        "gave up after {} reconnection attempts",
                        attempt
                    )));
                    return None;
                }
            }

            attempt += 1;
            self.inner.set_state(ConnectionState::Reconnecting);
            info!("Reconnecting... (attempt {})", attempt);

            match self.try_reconnect().await {
                Ok(source) => {
                    info!("✓ Reconnected successfully");
                    return Some(source);
                },
                Err(Error::AlreadyConnected) | Err(Error::ClientClosed) => {
                    return None
                },
                Err(e) => warn!("Reconnection failed: {}", e),
            }

            let cancelled = tokio::select! {
                _ = sleep(self.inner.config.reconnect_delay) => false,
                _ = self.inner.cancel.cancelled() => true,
            };
            if cancelled {
                return None;
            }
        }
    }

    async fn try_reconnect(&self) -> Result<WsSource, Error> {
        let _connecting = self.inner.connect_lock.lock().await;
        let source = self.inner.open().await?;

        if let Err(e) = self.subscribe().await {
            self.inner.teardown().await;
            return Err(e);
        }

        Ok(source)
    }
}

impl Inner {
    fn set_state(&self, next: ConnectionState) {
        let mut state = lock(&self.state);
        if *state != ConnectionState::Closed {
            *state = next;
        }
    }

    /// Opens the socket and installs the write half. Callers hold
    /// `connect_lock`.
    async fn open(&self) -> Result<WsSource, Error> {
        let state = *lock(&self.state);
        match state {
            ConnectionState::Connected => return Err(Error::AlreadyConnected),
            ConnectionState::Closed => return Err(Error::ClientClosed),
            _ => {},
        }

        self.set_state(ConnectionState::Connecting);
        info!("Connecting to rippled at {}", self.config.url);

        let handshake = timeout(
            self.config.handshake_timeout,
            connect_async(self.config.url.as_str()),
        )
        .await;

        let socket = match handshake {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(Error::ConnectError(e.to_string()));
            },
            Err(_) => {
                self.set_state(ConnectionState::Disconnected);
                return Err(Error::ConnectError(format!(
                    "handshake timed out after {}s",
                    self.config.handshake_timeout.as_secs_f64()
                )));
            },
        };

        if self.cancel.is_cancelled() {
            return Err(Error::ClientClosed);
        }

        let (sink, source) = socket.split();
        *self.sink.lock().await = Some(sink);
        self.set_state(ConnectionState::Connected);
        info!("✓ Connected to rippled");

        Ok(source)
    }

    async fn send(&self, text: String) -> Result<(), Error> {
        let mut sink = self.sink.lock().await;
        let sink = sink.as_mut().ok_or(Error::NotConnected)?;
        sink.send(Message::text(text)).await?;

        Ok(())
    }

    async fn teardown(&self) {
        self.sink.lock().await.take();
        self.set_state(ConnectionState::Disconnected);
    }

    async fn publish(&self, ledger: Ledger) {
        let ledger_index = ledger.ledger_index;

        let queued = match self.config.overflow_policy {
            OverflowPolicy::DropNewest => {
                match self.ledger_tx.try_send(ledger.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(
                            "Ledger channel full, dropping ledger {}",
                            ledger_index
                        );
                        false
                    },
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("Ledger channel closed, ledger {} not queued", ledger_index);
                        false
                    },
                }
            },
            OverflowPolicy::Block => {
                tokio::select! {
                    result = self.ledger_tx.send(ledger.clone()) => {
                        if result.is_err() {
                            debug!("Ledger channel closed, ledger {} not queued", ledger_index);
                        }
                        result.is_ok()
                    },
                    _ = self.cancel.cancelled() => return,
                }
            },
        };

        let callback = read(&self.on_ledger).clone();
        if let Some(callback) = callback {
            callback(&ledger);
        }

        let watchers: Vec<DeliveryCallback> = read(&self.watchers)
            .iter()
            .map(|(_, watcher)| watcher.clone())
            .collect();
        for watcher in watchers {
            watcher(&ledger, queued);
        }
    }

    fn emit_error(&self, error: Error) {
        let callback = read(&self.on_error).clone();
        if let Some(callback) = callback {
            callback(&error);
        }

        match self.error_tx.try_send(error) {
            Ok(()) => {},
            Err(mpsc::error::TrySendError::Full(error)) => {
                warn!("Error channel full, dropping error: {}", error)
            },
            Err(mpsc::error::TrySendError::Closed(error)) => {
                debug!("Error channel closed: {}", error)
            },
        }
    }
}

/// Unregisters a ledger observer when dropped.
#[must_use = "the observer is removed as soon as the guard is dropped"]
pub struct ObserverGuard {
    inner: Weak<Inner>,
    id: u64,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            write(&inner.watchers).retain(|(id, _)| *id != self.id);
        }
    }
}

fn close_error(frame: Option<CloseFrame>) -> Error {
    match frame {
        Some(frame) => Error::ReadError {
            abnormal: !matches!(frame.code, CloseCode::Normal | CloseCode::Away),
            message: format!(
                "connection closed by peer: {} {}",
                u16::from(frame.code),
                frame.reason.as_str()
            ),
        },
        None => Error::ReadError {
            message: String::from("connection closed by peer"),
            abnormal: true,
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::{json, Value};
    use tokio::{net::TcpListener, task::JoinHandle};
    use tokio_tungstenite::accept_async;

    use super::*;

    type ServerSocket = WebSocketStream<TcpStream>;

    async fn listen() -> (
        String,
        mpsc::UnboundedReceiver<ServerSocket>,
        JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(socket) = accept_async(stream).await {
                    if tx.send(socket).is_err() {
                        break;
                    }
                }
            }
        });

        (url, rx, handle)
    }

    fn config(url: &str) -> ClientConfig {
        ClientConfig {
            reconnect_delay: Duration::from_millis(50),
            fetch_timeout: Duration::from_millis(500),
            handshake_timeout: Duration::from_secs(2),
            ..ClientConfig::new(url)
        }
    }

    async fn next_json(socket: &mut ServerSocket) -> Value {
        loop {
            let frame = timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("no frame from client")
                .unwrap()
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn send_json(socket: &mut ServerSocket, value: Value) {
        socket.send(Message::text(value.to_string())).await.unwrap();
    }

    fn ledger_response(index: u64) -> Value {
        json!({
            "status": "success",
            "type": "response",
            "result": {
                "ledger_index": index,
                "ledger_hash": format!("HASH{}", index),
                "validated": true,
                "ledger": {
                    "ledger_index": index.to_string(),
                    "close_time": 780000000,
                    "parent_hash": "PARENT",
                    "transactions": [
                        {"TransactionType": "Payment", "Account": "rA", "hash": "T1"}
                    ]
                }
            }
        })
    }

    #[tokio::test]
    async fn test_subscribe_and_fetch_on_close_notification() {
        let (url, mut sockets, _server) = listen().await;
        let (client, mut stream) = LedgerClient::new(config(&url));

        let delivered = Arc::new(AtomicUsize::new(0));
        let counter = delivered.clone();
        client.on_ledger(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Connected);
        let mut socket = sockets.recv().await.unwrap();

        client.subscribe().await.unwrap();
        assert_eq!(
            next_json(&mut socket).await,
            json!({"command": "subscribe", "streams": ["ledger"]})
        );

        send_json(
            &mut socket,
            json!({"status": "success", "type": "response", "result": {"fee_base": 10, "ledger_index": 6}}),
        )
        .await;
        send_json(
            &mut socket,
            json!({"type": "ledgerClosed", "ledger_index": 7, "ledger_hash": "HASH7", "ledger_time": 780000000, "fee_base": 10, "txn_count": 1}),
        )
        .await;

        assert_eq!(
            next_json(&mut socket).await,
            json!({"command": "ledger", "ledger_index": 7, "transactions": true, "expand": true})
        );
        send_json(&mut socket, ledger_response(7)).await;

        let ledger = timeout(Duration::from_secs(5), stream.ledgers.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ledger.ledger_index, 7);
        assert_eq!(ledger.ledger_hash, "HASH7");
        assert_eq!(ledger.parent_hash.as_deref(), Some("PARENT"));
        assert_eq!(ledger.txn_count, 1);
        assert_eq!(ledger.transactions[0].hash(), "T1");
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
        assert!(stream.errors.try_recv().is_err());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_twice_fails() {
        let (url, _sockets, _server) = listen().await;
        let (client, _stream) = LedgerClient::new(config(&url));

        client.connect().await.unwrap();
        assert!(matches!(client.connect().await, Err(Error::AlreadyConnected)));

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_requires_connection() {
        let (client, _stream) = LedgerClient::new(config("ws://127.0.0.1:1"));
        assert!(matches!(client.subscribe().await, Err(Error::NotConnected)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        drop(listener);

        let (client, _stream) = LedgerClient::new(config(&url));
        assert!(matches!(client.connect().await, Err(Error::ConnectError(_))));
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_fetch_ledger_sync() {
        let (url, mut sockets, _server) = listen().await;
        let (client, mut stream) = LedgerClient::new(config(&url));
        client.connect().await.unwrap();
        let mut socket = sockets.recv().await.unwrap();

        let fetch = tokio::spawn({
            let client = client.clone();
            async move { client.fetch_ledger_sync(9).await }
        });

        let request = next_json(&mut socket).await;
        assert_eq!(request["command"], "ledger");
        assert_eq!(request["ledger_index"], 9);
        send_json(&mut socket, ledger_response(8)).await;
        send_json(&mut socket, ledger_response(9)).await;

        let ledger = fetch.await.unwrap().unwrap();
        assert_eq!(ledger.ledger_index, 9);
        assert!(read(&client.inner.watchers).is_empty());

        assert_eq!(stream.ledgers.recv().await.unwrap().ledger_index, 8);
        assert_eq!(stream.ledgers.recv().await.unwrap().ledger_index, 9);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_ledger_sync_timeout() {
        let (url, mut sockets, _server) = listen().await;
        let (client, _stream) = LedgerClient::new(ClientConfig {
            fetch_timeout: Duration::from_millis(100),
            ..config(&url)
        });
        client.connect().await.unwrap();
        let _socket = sockets.recv().await.unwrap();

        let result = client.fetch_ledger_sync(42).await;
        assert!(matches!(result, Err(Error::FetchTimeout(42))));
        assert!(read(&client.inner.watchers).is_empty());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_ledger_sync_not_connected() {
        let (client, _stream) = LedgerClient::new(config("ws://127.0.0.1:1"));
        assert!(matches!(
            client.fetch_ledger_sync(1).await,
            Err(Error::NotConnected)
        ));
        assert!(read(&client.inner.watchers).is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (url, mut sockets, _server) = listen().await;
        let (client, _stream) = LedgerClient::new(config(&url));
        client.connect().await.unwrap();
        let _socket = sockets.recv().await.unwrap();

        client.close().await.unwrap();
        client.close().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(client.cancellation_token().is_cancelled());
        assert!(matches!(client.connect().await, Err(Error::ClientClosed)));
    }

    #[tokio::test]
    async fn test_reconnect_resubscribes() {
        let (url, mut sockets, _server) = listen().await;
        let (client, mut stream) = LedgerClient::new(config(&url));
        client.connect().await.unwrap();
        client.subscribe().await.unwrap();

        let mut socket = sockets.recv().await.unwrap();
        assert_eq!(next_json(&mut socket).await["command"], "subscribe");
        drop(socket);

        let error = timeout(Duration::from_secs(5), stream.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(error, Error::ReadError { .. }), "{}", error);

        let mut socket = timeout(Duration::from_secs(5), sockets.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            next_json(&mut socket).await,
            json!({"command": "subscribe", "streams": ["ledger"]})
        );
        assert_eq!(client.state(), ConnectionState::Connected);

        send_json(&mut socket, ledger_response(11)).await;
        assert_eq!(stream.ledgers.recv().await.unwrap().ledger_index, 11);

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnect_gives_up_after_max_retries() {
        let (url, mut sockets, server) = listen().await;
        let (client, mut stream) = LedgerClient::new(ClientConfig {
            max_retries: Some(2),
            ..config(&url)
        });
        client.connect().await.unwrap();
        let socket = sockets.recv().await.unwrap();

        server.abort();
        let _ = server.await;
        drop(socket);

        let error = stream.errors.recv().await.unwrap();
        assert!(matches!(error, Error::ReadError { .. }));
        let error = timeout(Duration::from_secs(5), stream.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(error, Error::ConnectError(_)), "{}", error);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_full_channel_drops_newest() {
        let (url, mut sockets, _server) = listen().await;
        let (client, mut stream) = LedgerClient::new(ClientConfig {
            ledger_buffer: 1,
            ..config(&url)
        });

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        client.on_ledger(move |ledger| {
            let _ = seen_tx.send(ledger.ledger_index);
        });

        client.connect().await.unwrap();
        let mut socket = sockets.recv().await.unwrap();
        send_json(&mut socket, ledger_response(1)).await;
        send_json(&mut socket, ledger_response(2)).await;

        assert_eq!(seen.recv().await, Some(1));
        assert_eq!(seen.recv().await, Some(2));
        assert_eq!(stream.ledgers.try_recv().unwrap().ledger_index, 1);
        assert!(stream.ledgers.try_recv().is_err());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_ledger_sync_fails_when_dropped() {
        let (url, mut sockets, _server) = listen().await;
        let (client, mut stream) = LedgerClient::new(ClientConfig {
            ledger_buffer: 1,
            ..config(&url)
        });

        let (seen_tx, mut seen) = mpsc::unbounded_channel();
        client.on_ledger(move |ledger| {
            let _ = seen_tx.send(ledger.ledger_index);
        });

        client.connect().await.unwrap();
        let mut socket = sockets.recv().await.unwrap();
        send_json(&mut socket, ledger_response(1)).await;
        assert_eq!(seen.recv().await, Some(1));

        let fetch = tokio::spawn({
            let client = client.clone();
            async move { client.fetch_ledger_sync(2).await }
        });
        assert_eq!(next_json(&mut socket).await["ledger_index"], 2);
        send_json(&mut socket, ledger_response(2)).await;

        let result = fetch.await.unwrap();
        assert!(matches!(result, Err(Error::LedgerDropped(2))));
        assert!(read(&client.inner.watchers).is_empty());
        assert_eq!(stream.ledgers.try_recv().unwrap().ledger_index, 1);
        assert!(stream.ledgers.try_recv().is_err());

        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_rejection_is_surfaced() {
        let (url, mut sockets, _server) = listen().await;
        let (client, mut stream) = LedgerClient::new(config(&url));

        let (error_tx, mut observed) = mpsc::unbounded_channel();
        client.on_error(move |error| {
            let _ = error_tx.send(error.to_string());
        });

        client.connect().await.unwrap();
        let mut socket = sockets.recv().await.unwrap();
        send_json(
            &mut socket,
            json!({"status": "error", "error": "malformedStream", "error_message": "Stream malformed."}),
        )
        .await;

        let error = stream.errors.recv().await.unwrap();
        match error {
            Error::SubscribeError { error, message } => {
                assert_eq!(error, "malformedStream");
                assert_eq!(message, "Stream malformed.");
            },
            other => panic!("unexpected {}", other),
        }
        assert_eq!(
            observed.recv().await.unwrap(),
            "subscribe error: malformedStream - Stream malformed."
        );

        client.close().await.unwrap();
    }

    #[test]
    fn test_overflow_policy() {
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::DropNewest);
        assert_eq!(
            "block".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::Block
        );
        assert!("drop_oldest".parse::<OverflowPolicy>().is_err());
    }
}
