//! Scoped client facade.
//!
//! A [`Client`] owns one [`Backend`] and hands out scope-bound handles:
//!
//! ```no_run
//! # async fn demo() -> scopestore::error::StoreResult<()> {
//! use scopestore::rpc::client::Client;
//! use std::time::Duration;
//!
//! let client = Client::new("127.0.0.1:8080".parse().unwrap(), Duration::from_secs(1));
//! client.connect().await?;
//!
//! let kv = client.bridge("b1").kv();
//! kv.set("greeting", "hello", 0).await?;
//! let counters = client.instance("b1", "i1").map().fields("counters");
//! counters.incr("hits", 1).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Requests are validated locally before they are sent, so scope and TTL
//! errors never cost a round trip.

use super::codec::{ClientCodec, DecodeResult, EncodeResult, ProtocolCodec};
use super::service::Service;
use super::{Reply, Request, RequestFrame, ResponseFrame};
use crate::core::error::{StoreError, StoreResult};
use crate::store::scope::{Location, ScopeLocator};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Boxed future returned by [`Backend`] methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// Transport carrying request frames to a service.
pub trait Backend: Send + Sync + fmt::Debug {
    /// Establish the transport.
    fn connect(&self, timeout: Duration) -> BackendFuture<'_, ()>;

    /// Tear the transport down. Idempotent.
    fn disconnect(&self) -> BackendFuture<'_, ()>;

    /// Whether requests can currently be sent.
    fn is_connected(&self) -> bool;

    /// Send one frame and wait for its response.
    fn call(&self, frame: RequestFrame) -> BackendFuture<'_, ResponseFrame>;
}

// ============================================================================
// TCP backend
// ============================================================================

#[derive(Debug)]
struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    // set from the first byte written until the matching response is read
    in_flight: bool,
}

/// Backend speaking the framed protocol over one TCP connection.
///
/// Calls are serialized on the connection. An I/O failure drops the
/// connection and later calls report [`StoreError::NotConnected`]. A call
/// abandoned mid-exchange (its future dropped on timeout) leaves the stream
/// out of step, so the next call replaces the connection before sending.
#[derive(Debug)]
pub struct TcpBackend {
    addr: SocketAddr,
    codec: ClientCodec,
    connection: Mutex<Option<Connection>>,
    connected: AtomicBool,
    dial_timeout_ms: AtomicU64,
}

impl TcpBackend {
    /// Create a backend for `addr`; nothing is dialed until `connect`.
    pub fn new(addr: SocketAddr, max_frame_bytes: usize) -> Self {
        Self {
            addr,
            codec: ClientCodec::new(max_frame_bytes),
            connection: Mutex::new(None),
            connected: AtomicBool::new(false),
            dial_timeout_ms: AtomicU64::new(5_000),
        }
    }

    /// Server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    async fn dial(&self, timeout: Duration) -> StoreResult<Connection> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(StoreError::transport(format!(
                    "failed to connect to {}: {}",
                    self.addr, e
                )))
            }
            Err(_) => {
                return Err(StoreError::transport(format!(
                    "connecting to {} timed out after {}ms",
                    self.addr,
                    timeout.as_millis()
                )))
            }
        };
        let _ = stream.set_nodelay(true);
        Ok(Connection {
            stream,
            buffer: BytesMut::with_capacity(16 * 1024),
            in_flight: false,
        })
    }

    async fn roundtrip(&self, frame: RequestFrame) -> StoreResult<ResponseFrame> {
        let mut guard = self.connection.lock().await;
        if guard.as_ref().is_some_and(|conn| conn.in_flight) {
            tracing::debug!(addr = %self.addr, "replacing connection left mid-exchange");
            *guard = None;
            let timeout = Duration::from_millis(self.dial_timeout_ms.load(Ordering::Relaxed));
            match self.dial(timeout).await {
                Ok(conn) => *guard = Some(conn),
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        }
        let conn = guard.as_mut().ok_or(StoreError::NotConnected)?;

        let result = exchange(&self.codec, conn, &frame).await;
        if matches!(
            result,
            Err(StoreError::Transport { .. }) | Err(StoreError::Protocol { .. })
        ) {
            *guard = None;
            self.connected.store(false, Ordering::Release);
        }
        result
    }
}

async fn exchange(
    codec: &ClientCodec,
    conn: &mut Connection,
    frame: &RequestFrame,
) -> StoreResult<ResponseFrame> {
    let bytes = match codec.encode(frame) {
        EncodeResult::Ok(bytes) => bytes,
        EncodeResult::Error(message) => return Err(StoreError::protocol(message)),
    };
    conn.in_flight = true;
    conn.stream
        .write_all(&bytes)
        .await
        .map_err(StoreError::transport)?;

    loop {
        match codec.decode(&mut conn.buffer) {
            DecodeResult::Complete(response) if response.id == frame.id => {
                conn.in_flight = false;
                return Ok(response);
            }
            DecodeResult::Complete(response) if response.id == 0 => {
                return match response.result {
                    Err(e) => Err(e),
                    Ok(_) => Err(StoreError::protocol("unsolicited response")),
                };
            }
            DecodeResult::Complete(stale) => {
                tracing::debug!(id = stale.id, "discarding stale response");
                continue;
            }
            DecodeResult::Invalid(message) => return Err(StoreError::protocol(message)),
            DecodeResult::Incomplete => {}
        }

        let read = conn
            .stream
            .read_buf(&mut conn.buffer)
            .await
            .map_err(StoreError::transport)?;
        if read == 0 {
            return Err(StoreError::transport("connection closed by server"));
        }
    }
}

impl Backend for TcpBackend {
    fn connect(&self, timeout: Duration) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.connection.lock().await;
            self.dial_timeout_ms
                .store(timeout.as_millis() as u64, Ordering::Relaxed);
            if guard.as_ref().is_some_and(|conn| !conn.in_flight) {
                return Ok(());
            }
            *guard = Some(self.dial(timeout).await?);
            self.connected.store(true, Ordering::Release);
            tracing::debug!(addr = %self.addr, "connected");
            Ok(())
        })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            let mut guard = self.connection.lock().await;
            if let Some(mut conn) = guard.take() {
                let _ = conn.stream.shutdown().await;
                tracing::debug!(addr = %self.addr, "disconnected");
            }
            self.connected.store(false, Ordering::Release);
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn call(&self, frame: RequestFrame) -> BackendFuture<'_, ResponseFrame> {
        Box::pin(self.roundtrip(frame))
    }
}

// ============================================================================
// In-process backend
// ============================================================================

/// Backend dispatching straight into a [`Service`] in the same process.
#[derive(Debug)]
pub struct LocalBackend {
    service: Arc<Service>,
    connected: AtomicBool,
}

impl LocalBackend {
    /// Wrap a service.
    pub fn new(service: Arc<Service>) -> Self {
        Self {
            service,
            connected: AtomicBool::new(false),
        }
    }
}

impl Backend for LocalBackend {
    fn connect(&self, _timeout: Duration) -> BackendFuture<'_, ()> {
        self.connected.store(true, Ordering::Release);
        Box::pin(async { Ok(()) })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        self.connected.store(false, Ordering::Release);
        Box::pin(async { Ok(()) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn call(&self, frame: RequestFrame) -> BackendFuture<'_, ResponseFrame> {
        Box::pin(async move {
            if !self.is_connected() {
                return Err(StoreError::NotConnected);
            }
            Ok(self.service.clone().handle_frame_blocking(frame).await)
        })
    }
}

// ============================================================================
// Client
// ============================================================================

/// Store client. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("backend", &self.backend)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Client {
    /// Client over an arbitrary backend. `timeout` bounds every call.
    pub fn with_backend(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Client for a server at `addr`.
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self::with_backend(Arc::new(TcpBackend::new(addr, 4 * 1024 * 1024)), timeout)
    }

    /// Client dispatching into an in-process service.
    pub fn local(service: Arc<Service>, timeout: Duration) -> Self {
        Self::with_backend(Arc::new(LocalBackend::new(service)), timeout)
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect the backend.
    pub async fn connect(&self) -> StoreResult<()> {
        self.backend.connect(self.timeout).await
    }

    /// Disconnect the backend.
    pub async fn disconnect(&self) -> StoreResult<()> {
        self.backend.disconnect().await
    }

    /// Whether the backend is connected.
    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    /// Handles for the global scope.
    pub fn global(&self) -> Scoped {
        self.scoped(ScopeLocator::global())
    }

    /// Handles for one bridge.
    pub fn bridge(&self, bridge: impl Into<String>) -> Scoped {
        self.scoped(ScopeLocator::bridge(bridge))
    }

    /// Handles for one instance of a bridge.
    pub fn instance(&self, bridge: impl Into<String>, instance: impl Into<String>) -> Scoped {
        self.scoped(ScopeLocator::instance(bridge, instance))
    }

    /// Handles for an explicit scope.
    pub fn scoped(&self, scope: ScopeLocator) -> Scoped {
        Scoped {
            client: self.clone(),
            scope,
        }
    }

    /// Validate, send and await one request.
    pub async fn call(&self, request: Request) -> StoreResult<Reply> {
        let token = request.location().tokenize()?;
        request.validate()?;
        if !self.backend.is_connected() {
            return Err(StoreError::NotConnected);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = RequestFrame {
            id,
            timeout_ms: Some(self.timeout.as_millis() as u64),
            request,
        };

        match tokio::time::timeout(self.timeout, self.backend.call(frame)).await {
            Ok(Ok(response)) => response.result,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(StoreError::Timeout {
                token: token.to_string(),
                waited_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Client bound to one scope.
#[derive(Debug, Clone)]
pub struct Scoped {
    client: Client,
    scope: ScopeLocator,
}

impl Scoped {
    /// Bound scope.
    pub fn scope(&self) -> &ScopeLocator {
        &self.scope
    }

    /// Scalar operations.
    pub fn kv(&self) -> KvHandle {
        KvHandle {
            scoped: self.clone(),
        }
    }

    /// Map operations.
    pub fn map(&self) -> MapHandle {
        MapHandle {
            scoped: self.clone(),
        }
    }

    /// Queue operations.
    pub fn queue(&self) -> QueueHandle {
        QueueHandle {
            scoped: self.clone(),
        }
    }

    /// Advisory locks.
    pub fn lock(&self) -> LockHandle {
        LockHandle {
            scoped: self.clone(),
        }
    }

    fn location(&self, key: &str) -> Location {
        Location::new(self.scope.clone(), key)
    }

    async fn call(&self, request: Request) -> StoreResult<Reply> {
        self.client.call(request).await
    }
}

/// Scalar values in one scope.
#[derive(Debug, Clone)]
pub struct KvHandle {
    scoped: Scoped,
}

impl KvHandle {
    /// Store `value`; `ttl` in seconds, 0 for the scope default.
    pub async fn set(&self, key: &str, value: impl Into<Bytes>, ttl: i32) -> StoreResult<()> {
        self.scoped
            .call(Request::KvSet {
                location: self.scoped.location(key),
                value: value.into(),
                ttl,
            })
            .await?
            .into_ack()
    }

    /// Read a value.
    pub async fn get(&self, key: &str) -> StoreResult<Bytes> {
        self.scoped
            .call(Request::KvGet {
                location: self.scoped.location(key),
            })
            .await?
            .into_value()
    }

    /// Remove a value.
    pub async fn del(&self, key: &str) -> StoreResult<()> {
        self.scoped
            .call(Request::KvDel {
                location: self.scoped.location(key),
            })
            .await?
            .into_ack()
    }

    /// Add `n` to a numeric value.
    pub async fn incr(&self, key: &str, n: i32) -> StoreResult<i64> {
        self.scoped
            .call(Request::KvIncr {
                location: self.scoped.location(key),
                n,
            })
            .await?
            .into_integer()
    }

    /// Subtract `n` from a numeric value.
    pub async fn decr(&self, key: &str, n: i32) -> StoreResult<i64> {
        self.scoped
            .call(Request::KvDecr {
                location: self.scoped.location(key),
                n,
            })
            .await?
            .into_integer()
    }
}

/// Map containers in one scope.
#[derive(Debug, Clone)]
pub struct MapHandle {
    scoped: Scoped,
}

impl MapHandle {
    /// Create (or reset) an empty map.
    pub async fn create(&self, key: &str, ttl: i32) -> StoreResult<()> {
        self.scoped
            .call(Request::MapNew {
                location: self.scoped.location(key),
                ttl,
            })
            .await?
            .into_ack()
    }

    /// Remove a map.
    pub async fn del(&self, key: &str) -> StoreResult<()> {
        self.scoped
            .call(Request::MapDel {
                location: self.scoped.location(key),
            })
            .await?
            .into_ack()
    }

    /// Field operations on one map.
    pub fn fields(&self, key: &str) -> MapFields {
        MapFields {
            scoped: self.scoped.clone(),
            location: self.scoped.location(key),
        }
    }
}

/// Fields of one map.
#[derive(Debug, Clone)]
pub struct MapFields {
    scoped: Scoped,
    location: Location,
}

impl MapFields {
    pub async fn set(&self, field: &str, value: impl Into<Bytes>) -> StoreResult<()> {
        self.scoped
            .call(Request::MapFieldSet {
                location: self.location.clone(),
                field: field.to_string(),
                value: value.into(),
            })
            .await?
            .into_ack()
    }

    pub async fn get(&self, field: &str) -> StoreResult<Bytes> {
        self.scoped
            .call(Request::MapFieldGet {
                location: self.location.clone(),
                field: field.to_string(),
            })
            .await?
            .into_value()
    }

    pub async fn del(&self, field: &str) -> StoreResult<()> {
        self.scoped
            .call(Request::MapFieldDel {
                location: self.location.clone(),
                field: field.to_string(),
            })
            .await?
            .into_ack()
    }

    /// Add `n` to a numeric field.
    pub async fn incr(&self, field: &str, n: i32) -> StoreResult<i64> {
        self.scoped
            .call(Request::MapFieldIncr {
                location: self.location.clone(),
                field: field.to_string(),
                n,
            })
            .await?
            .into_integer()
    }

    /// Subtract `n` from a numeric field.
    pub async fn decr(&self, field: &str, n: i32) -> StoreResult<i64> {
        self.scoped
            .call(Request::MapFieldDecr {
                location: self.location.clone(),
                field: field.to_string(),
                n,
            })
            .await?
            .into_integer()
    }

    /// Snapshot of every field.
    pub async fn all(&self) -> StoreResult<BTreeMap<String, Bytes>> {
        self.scoped
            .call(Request::MapAll {
                location: self.location.clone(),
            })
            .await?
            .into_fields()
    }

    pub async fn len(&self) -> StoreResult<usize> {
        self.scoped
            .call(Request::MapLen {
                location: self.location.clone(),
            })
            .await?
            .into_count()
    }
}

/// Queue containers in one scope.
#[derive(Debug, Clone)]
pub struct QueueHandle {
    scoped: Scoped,
}

impl QueueHandle {
    /// Create (or reset) an empty queue.
    pub async fn create(&self, key: &str, ttl: i32) -> StoreResult<()> {
        self.scoped
            .call(Request::QueueNew {
                location: self.scoped.location(key),
                ttl,
            })
            .await?
            .into_ack()
    }

    /// Remove a queue.
    pub async fn del(&self, key: &str) -> StoreResult<()> {
        self.scoped
            .call(Request::QueueDel {
                location: self.scoped.location(key),
            })
            .await?
            .into_ack()
    }

    /// Item operations on one queue.
    pub fn items(&self, key: &str) -> QueueItems {
        QueueItems {
            scoped: self.scoped.clone(),
            location: self.scoped.location(key),
        }
    }
}

/// Items of one queue.
#[derive(Debug, Clone)]
pub struct QueueItems {
    scoped: Scoped,
    location: Location,
}

impl QueueItems {
    /// Append at the tail.
    pub async fn push(&self, value: impl Into<Bytes>) -> StoreResult<()> {
        self.scoped
            .call(Request::QueuePush {
                location: self.location.clone(),
                value: value.into(),
            })
            .await?
            .into_ack()
    }

    /// Remove and return the head.
    pub async fn pop(&self) -> StoreResult<Bytes> {
        self.scoped
            .call(Request::QueuePop {
                location: self.location.clone(),
            })
            .await?
            .into_value()
    }

    /// Return the head without removing it.
    pub async fn peek(&self) -> StoreResult<Bytes> {
        self.scoped
            .call(Request::QueuePeek {
                location: self.location.clone(),
            })
            .await?
            .into_value()
    }

    /// Item at `index`, 0 being the head.
    pub async fn index(&self, index: i32) -> StoreResult<Bytes> {
        self.scoped
            .call(Request::QueueIndex {
                location: self.location.clone(),
                index,
            })
            .await?
            .into_value()
    }

    pub async fn all(&self) -> StoreResult<Vec<Bytes>> {
        self.scoped
            .call(Request::QueueAll {
                location: self.location.clone(),
            })
            .await?
            .into_items()
    }

    pub async fn len(&self) -> StoreResult<usize> {
        self.scoped
            .call(Request::QueueLen {
                location: self.location.clone(),
            })
            .await?
            .into_count()
    }
}

/// Advisory locks in one scope.
#[derive(Debug, Clone)]
pub struct LockHandle {
    scoped: Scoped,
}

impl LockHandle {
    /// Acquire a lock for `timeout` seconds (0 for the server default).
    /// Returns the release token.
    pub async fn lock(&self, key: &str, timeout: i32) -> StoreResult<String> {
        self.scoped
            .call(Request::Lock {
                location: self.scoped.location(key),
                timeout,
            })
            .await?
            .into_release_token()
    }

    /// Release a lock with the token returned by [`LockHandle::lock`].
    pub async fn unlock(&self, key: &str, release_token: &str) -> StoreResult<()> {
        self.scoped
            .call(Request::Unlock {
                location: self.scoped.location(key),
                release_token: release_token.to_string(),
            })
            .await?
            .into_ack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;
    use crate::store::Store;

    fn local_client() -> Client {
        let service = Arc::new(Service::from_store(Store::from_config(
            StoreConfig::default(),
        )));
        Client::local(service, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_not_connected_until_connect() {
        let client = local_client();
        assert!(!client.is_connected());
        let err = client.global().kv().get("k").await.unwrap_err();
        assert_eq!(err, StoreError::NotConnected);

        client.connect().await.unwrap();
        assert!(client.is_connected());
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_validation_happens_before_send() {
        let client = local_client();
        // not connected, yet scope errors win
        let err = client.bridge("").kv().get("k").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidScope { .. }));

        let err = client.global().kv().set("k", "v", -1).await.unwrap_err();
        assert!(matches!(err, StoreError::NegativeTtl { ttl: -1, .. }));
    }

    #[tokio::test]
    async fn test_local_roundtrip_through_handles() {
        let client = local_client();
        client.connect().await.unwrap();
        let scope = client.instance("b", "i");

        scope.kv().set("n", "41", 0).await.unwrap();
        assert_eq!(scope.kv().incr("n", 1).await.unwrap(), 42);

        let map = scope.map();
        map.create("m", 0).await.unwrap();
        let fields = map.fields("m");
        fields.set("a", "1").await.unwrap();
        assert_eq!(fields.decr("a", 3).await.unwrap(), -2);
        assert_eq!(fields.len().await.unwrap(), 1);

        let queue = scope.queue();
        queue.create("q", 0).await.unwrap();
        let items = queue.items("q");
        items.push("x").await.unwrap();
        items.push("y").await.unwrap();
        assert_eq!(items.index(1).await.unwrap(), Bytes::from("y"));
        assert_eq!(items.pop().await.unwrap(), Bytes::from("x"));

        let token = scope.lock().lock("res", 5).await.unwrap();
        assert!(matches!(
            scope.lock().lock("res", 5).await,
            Err(StoreError::AlreadyLocked { .. })
        ));
        scope.lock().unlock("res", &token).await.unwrap();
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let client = local_client();
        client.connect().await.unwrap();
        client.bridge("b").kv().set("k", "bridge", 0).await.unwrap();
        assert!(matches!(
            client.instance("b", "i").kv().get("k").await,
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            client.global().kv().get("k").await,
            Err(StoreError::NotFound { .. })
        ));
    }
}
