//! Request dispatch and the per-connection loop.
//!
//! [`Service::dispatch`] maps one [`Request`] onto the store adapters.
//! [`Service::handle_connection`] reads frames from a socket, dispatches them
//! in order and writes one response per request until the peer closes, the
//! idle timeout fires or shutdown is signalled.

use super::codec::{DecodeResult, EncodeResult, ProtocolCodec, ServerCodec};
use super::{Reply, Request, RequestFrame, ResponseFrame};
use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Deadline;
use crate::net::tcp::{ConnectionId, ListenerMetrics};
use crate::store::Store;
use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Service counters.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    /// Requests dispatched.
    pub requests_total: AtomicU64,
    /// Requests that returned an error.
    pub requests_failed: AtomicU64,
    /// Frames that could not be decoded.
    pub protocol_errors: AtomicU64,
}

/// Per-connection settings.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Close the connection after this long without a complete request.
    pub idle_timeout: Duration,
    /// Largest accepted frame body.
    pub max_frame_bytes: usize,
    /// Initial read buffer capacity.
    pub read_buffer_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            max_frame_bytes: 4 * 1024 * 1024,
            read_buffer_size: 16 * 1024,
        }
    }
}

/// RPC service over one store.
#[derive(Debug)]
pub struct Service {
    store: Store,
    default_timeout: Duration,
    metrics: ServiceMetrics,
}

impl Service {
    /// Create a service; requests without a deadline get `default_timeout`.
    pub fn new(store: Store, default_timeout: Duration) -> Self {
        Self {
            store,
            default_timeout,
            metrics: ServiceMetrics::default(),
        }
    }

    /// Create a service using the store's configured request timeout.
    pub fn from_store(store: Store) -> Self {
        let timeout = Duration::from_millis(store.engine().config().request_timeout_ms);
        Self::new(store, timeout)
    }

    /// Underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Counters.
    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Execute one request.
    pub fn dispatch(&self, request: Request, deadline: Deadline) -> StoreResult<Reply> {
        self.metrics.requests_total.fetch_add(1, Ordering::Relaxed);
        let op = request.name();

        let result = self.execute(request, deadline);
        if let Err(ref e) = result {
            self.metrics.requests_failed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(op, code = e.code(), error = %e, "request failed");
        }
        result
    }

    fn execute(&self, request: Request, deadline: Deadline) -> StoreResult<Reply> {
        let store = &self.store;
        let reply = match request {
            Request::KvSet {
                location,
                value,
                ttl,
            } => {
                store.scalar().set(&location, value, ttl, deadline)?;
                Reply::Ack
            }
            Request::KvGet { location } => Reply::Value(store.scalar().get(&location, deadline)?),
            Request::KvDel { location } => {
                store.scalar().del(&location, deadline)?;
                Reply::Ack
            }
            Request::KvIncr { location, n } => {
                Reply::Integer(store.scalar().incr(&location, n, deadline)?)
            }
            Request::KvDecr { location, n } => {
                Reply::Integer(store.scalar().decr(&location, n, deadline)?)
            }

            Request::MapNew { location, ttl } => {
                store.map().create(&location, ttl, deadline)?;
                Reply::Ack
            }
            Request::MapDel { location } => {
                store.map().del(&location, deadline)?;
                Reply::Ack
            }
            Request::MapFieldSet {
                location,
                field,
                value,
            } => {
                store.map().field_set(&location, &field, value, deadline)?;
                Reply::Ack
            }
            Request::MapFieldGet { location, field } => {
                Reply::Value(store.map().field_get(&location, &field, deadline)?)
            }
            Request::MapFieldDel { location, field } => {
                store.map().field_del(&location, &field, deadline)?;
                Reply::Ack
            }
            Request::MapFieldIncr { location, field, n } => {
                Reply::Integer(store.map().field_incr(&location, &field, n, deadline)?)
            }
            Request::MapFieldDecr { location, field, n } => {
                Reply::Integer(store.map().field_decr(&location, &field, n, deadline)?)
            }
            Request::MapAll { location } => Reply::Fields(store.map().all(&location, deadline)?),
            Request::MapLen { location } => Reply::Count(store.map().len(&location, deadline)?),

            Request::QueueNew { location, ttl } => {
                store.queue().create(&location, ttl, deadline)?;
                Reply::Ack
            }
            Request::QueueDel { location } => {
                store.queue().del(&location, deadline)?;
                Reply::Ack
            }
            Request::QueuePush { location, value } => {
                store.queue().push(&location, value, deadline)?;
                Reply::Ack
            }
            Request::QueuePop { location } => Reply::Value(store.queue().pop(&location, deadline)?),
            Request::QueuePeek { location } => {
                Reply::Value(store.queue().peek(&location, deadline)?)
            }
            Request::QueueIndex { location, index } => {
                Reply::Value(store.queue().index(&location, index, deadline)?)
            }
            Request::QueueAll { location } => Reply::Items(store.queue().all(&location, deadline)?),
            Request::QueueLen { location } => Reply::Count(store.queue().len(&location, deadline)?),

            Request::Lock { location, timeout } => {
                Reply::ReleaseToken(store.locks().lock(&location, timeout, deadline)?)
            }
            Request::Unlock {
                location,
                release_token,
            } => {
                store.locks().unlock(&location, &release_token, deadline)?;
                Reply::Ack
            }
        };
        Ok(reply)
    }

    /// Answer one decoded frame.
    pub fn handle_frame(&self, frame: RequestFrame) -> ResponseFrame {
        let budget = frame
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);
        ResponseFrame {
            id: frame.id,
            result: self.dispatch(frame.request, Deadline::after(budget)),
        }
    }

    /// Answer one frame on the blocking pool.
    ///
    /// Table lock waits may last the whole request budget and must not park
    /// an async worker.
    pub async fn handle_frame_blocking(self: Arc<Self>, frame: RequestFrame) -> ResponseFrame {
        let id = frame.id;
        match tokio::task::spawn_blocking(move || self.handle_frame(frame)).await {
            Ok(response) => response,
            Err(e) => ResponseFrame {
                id,
                result: Err(StoreError::internal(format!("request task failed: {}", e))),
            },
        }
    }

    /// Serve one connection until it closes, idles out or shutdown is signalled.
    pub async fn handle_connection<S>(
        self: Arc<Self>,
        mut stream: S,
        connection_id: ConnectionId,
        settings: ConnectionSettings,
        listener_metrics: Option<Arc<ListenerMetrics>>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let codec = ServerCodec::new(settings.max_frame_bytes);
        let mut buffer = BytesMut::with_capacity(settings.read_buffer_size);
        tracing::debug!(connection = %connection_id, "connection opened");

        'conn: loop {
            tokio::select! {
                result = tokio::time::timeout(settings.idle_timeout, stream.read_buf(&mut buffer)) => {
                    let read = match result {
                        Err(_) => {
                            tracing::debug!(connection = %connection_id, "idle timeout");
                            break;
                        }
                        Ok(Err(e)) => {
                            tracing::debug!(connection = %connection_id, error = %e, "read failed");
                            break;
                        }
                        Ok(Ok(0)) => break,
                        Ok(Ok(n)) => n,
                    };
                    if let Some(ref metrics) = listener_metrics {
                        metrics.record_bytes_received(read as u64);
                    }

                    loop {
                        let response = match codec.decode(&mut buffer) {
                            DecodeResult::Incomplete => break,
                            DecodeResult::Complete(frame) => self.clone().handle_frame_blocking(frame).await,
                            DecodeResult::Invalid(message) => {
                                self.metrics.protocol_errors.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(connection = %connection_id, error = %message, "bad frame");
                                let reply = ResponseFrame {
                                    id: 0,
                                    result: Err(StoreError::protocol(message)),
                                };
                                // framing may be lost; answer once and close
                                let _ = write_frame(&codec, &mut stream, &reply, &listener_metrics).await;
                                break 'conn;
                            }
                        };
                        if write_frame(&codec, &mut stream, &response, &listener_metrics).await.is_err() {
                            break 'conn;
                        }
                    }
                }

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        let _ = stream.shutdown().await;
        tracing::debug!(connection = %connection_id, "connection closed");
    }
}

async fn write_frame<S>(
    codec: &ServerCodec,
    stream: &mut S,
    frame: &ResponseFrame,
    metrics: &Option<Arc<ListenerMetrics>>,
) -> StoreResult<()>
where
    S: AsyncWrite + Unpin,
{
    let bytes = match codec.encode(frame) {
        EncodeResult::Ok(bytes) => bytes,
        EncodeResult::Error(message) => {
            // still answer the request so the client is not left waiting
            let fallback = ResponseFrame {
                id: frame.id,
                result: Err(StoreError::protocol(message)),
            };
            match codec.encode(&fallback) {
                EncodeResult::Ok(bytes) => bytes,
                EncodeResult::Error(message) => return Err(StoreError::protocol(message)),
            }
        }
    };
    stream
        .write_all(&bytes)
        .await
        .map_err(StoreError::transport)?;
    if let Some(metrics) = metrics {
        metrics.record_bytes_sent(bytes.len() as u64);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::StoreConfig;
    use crate::rpc::codec::ClientCodec;
    use crate::store::scope::{Location, ScopeLocator};
    use bytes::Bytes;

    fn service() -> Arc<Service> {
        Arc::new(Service::from_store(Store::from_config(StoreConfig::default())))
    }

    fn loc(key: &str) -> Location {
        Location::new(ScopeLocator::global(), key)
    }

    #[test]
    fn test_dispatch_counts_failures() {
        let svc = service();
        let d = Deadline::after_ms(1_000);
        svc.dispatch(
            Request::KvSet {
                location: loc("k"),
                value: Bytes::from("v"),
                ttl: 0,
            },
            d,
        )
        .unwrap();
        assert_eq!(
            svc.dispatch(Request::KvGet { location: loc("k") }, d).unwrap(),
            Reply::Value(Bytes::from("v"))
        );
        assert!(svc
            .dispatch(Request::KvGet { location: loc("x") }, d)
            .is_err());

        assert_eq!(svc.metrics().requests_total.load(Ordering::Relaxed), 3);
        assert_eq!(svc.metrics().requests_failed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handle_frame_echoes_id() {
        let svc = service();
        let response = svc.handle_frame(RequestFrame {
            id: 77,
            timeout_ms: None,
            request: Request::QueueLen { location: loc("q") },
        });
        assert_eq!(response.id, 77);
        assert!(matches!(response.result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_lock_wait_does_not_stall_the_runtime() {
        let svc = service();
        let engine = svc.store().engine().clone();
        let token = loc("busy").tokenize().unwrap();
        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            engine
                .write(&token, Deadline::after_ms(1_000), |_, _| {
                    locked_tx.send(()).unwrap();
                    std::thread::sleep(Duration::from_millis(300));
                    Ok(())
                })
                .unwrap();
        });
        locked_rx.recv().unwrap();

        let request = tokio::spawn(svc.clone().handle_frame_blocking(RequestFrame {
            id: 5,
            timeout_ms: Some(2_000),
            request: Request::KvGet {
                location: loc("busy"),
            },
        }));

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(!request.is_finished());

        let response = request.await.unwrap();
        assert_eq!(response.id, 5);
        assert!(matches!(response.result, Err(StoreError::NotFound { .. })));
        holder.join().unwrap();
    }

    #[tokio::test]
    async fn test_connection_loop_over_duplex() {
        let svc = service();
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(svc.clone().handle_connection(
            server_side,
            ConnectionId(1),
            ConnectionSettings::default(),
            None,
            rx,
        ));

        let codec = ClientCodec::new(1 << 20);
        let (mut reader, mut writer) = tokio::io::split(client_side);
        for (id, request) in [
            (
                1,
                Request::QueueNew {
                    location: loc("q"),
                    ttl: 0,
                },
            ),
            (
                2,
                Request::QueuePush {
                    location: loc("q"),
                    value: Bytes::from("a"),
                },
            ),
            (3, Request::QueueLen { location: loc("q") }),
        ] {
            let frame = RequestFrame {
                id,
                timeout_ms: Some(500),
                request,
            };
            match codec.encode(&frame) {
                EncodeResult::Ok(bytes) => writer.write_all(&bytes).await.unwrap(),
                EncodeResult::Error(e) => panic!("{e}"),
            }
        }

        let mut buffer = BytesMut::new();
        let mut responses = Vec::new();
        while responses.len() < 3 {
            reader.read_buf(&mut buffer).await.unwrap();
            while let DecodeResult::Complete(frame) = codec.decode(&mut buffer) {
                responses.push(frame);
            }
        }

        assert_eq!(
            responses.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(responses[2].result, Ok(Reply::Count(1)));

        drop(writer);
        drop(reader);
        task.await.unwrap();
    }
}
