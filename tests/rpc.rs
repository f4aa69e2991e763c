//! End-to-end tests through the TCP listener and the client facade.

mod common;

use bytes::{BufMut, Bytes, BytesMut};
use common::loopback_config;
use scopestore::core::error::StoreError;
use scopestore::core::runtime::Runtime;
use scopestore::rpc::client::Client;
use scopestore::rpc::codec::{DecodeResult, EncodeResult, ProtocolCodec, ServerCodec};
use scopestore::rpc::{Reply, ResponseFrame};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn started_runtime() -> Runtime {
    let mut runtime = Runtime::new(loopback_config()).expect("valid config");
    runtime.start().await.expect("runtime starts");
    runtime
}

async fn connected_client(runtime: &Runtime) -> Client {
    let addr = runtime.local_addr().expect("listener bound");
    let client = Client::new(addr, Duration::from_secs(2));
    client.connect().await.expect("client connects");
    client
}

#[tokio::test]
async fn calls_before_connect_fail() {
    let runtime = started_runtime().await;
    let addr = runtime.local_addr().unwrap();
    let client = Client::new(addr, Duration::from_secs(1));

    let err = client.global().kv().get("k").await.unwrap_err();
    assert_eq!(err, StoreError::NotConnected);

    client.connect().await.unwrap();
    client.disconnect().await.unwrap();
    let err = client.global().kv().get("k").await.unwrap_err();
    assert_eq!(err, StoreError::NotConnected);
}

#[tokio::test]
async fn scalar_roundtrip_over_tcp() {
    let mut runtime = started_runtime().await;
    let client = connected_client(&runtime).await;
    let kv = client.global().kv();

    kv.set("key1", "val1", 0).await.unwrap();
    assert_eq!(kv.get("key1").await.unwrap(), "val1");
    kv.set("key1", "val2", 0).await.unwrap();
    assert_eq!(kv.get("key1").await.unwrap(), "val2");

    kv.del("key1").await.unwrap();
    let err = kv.get("key1").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(err.to_string(), "key \"global.key1\" not present at store");

    client.disconnect().await.unwrap();
    runtime.stop().await.unwrap();
}

#[tokio::test]
async fn errors_cross_the_wire_intact() {
    let runtime = started_runtime().await;
    let client = connected_client(&runtime).await;
    let scope = client.bridge("b1");

    scope.kv().set("word", "abc", 0).await.unwrap();
    assert!(matches!(
        scope.kv().incr("word", 1).await,
        Err(StoreError::NotNumeric { .. })
    ));

    scope.queue().create("q", 0).await.unwrap();
    assert!(matches!(
        scope.queue().items("q").index(4).await,
        Err(StoreError::IndexOutOfRange { index: 4, len: 0, .. })
    ));

    let token = scope.lock().lock("job", 30).await.unwrap();
    assert!(matches!(
        scope.lock().lock("job", 30).await,
        Err(StoreError::AlreadyLocked { .. })
    ));
    assert!(matches!(
        scope.lock().unlock("job", "not-the-token").await,
        Err(StoreError::LockMismatch { .. })
    ));
    scope.lock().unlock("job", &token).await.unwrap();
}

#[tokio::test]
async fn containers_over_tcp() {
    let runtime = started_runtime().await;
    let client = connected_client(&runtime).await;
    let scope = client.instance("b1", "i1");

    scope.map().create("stats", 0).await.unwrap();
    let stats = scope.map().fields("stats");
    stats.set("hits", "0").await.unwrap();
    stats.incr("hits", 3).await.unwrap();
    stats.set("name", "edge").await.unwrap();
    let all = stats.all().await.unwrap();
    assert_eq!(all.get("hits").unwrap(), "3");
    assert_eq!(stats.len().await.unwrap(), 2);

    scope.queue().create("jobs", 0).await.unwrap();
    let jobs = scope.queue().items("jobs");
    jobs.push("first").await.unwrap();
    jobs.push("second").await.unwrap();
    assert_eq!(jobs.peek().await.unwrap(), "first");
    assert_eq!(jobs.pop().await.unwrap(), "first");
    assert_eq!(jobs.all().await.unwrap(), vec!["second"]);
}

#[tokio::test]
async fn clients_share_one_store() {
    let runtime = started_runtime().await;
    let writer = connected_client(&runtime).await;
    let reader = connected_client(&runtime).await;

    writer.bridge("b").kv().set("k", "shared", 0).await.unwrap();
    assert_eq!(reader.bridge("b").kv().get("k").await.unwrap(), "shared");
    assert!(reader.bridge("other").kv().get("k").await.is_err());

    let metrics = runtime.listener_metrics().expect("listener started");
    assert_eq!(metrics.connections_total.load(Ordering::Relaxed), 2);
    assert!(metrics.bytes_received.load(Ordering::Relaxed) > 0);
}

#[tokio::test]
async fn concurrent_increments_are_atomic() {
    let runtime = started_runtime().await;
    let client = connected_client(&runtime).await;
    let kv = client.global().kv();
    kv.set("n", "0", 0).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let kv = kv.clone();
        tasks.spawn(async move { kv.incr("n", 1).await });
    }
    let mut values = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        values.push(joined.unwrap().unwrap());
    }
    values.sort_unstable();
    assert_eq!(values, (1..=20).collect::<Vec<i64>>());
    assert_eq!(kv.get("n").await.unwrap(), "20");
}

#[tokio::test]
async fn malformed_frame_gets_protocol_error() {
    let runtime = started_runtime().await;
    let addr = runtime.local_addr().unwrap();
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut frame = BytesMut::new();
    frame.put_u32(7);
    frame.put_slice(b"garbage");
    stream.write_all(&frame).await.unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await.unwrap();
    assert!(reply.len() > 4);
    let body: serde_json::Value = serde_json::from_slice(&reply[4..]).unwrap();
    assert_eq!(body["id"], 0);
    assert_eq!(body["result"]["Err"]["code"], "protocol");
}

#[tokio::test]
async fn shutdown_closes_connections() {
    let mut runtime = started_runtime().await;
    let client = connected_client(&runtime).await;
    client.global().kv().set("k", "v", 0).await.unwrap();

    runtime.stop().await.unwrap();

    let err = client.global().kv().get("k").await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Transport { .. } | StoreError::NotConnected
    ));
}

/// Server whose first connection accepts bytes but never answers. Later
/// connections answer every request with the value `fresh`.
async fn stalling_server() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = accepted.clone();

    tokio::spawn(async move {
        let mut stalled = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                stalled.push(stream);
                continue;
            }
            tokio::spawn(answer_fresh(stream));
        }
    });

    (addr, accepted)
}

async fn answer_fresh(mut stream: TcpStream) {
    let codec = ServerCodec::new(1024 * 1024);
    let mut buffer = BytesMut::new();
    loop {
        match codec.decode(&mut buffer) {
            DecodeResult::Complete(frame) => {
                let response = ResponseFrame {
                    id: frame.id,
                    result: Ok(Reply::Value(Bytes::from_static(b"fresh"))),
                };
                let EncodeResult::Ok(bytes) = codec.encode(&response) else {
                    return;
                };
                if stream.write_all(&bytes).await.is_err() {
                    return;
                }
                continue;
            }
            DecodeResult::Incomplete => {}
            DecodeResult::Invalid(_) => return,
        }
        match stream.read_buf(&mut buffer).await {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

#[tokio::test]
async fn timed_out_call_does_not_poison_the_next_one() {
    let (addr, accepted) = stalling_server().await;
    let client = Client::new(addr, Duration::from_millis(200));
    client.connect().await.unwrap();
    let kv = client.global().kv();

    let err = kv.get("slow").await.unwrap_err();
    assert!(matches!(err, StoreError::Timeout { .. }), "{err:?}");
    assert!(client.is_connected());

    // the abandoned exchange forces a fresh connection
    assert_eq!(kv.get("next").await.unwrap(), "fresh");
    assert_eq!(kv.get("again").await.unwrap(), "fresh");
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}
