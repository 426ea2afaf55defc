//! Server public API integration tests

#![cfg(unix)]

mod common;

use common::{eventually, next_message, roundtrip, TestServer};
use jripc_core::Error;
use jripc_server::{from_fn, JripcServer};
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ping() -> jripc_server::ServerBuilder {
    JripcServer::builder().handler("ping", from_fn(|_ctx, _params| async { Ok(json!("pong")) }))
}

#[tokio::test]
async fn test_server_binds_socket() {
    let server = TestServer::start(ping()).await;

    assert!(Path::new(&server.path()).exists());
    assert_eq!(server.server.methods(), vec!["ping".to_string()]);
    assert_eq!(server.server.connection_count(), 0);
    assert!(!server.server.is_stopped());

    server.stop().await;
}

#[tokio::test]
async fn test_path_is_reusable_after_stop() {
    let server = TestServer::start(ping()).await;
    let path = server.path();
    server.stop().await;
    server.task.await.unwrap().unwrap();

    let again = Arc::new(ping().bind(path.clone()).build().await.unwrap());
    assert_eq!(again.socket_path(), path);
    let run = {
        let again = Arc::clone(&again);
        tokio::spawn(async move { again.run().await })
    };

    let client = jripc_core::LineCodec::new(jripc_core::dial(&path).await.unwrap());
    let reply = roundtrip(&client, r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
    assert_eq!(reply, r#"{"jsonrpc":"2.0","result":"pong","id":1}"#);

    drop(client);
    again.stop(Duration::from_millis(200)).await.unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_register_handler_at_runtime() {
    let server = TestServer::start(JripcServer::builder()).await;
    let client = server.raw_client().await;

    client
        .write_message(br#"{"jsonrpc":"2.0","method":"late","id":1}"#)
        .await
        .unwrap();
    assert_eq!(next_message(&client).await.error.unwrap().code, -32601);

    server
        .server
        .register_fn("late", |_ctx, _params| async { Ok(json!("here")) });

    let reply = roundtrip(&client, r#"{"jsonrpc":"2.0","method":"late","id":2}"#).await;
    assert_eq!(reply, r#"{"jsonrpc":"2.0","result":"here","id":2}"#);

    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_client() {
    let server = TestServer::start(ping()).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(server.registered_client().await);
    }

    let delivered = server
        .server
        .broadcast("tick", Some(json!({"n": 1})))
        .await;
    assert_eq!(delivered, 3);

    for client in &clients {
        let msg = next_message(client).await;
        assert!(msg.is_notification());
        assert_eq!(msg.method.as_deref(), Some("tick"));
        assert_eq!(msg.params, Some(json!({"n": 1})));
        assert!(msg.id.is_none());
    }

    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_skips_departed_clients() {
    let server = TestServer::start(ping()).await;

    let stays = server.registered_client().await;
    let leaves = server.registered_client().await;
    leaves.shutdown().await.unwrap();
    drop(leaves);

    let srv = Arc::clone(&server.server);
    eventually(move || {
        let srv = Arc::clone(&srv);
        async move { srv.connection_count() == 1 }
    })
    .await;

    assert_eq!(server.server.broadcast("tick", None).await, 1);
    let msg = next_message(&stays).await;
    assert_eq!(msg.method.as_deref(), Some("tick"));
    assert!(msg.params.is_none());

    server.stop().await;
}

#[tokio::test]
async fn test_broadcast_with_no_clients() {
    let server = TestServer::start(ping()).await;
    assert_eq!(server.server.broadcast("tick", None).await, 0);
    server.stop().await;
}

#[tokio::test]
async fn test_stop_removes_socket_and_is_idempotent() {
    let server = TestServer::start(ping()).await;
    let path = server.path();
    let _client = server.registered_client().await;
    let token = server.server.shutdown_token();
    assert!(!token.is_cancelled());

    server.stop().await;
    assert!(token.is_cancelled());
    assert!(server.server.is_stopped());
    assert!(!Path::new(&path).exists());
    assert_eq!(server.server.connection_count(), 0);

    server.stop().await;

    // Run returns once stopped
    let result = tokio::time::timeout(Duration::from_secs(2), server.task)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_run_twice_fails() {
    let server = TestServer::start(ping()).await;
    server.registered_client().await;

    let second = server.server.run().await;
    assert!(matches!(second, Err(Error::Internal(_))));

    server.stop().await;
}

#[tokio::test]
async fn test_stop_waits_for_inflight_requests() {
    let builder = JripcServer::builder().handler(
        "slow",
        from_fn(|_ctx, _params| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!("finished"))
        }),
    );
    let server = TestServer::start(builder).await;
    let client = server.registered_client().await;

    client
        .write_message(br#"{"jsonrpc":"2.0","method":"slow","id":1}"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let stopping = {
        let server = Arc::clone(&server.server);
        tokio::spawn(async move { server.stop(Duration::from_secs(1)).await })
    };

    let reply = next_message(&client).await;
    assert_eq!(reply.result, Some(json!("finished")));

    drop(client);
    stopping.await.unwrap().unwrap();
    assert_eq!(server.server.connection_count(), 0);
}

#[tokio::test]
async fn test_stop_force_closes_after_deadline() {
    let builder = JripcServer::builder().handler(
        "hang",
        from_fn(|ctx, _params| async move {
            ctx.cancellation().cancelled().await;
            Err(Error::Internal("cancelled".to_string()))
        }),
    );
    let server = TestServer::start(builder).await;
    let client = server.registered_client().await;

    client
        .write_message(br#"{"jsonrpc":"2.0","method":"hang","id":1}"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let start = std::time::Instant::now();
    server.server.stop(Duration::from_millis(50)).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(server.server.connection_count(), 0);
}

#[tokio::test]
async fn test_stop_force_closes_client_that_stopped_reading() {
    let disconnects = Arc::new(AtomicUsize::new(0));
    let builder = {
        let disconnects = Arc::clone(&disconnects);
        JripcServer::builder()
            .handler(
                "flood",
                from_fn(|_ctx, _params| async { Ok(json!("x".repeat(8 * 1024 * 1024))) }),
            )
            .on_disconnect(move |_conn| {
                disconnects.fetch_add(1, Ordering::SeqCst);
            })
    };
    let server = TestServer::start(builder).await;
    let client = server.registered_client().await;

    // The reply is far larger than the socket buffer and is never read
    client
        .write_message(br#"{"jsonrpc":"2.0","method":"flood","id":1}"#)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let start = std::time::Instant::now();
    server.server.stop(Duration::from_millis(50)).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);

    drop(client);
}

#[tokio::test]
async fn test_connection_hooks_fire() {
    let connects = Arc::new(AtomicUsize::new(0));
    let disconnects = Arc::new(AtomicUsize::new(0));

    let builder = {
        let connects = Arc::clone(&connects);
        let disconnects = Arc::clone(&disconnects);
        ping()
            .on_connect(move |conn| {
                assert!(!conn.is_closed());
                connects.fetch_add(1, Ordering::SeqCst);
            })
            .on_disconnect(move |_conn| {
                disconnects.fetch_add(1, Ordering::SeqCst);
            })
    };
    let server = TestServer::start(builder).await;

    let a = server.registered_client().await;
    let b = server.registered_client().await;

    let seen = Arc::clone(&connects);
    eventually(move || {
        let seen = Arc::clone(&seen);
        async move { seen.load(Ordering::SeqCst) == 2 }
    })
    .await;

    drop(a);
    drop(b);

    let seen = Arc::clone(&disconnects);
    eventually(move || {
        let seen = Arc::clone(&seen);
        async move { seen.load(Ordering::SeqCst) == 2 }
    })
    .await;

    server.stop().await;
}

#[tokio::test]
async fn test_run_until_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("signal.sock");
    let server = ping().bind(path.to_string_lossy()).build().await.unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        server
            .run_until(
                async {
                    let _ = rx.await;
                },
                Duration::from_millis(100),
            )
            .await
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(!path.exists());
}
