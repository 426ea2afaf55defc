//! Middleware integration tests

#![cfg(unix)]

mod common;

use common::{next_message, roundtrip, TestServer};
use jripc_core::{Error, Result};
use jripc_server::{
    from_fn, middleware_fn, JripcServer, LoggingMiddleware, RecoveryMiddleware,
    TimeoutMiddleware,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn explode(message: &'static str) -> Result<Value> {
    panic!("{}", message)
}

fn tagging(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> impl jripc_server::Middleware + 'static {
    middleware_fn(move |ctx, params, next| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(format!("{}:{}", tag, ctx.method()));
            next.handle(ctx, params).await
        }
    })
}

#[tokio::test]
async fn test_middleware_runs_in_registration_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let builder = JripcServer::builder()
        .use_middleware(tagging("outer", Arc::clone(&log)))
        .use_middleware(tagging("inner", Arc::clone(&log)))
        .handler("ping", from_fn(|_ctx, _params| async { Ok(json!("pong")) }));
    let server = TestServer::start(builder).await;
    assert_eq!(server.server.middleware_count(), 2);

    let client = server.raw_client().await;
    let reply = roundtrip(&client, r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
    assert_eq!(reply, r#"{"jsonrpc":"2.0","result":"pong","id":1}"#);

    assert_eq!(*log.lock().unwrap(), vec!["outer:ping", "inner:ping"]);
    server.stop().await;
}

#[tokio::test]
async fn test_middleware_skipped_for_unknown_method() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let builder = JripcServer::builder().use_middleware(tagging("seen", Arc::clone(&log)));
    let server = TestServer::start(builder).await;

    let client = server.raw_client().await;
    client
        .write_message(br#"{"jsonrpc":"2.0","method":"missing","id":1}"#)
        .await
        .unwrap();
    assert_eq!(next_message(&client).await.error.unwrap().code, -32601);
    assert!(log.lock().unwrap().is_empty());

    server.stop().await;
}

#[tokio::test]
async fn test_recovery_answers_panics() {
    let builder = JripcServer::builder()
        .use_middleware(RecoveryMiddleware)
        .handler("crash", from_fn(|_ctx, _params| explode("kaboom")))
        .handler("ping", from_fn(|_ctx, _params| async { Ok(json!("pong")) }));
    let server = TestServer::start(builder).await;
    let client = server.raw_client().await;

    client
        .write_message(br#"{"jsonrpc":"2.0","method":"crash","id":1}"#)
        .await
        .unwrap();
    let reply = next_message(&client).await;
    let error = reply.error.unwrap();
    assert_eq!(error.code, -32603);
    assert_eq!(error.data, Some(json!({"panic": "kaboom", "method": "crash"})));

    // The connection survives the panic
    let reply = roundtrip(&client, r#"{"jsonrpc":"2.0","method":"ping","id":2}"#).await;
    assert_eq!(reply, r#"{"jsonrpc":"2.0","result":"pong","id":2}"#);

    server.stop().await;
}

#[tokio::test]
async fn test_unrecovered_panic_drops_only_that_connection() {
    let builder = JripcServer::builder()
        .handler("crash", from_fn(|_ctx, _params| explode("unguarded")))
        .handler("ping", from_fn(|_ctx, _params| async { Ok(json!("pong")) }));
    let server = TestServer::start(builder).await;

    let victim = server.registered_client().await;
    let bystander = server.registered_client().await;

    victim
        .write_message(br#"{"jsonrpc":"2.0","method":"crash","id":1}"#)
        .await
        .unwrap();
    let end = tokio::time::timeout(Duration::from_secs(2), victim.read_message())
        .await
        .unwrap();
    assert!(matches!(end, Err(Error::ConnectionClosed)));

    let reply = roundtrip(&bystander, r#"{"jsonrpc":"2.0","method":"ping","id":2}"#).await;
    assert_eq!(reply, r#"{"jsonrpc":"2.0","result":"pong","id":2}"#);

    server.stop().await;
}

#[tokio::test]
async fn test_timeout_answers_slow_calls() {
    let builder = JripcServer::builder()
        .use_middleware(TimeoutMiddleware::new(Duration::from_millis(50)))
        .handler(
            "slow",
            from_fn(|_ctx, _params| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(json!("late"))
            }),
        )
        .handler("fast", from_fn(|_ctx, _params| async { Ok(json!("quick")) }));
    let server = TestServer::start(builder).await;
    let client = server.raw_client().await;

    let start = std::time::Instant::now();
    client
        .write_message(br#"{"jsonrpc":"2.0","method":"slow","id":1}"#)
        .await
        .unwrap();
    let reply = next_message(&client).await;
    assert!(start.elapsed() < Duration::from_secs(1));

    let error = reply.error.unwrap();
    assert_eq!(error.code, -32603);
    assert_eq!(error.data, Some(json!("request timeout")));

    let reply = roundtrip(&client, r#"{"jsonrpc":"2.0","method":"fast","id":2}"#).await;
    assert_eq!(reply, r#"{"jsonrpc":"2.0","result":"quick","id":2}"#);

    server.stop().await;
}

#[tokio::test]
async fn test_recovery_outside_timeout() {
    let builder = JripcServer::builder()
        .use_middleware(RecoveryMiddleware)
        .use_middleware(TimeoutMiddleware::new(Duration::from_secs(1)))
        .handler("crash", from_fn(|_ctx, _params| explode("inside timeout")));
    let server = TestServer::start(builder).await;
    let client = server.raw_client().await;

    client
        .write_message(br#"{"jsonrpc":"2.0","method":"crash","id":1}"#)
        .await
        .unwrap();
    let error = next_message(&client).await.error.unwrap();
    assert_eq!(error.code, -32603);
    assert_eq!(error.data.unwrap()["panic"], "inside timeout");

    server.stop().await;
}

#[tokio::test]
async fn test_logging_reports_each_call() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let logger = {
        let calls = Arc::clone(&calls);
        LoggingMiddleware::with_logger(move |method: &str, _elapsed: Duration, err: Option<&Error>| {
            calls.lock().unwrap().push((method.to_string(), err.is_some()));
        })
    };

    let builder = JripcServer::builder()
        .use_middleware(logger)
        .handler("ok", from_fn(|_ctx, _params| async { Ok(json!(true)) }))
        .handler(
            "fail",
            from_fn(|_ctx, _params| async { Err(Error::Internal("nope".to_string())) }),
        );
    let server = TestServer::start(builder).await;
    let client = server.raw_client().await;

    roundtrip(&client, r#"{"jsonrpc":"2.0","method":"ok","id":1}"#).await;
    roundtrip(&client, r#"{"jsonrpc":"2.0","method":"fail","id":2}"#).await;

    assert_eq!(
        *calls.lock().unwrap(),
        vec![("ok".to_string(), false), ("fail".to_string(), true)]
    );
    server.stop().await;
}

#[tokio::test]
async fn test_runtime_middleware_applies_to_new_connections() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let builder = JripcServer::builder()
        .handler("ping", from_fn(|_ctx, _params| async { Ok(json!("pong")) }));
    let server = TestServer::start(builder).await;

    let early = server.registered_client().await;
    server
        .server
        .register_middleware(Arc::new(tagging("late", Arc::clone(&log))));
    assert_eq!(server.server.middleware_count(), 1);

    roundtrip(&early, r#"{"jsonrpc":"2.0","method":"ping","id":1}"#).await;
    assert!(log.lock().unwrap().is_empty());

    let fresh = server.registered_client().await;
    roundtrip(&fresh, r#"{"jsonrpc":"2.0","method":"ping","id":2}"#).await;
    assert_eq!(*log.lock().unwrap(), vec!["late:ping"]);

    server.stop().await;
}
