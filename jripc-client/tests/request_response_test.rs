//! Request/response integration tests
//!
//! Success, server errors, timeouts, typed params and notifications against
//! a scripted server.

#![cfg(unix)]

mod common;

use common::{mock_error_response, mock_notification, mock_response, MockIpcServer};
use jripc_client::JripcClient;
use jripc_core::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestParams {
    value: i32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct TestResult {
    doubled: i32,
}

fn doubler(msg: jripc_core::JsonRpcMessage) -> Vec<String> {
    let Some(id) = msg.id else {
        return Vec::new();
    };
    match msg.method.as_deref() {
        Some("double") => {
            let value = msg.params.as_ref().and_then(|p| p["value"].as_i64()).unwrap_or(0);
            vec![mock_response(&id, serde_json::json!({"doubled": value * 2}))]
        }
        _ => vec![mock_error_response(&id, -32601, "Method not found")],
    }
}

#[tokio::test]
async fn test_typed_request() {
    let mut server = MockIpcServer::with_handler(doubler).await;
    let client = JripcClient::connect(&server.path()).await.unwrap();

    let result: TestResult = client
        .request("double", TestParams { value: 21 })
        .await
        .unwrap();
    assert_eq!(result, TestResult { doubled: 42 });

    let seen = server.wait_for_message().await.unwrap();
    assert_eq!(seen.jsonrpc.as_deref(), Some("2.0"));
    assert_eq!(seen.params, Some(serde_json::json!({"value": 21})));

    client.close().await.unwrap();
    server.shutdown();
}

#[tokio::test]
async fn test_request_ids_are_unique() {
    let mut server = MockIpcServer::with_handler(doubler).await;
    let client = JripcClient::connect(&server.path()).await.unwrap();

    for value in 0..3 {
        let _: TestResult = client
            .request("double", TestParams { value })
            .await
            .unwrap();
    }

    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(server.wait_for_message().await.unwrap().id.unwrap());
    }
    assert_ne!(ids[0], ids[1]);
    assert_ne!(ids[1], ids[2]);
    assert_ne!(ids[0], ids[2]);

    server.shutdown();
}

#[tokio::test]
async fn test_error_response() {
    let server = MockIpcServer::with_handler(doubler).await;
    let client = JripcClient::connect(&server.path()).await.unwrap();

    let err = client
        .request::<_, serde_json::Value>("triple", TestParams { value: 1 })
        .await
        .unwrap_err();

    match err {
        Error::JsonRpc(data) => {
            assert_eq!(data.code, -32601);
            assert_eq!(data.message, "Method not found");
        }
        other => panic!("expected JSON-RPC error, got {:?}", other),
    }
    server.shutdown();
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockIpcServer::silent().await;
    let client = JripcClient::connect(&server.path()).await.unwrap();

    let start = std::time::Instant::now();
    let err = client
        .request_with_timeout::<_, serde_json::Value>("test", (), Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout));
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!client.is_closed());
    server.shutdown();
}

#[tokio::test]
async fn test_notify_sends_no_id() {
    let mut server = MockIpcServer::silent().await;
    let client = JripcClient::connect(&server.path()).await.unwrap();

    client
        .notify("log", serde_json::json!({"level": "info"}))
        .await
        .unwrap();

    let seen = server.wait_for_message().await.unwrap();
    assert!(seen.is_notification());
    assert_eq!(seen.method.as_deref(), Some("log"));
    assert!(seen.id.is_none());
    server.shutdown();
}

#[tokio::test]
async fn test_notifications_before_response() {
    let server = MockIpcServer::with_handler(|msg| match msg.id {
        Some(id) => vec![
            mock_notification("progress", serde_json::json!({"current": 1, "total": 2})),
            mock_notification("progress", serde_json::json!({"current": 2, "total": 2})),
            mock_response(&id, serde_json::json!("done")),
        ],
        None => Vec::new(),
    })
    .await;
    let client = JripcClient::connect(&server.path()).await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client
        .on_notification("progress", move |notif| {
            let tx = tx.clone();
            async move {
                let current = notif.params.as_ref().and_then(|p| p["current"].as_u64());
                let _ = tx.send(current);
            }
        })
        .await;

    let result: String = client.request("work", ()).await.unwrap();
    assert_eq!(result, "done");

    // Callbacks run in arrival order, before the response is routed
    assert_eq!(rx.recv().await.unwrap(), Some(1));
    assert_eq!(rx.recv().await.unwrap(), Some(2));
    server.shutdown();
}
