//! Common helpers for jripc-server integration tests
//!
//! Servers bind inside a temporary directory and run on a spawned task;
//! raw clients talk to them through a bare `LineCodec` so tests can check
//! exact bytes on the wire.

#![allow(dead_code)]

use jripc_core::{JsonRpcMessage, LineCodec};
use jripc_server::{JripcServer, ServerBuilder};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub server: Arc<JripcServer>,
    pub task: JoinHandle<jripc_core::Result<()>>,
    _dir: TempDir,
}

impl TestServer {
    /// Bind `builder` to a fresh socket and start accepting.
    pub async fn start(builder: ServerBuilder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jripc-test.sock");

        let server = Arc::new(builder.bind(path.to_string_lossy()).build().await.unwrap());
        let task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.run().await })
        };

        Self {
            server,
            task,
            _dir: dir,
        }
    }

    pub fn path(&self) -> String {
        self.server.socket_path().to_string()
    }

    /// Connect a raw line-level client.
    pub async fn raw_client(&self) -> LineCodec {
        LineCodec::new(jripc_core::dial(&self.path()).await.unwrap())
    }

    /// Connect a raw client and wait until the server has registered it.
    pub async fn registered_client(&self) -> LineCodec {
        let before = self.server.connection_count();
        let client = self.raw_client().await;
        let server = Arc::clone(&self.server);
        eventually(move || {
            let server = Arc::clone(&server);
            async move { server.connection_count() > before }
        })
        .await;
        client
    }

    pub async fn stop(&self) {
        self.server.stop(Duration::from_millis(200)).await.unwrap();
    }
}

/// Send one line and return the next line received, as text.
pub async fn roundtrip(client: &LineCodec, line: &str) -> String {
    client.write_message(line.as_bytes()).await.unwrap();
    next_line(client).await
}

/// Next line received, as text; fails the test after two seconds.
pub async fn next_line(client: &LineCodec) -> String {
    let line = tokio::time::timeout(Duration::from_secs(2), client.read_message())
        .await
        .expect("timed out waiting for a line")
        .unwrap();
    String::from_utf8(line).unwrap()
}

/// Next message received, decoded.
pub async fn next_message(client: &LineCodec) -> JsonRpcMessage {
    serde_json::from_str(&next_line(client).await).unwrap()
}

/// Poll `check` until it holds, failing the test after two seconds.
pub async fn eventually<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within two seconds");
}
