//! Common test utilities for jripc-client integration tests
//!
//! A scripted IPC server: every line a client sends is decoded, recorded,
//! and handed to a reply function whose lines are written back verbatim.

#![allow(dead_code)]

use jripc_core::{Id, JsonRpcMessage, LineCodec};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Scripted server bound to a socket in a temporary directory
pub struct MockIpcServer {
    _dir: TempDir,
    path: PathBuf,
    shutdown: CancellationToken,
    message_rx: mpsc::UnboundedReceiver<JsonRpcMessage>,
}

impl MockIpcServer {
    /// A server that never answers
    pub async fn silent() -> Self {
        Self::with_handler(|_msg| Vec::new()).await
    }

    /// A server that answers each line with the lines `handler` returns
    pub async fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(JsonRpcMessage) -> Vec<String> + Send + Sync + 'static,
    {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mock.sock");
        let listener = jripc_core::listen(&path.to_string_lossy()).await.unwrap();

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let (msg_tx, message_rx) = mpsc::unbounded_channel();
        let handler = Arc::new(handler);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    accepted = listener.accept() => {
                        let Ok((stream, _peer)) = accepted else { break };
                        let msg_tx = msg_tx.clone();
                        let handler = Arc::clone(&handler);
                        let stop = stop.clone();

                        tokio::spawn(async move {
                            let codec = LineCodec::new(stream);
                            loop {
                                let line = tokio::select! {
                                    _ = stop.cancelled() => break,
                                    line = codec.read_message() => line,
                                };
                                let Ok(line) = line else { break };
                                let Ok(message) = jripc_core::codec::decode(&line) else { continue };

                                let _ = msg_tx.send(message.clone());
                                for reply in handler(message) {
                                    if codec.write_message(reply.as_bytes()).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        });
                    }
                }
            }
        });

        Self {
            _dir: dir,
            path,
            shutdown,
            message_rx,
        }
    }

    pub fn path(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Next message a client sent, or `None` after five seconds
    pub async fn wait_for_message(&mut self) -> Option<JsonRpcMessage> {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.message_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Stop accepting and drop every client connection
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

pub fn mock_response(id: &Id, result: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id
    })
    .to_string()
}

pub fn mock_error_response(id: &Id, code: i32, message: &str) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message
        },
        "id": id
    })
    .to_string()
}

pub fn mock_notification(method: &str, params: serde_json::Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params
    })
    .to_string()
}
