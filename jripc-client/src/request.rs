//! Request tracking for the JSON-RPC client
//!
//! Correlates outgoing requests with the responses the reader task picks
//! off the stream.
//!
//! # Request Lifecycle
//!
//! 1. **Generate ID**: next value of a per-client counter, starting at 1
//! 2. **Register**: park a oneshot sender under that id
//! 3. **Send**: write the request line
//! 4. **Complete**: the reader task matches the response id and fires the sender
//!
//! Responses may arrive in any order; only the id matters. Ids compare by
//! value, so a response carrying `1.0` completes the request sent as `1`.
//!
//! Timeouts are applied by the caller, racing the receiver against
//! `tokio::time::timeout` and calling [`RequestManager::cancel`] on expiry.

use jripc_core::{Error, Id, JsonRpcResponse, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

type ResponseSender = oneshot::Sender<Result<JsonRpcResponse>>;

/// Table of requests waiting for a response
#[derive(Clone, Default)]
pub struct RequestManager {
    pending: Arc<Mutex<HashMap<Id, ResponseSender>>>,
    counter: Arc<AtomicU64>,
}

impl RequestManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next request id
    pub fn next_id(&self) -> Id {
        Id::from(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Park a request and return the receiver its response will arrive on.
    pub async fn register(&self, id: Id) -> oneshot::Receiver<Result<JsonRpcResponse>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        rx
    }

    /// Deliver `response` to the request with the same id.
    ///
    /// Returns `false` when nothing was waiting for it.
    pub async fn complete(&self, response: JsonRpcResponse) -> bool {
        match self.pending.lock().await.remove(&response.id) {
            Some(tx) => {
                let _ = tx.send(Ok(response));
                true
            }
            None => false,
        }
    }

    /// Stop waiting for `id`, for example after a timeout.
    pub async fn cancel(&self, id: &Id) {
        self.pending.lock().await.remove(id);
    }

    /// Fail every waiting request with `error`.
    pub async fn fail_all(&self, error: Error) {
        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential() {
        let manager = RequestManager::new();
        assert_eq!(manager.next_id(), Id::from(1));
        assert_eq!(manager.next_id(), Id::from(2));
        assert_eq!(manager.clone().next_id(), Id::from(3));
    }

    #[tokio::test]
    async fn test_register_and_complete() {
        let manager = RequestManager::new();
        let id = manager.next_id();

        let rx = manager.register(id.clone()).await;
        assert_eq!(manager.pending_count().await, 1);

        let response = JsonRpcResponse::success(serde_json::json!(42), id);
        assert!(manager.complete(response.clone()).await);
        assert_eq!(manager.pending_count().await, 0);

        assert_eq!(rx.await.unwrap().unwrap(), response);
    }

    #[tokio::test]
    async fn test_complete_matches_float_id() {
        let manager = RequestManager::new();
        let rx = manager.register(Id::from(7)).await;

        let response = JsonRpcResponse::success(serde_json::Value::Null, Id::from(7.0));
        assert!(manager.complete(response).await);
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_response_is_dropped() {
        let manager = RequestManager::new();
        let response = JsonRpcResponse::success(serde_json::Value::Null, Id::from("stray"));
        assert!(!manager.complete(response).await);
    }

    #[tokio::test]
    async fn test_fail_all() {
        let manager = RequestManager::new();
        let rx1 = manager.register(Id::from(1)).await;
        let rx2 = manager.register(Id::from(2)).await;

        manager.fail_all(Error::ConnectionClosed).await;

        assert!(matches!(rx1.await.unwrap(), Err(Error::ConnectionClosed)));
        assert!(matches!(rx2.await.unwrap(), Err(Error::ConnectionClosed)));
        assert_eq!(manager.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_cancel() {
        let manager = RequestManager::new();
        let rx = manager.register(Id::from(1)).await;
        manager.cancel(&Id::from(1)).await;

        assert!(rx.await.is_err());
    }
}
