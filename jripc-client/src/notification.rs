//! Notification dispatch for the JSON-RPC client
//!
//! Servers push notifications (progress updates, broadcasts) without an
//! id. The client's reader task hands each one to the callback registered
//! for its method; notifications nobody registered for are logged at
//! `debug` and dropped.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jripc_client::JripcClient;
//!
//! # async fn example(client: &JripcClient) {
//! client.on_notification("progress", |notif| async move {
//!     tracing::info!(params = ?notif.params, "Progress");
//! }).await;
//! # }
//! ```

use jripc_core::JsonRpcNotification;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::Mutex;

pub type NotificationFn =
    Arc<dyn Fn(JsonRpcNotification) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Method name → callback table
#[derive(Clone, Default)]
pub struct NotificationHandler {
    handlers: Arc<Mutex<HashMap<String, NotificationFn>>>,
}

impl NotificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method`, replacing any previous one.
    pub async fn register<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(JsonRpcNotification) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: NotificationFn = Arc::new(move |notif| Box::pin(handler(notif)));
        self.handlers.lock().await.insert(method.into(), handler);
    }

    /// Run the callback for `notification`, if any.
    pub async fn handle(&self, notification: JsonRpcNotification) {
        // Clone out so the table is not locked while the callback runs
        let handler = self.handlers.lock().await.get(&notification.method).cloned();

        match handler {
            Some(handler) => handler(notification).await,
            None => {
                tracing::debug!(method = %notification.method, "No handler for notification");
            }
        }
    }

    pub async fn has_handler(&self, method: &str) -> bool {
        self.handlers.lock().await.contains_key(method)
    }

    pub async fn unregister(&self, method: &str) -> bool {
        self.handlers.lock().await.remove(method).is_some()
    }

    pub async fn methods(&self) -> Vec<String> {
        self.handlers.lock().await.keys().cloned().collect()
    }
}
