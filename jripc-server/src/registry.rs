//! Method registry shared by every connection of a server
//!
//! The registry maps method names to handlers. It is cheaply cloneable and
//! every clone sees the same table, so handlers registered while the server
//! is running become visible to all live connections immediately.
//!
//! Lookups take a shared read lock and return an `Arc` to the handler, so
//! the lock is never held while a handler runs.
//!
//! # Examples
//!
//! ```rust
//! use jripc_server::{HandlerRegistry, from_fn};
//!
//! let registry = HandlerRegistry::new();
//! registry.register("ping", from_fn(|_ctx, _params| async {
//!     Ok(serde_json::json!({"pong": true}))
//! }));
//!
//! assert!(registry.has("ping"));
//! registry.unregister("ping");
//! assert!(registry.is_empty());
//! ```

use crate::handler::{from_fn, Handler, RequestContext};
use jripc_core::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

type HandlerMap = HashMap<String, Arc<dyn Handler>>;

/// Concurrent method-name → handler table
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HandlerMap>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking writer cannot leave the map half-updated, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HandlerMap> {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HandlerMap> {
        self.handlers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handler` for `method`, replacing any previous handler.
    pub fn register(&self, method: impl Into<String>, handler: Box<dyn Handler>) {
        let method = method.into();
        if self.write().insert(method.clone(), Arc::from(handler)).is_some() {
            tracing::debug!(method = %method, "Replaced handler");
        }
    }

    /// Register an async closure for `method`.
    pub fn register_fn<F, Fut>(&self, method: impl Into<String>, func: F)
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.register(method, from_fn(func));
    }

    pub fn get(&self, method: &str) -> Option<Arc<dyn Handler>> {
        self.read().get(method).cloned()
    }

    pub fn has(&self, method: &str) -> bool {
        self.read().contains_key(method)
    }

    /// Remove the handler for `method`. Returns whether one was registered.
    pub fn unregister(&self, method: &str) -> bool {
        self.write().remove(method).is_some()
    }

    /// Registered method names, in no particular order.
    pub fn methods(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
