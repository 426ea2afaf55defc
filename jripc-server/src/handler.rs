//! Handler traits and types for JSON-RPC methods
//!
//! A handler is the unit of application logic bound to one method name. It
//! receives a [`RequestContext`] describing the call and the raw `params`,
//! and produces a JSON result or an error.
//!
//! # Handler Trait
//!
//! - **Async-compatible**: returns a pinned, boxed future
//! - **Thread-safe**: `Send + Sync`, shared by every connection
//! - **Type-erased**: works with `serde_json::Value` so handlers of any
//!   parameter type fit in one registry
//!
//! # Request Context
//!
//! The context is passed explicitly to every call. It carries the method
//! name, the request id, the [`Connection`] the request arrived on (so a
//! handler can push notifications to its caller), and a cancellation token
//! that fires when the connection closes or a timeout expires.
//!
//! # Creating Handlers
//!
//! 1. **from_fn**: wrap an async closure over raw JSON values
//! 2. **from_typed_fn**: wrap an async closure with typed parameters and result
//!
//! # Examples
//!
//! ```rust
//! use jripc_server::{from_fn, from_typed_fn};
//! use serde::Deserialize;
//!
//! // Raw JSON handler
//! let echo = from_fn(|_ctx, params| async move {
//!     Ok(params.unwrap_or(serde_json::Value::Null))
//! });
//!
//! // Typed handler
//! #[derive(Deserialize, Default)]
//! struct AddParams { a: i64, b: i64 }
//!
//! let add = from_typed_fn(|_ctx, p: AddParams| async move {
//!     Ok(p.a + p.b)
//! });
//! ```

use crate::connection::Connection;
use jripc_core::{Error, Id, JsonRpcErrorData, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The future returned by a handler
pub type HandlerResult = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Application logic for one JSON-RPC method
pub trait Handler: Send + Sync {
    /// Handle one call.
    ///
    /// `params` is `None` when the request had no `params` member or it
    /// was `null`.
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult;
}

/// Call-scoped metadata handed to every handler and middleware
#[derive(Clone)]
pub struct RequestContext {
    method: String,
    request_id: Id,
    connection: Arc<Connection>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(
        method: impl Into<String>,
        request_id: Id,
        connection: Arc<Connection>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            method: method.into(),
            request_id,
            connection,
            cancel,
        }
    }

    /// Name of the method being called
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Id of the request being answered
    pub fn request_id(&self) -> &Id {
        &self.request_id
    }

    /// The connection the request arrived on
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Token cancelled when the call should stop: the connection closed or
    /// a timeout expired. Long-running handlers should watch it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Replace the cancellation token, keeping the rest of the context.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Send a notification to the caller.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.connection.notify(method, params).await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("request_id", &self.request_id)
            .field("connection", &self.connection.id())
            .finish()
    }
}

/// Handler backed by an async closure
pub struct AsyncHandler<F> {
    func: F,
}

impl<F, Fut> AsyncHandler<F>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F, Fut> Handler for AsyncHandler<F>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult {
        Box::pin((self.func)(ctx, params))
    }
}

/// Create a handler from an async closure over raw JSON
pub fn from_fn<F, Fut>(func: F) -> Box<dyn Handler>
where
    F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Box::new(AsyncHandler::new(func))
}

/// Create a handler with typed parameters and result
///
/// Params are decoded into `P` before `func` runs. A decode failure is
/// answered with Invalid params (`-32602`) whose `data` describes the
/// problem, and `func` is not called. Absent or `null` params produce
/// `P::default()`.
///
/// # Examples
///
/// ```rust
/// use jripc_server::from_typed_fn;
/// use jripc_core::{Error, JsonRpcErrorData};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Deserialize, Default)]
/// struct UppercaseParams { text: String }
///
/// #[derive(Serialize)]
/// struct UppercaseResult { result: String }
///
/// let handler = from_typed_fn(|_ctx, p: UppercaseParams| async move {
///     if p.text.is_empty() {
///         return Err(Error::JsonRpc(JsonRpcErrorData::invalid_params().detail("text is required")));
///     }
///     Ok(UppercaseResult { result: p.text.to_uppercase() })
/// });
/// ```
pub fn from_typed_fn<P, R, F, Fut>(func: F) -> Box<dyn Handler>
where
    P: serde::de::DeserializeOwned + Default + Send + 'static,
    R: serde::Serialize + Send + 'static,
    F: Fn(RequestContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let func = Arc::new(func);

    from_fn(move |ctx: RequestContext, params: Option<Value>| {
        let func = Arc::clone(&func);
        async move {
            let params: P = decode_params(params)?;
            let result = func(ctx, params).await?;
            serde_json::to_value(result).map_err(|e| Error::Serialization(e.to_string()))
        }
    })
}

fn decode_params<P>(params: Option<Value>) -> Result<P>
where
    P: serde::de::DeserializeOwned + Default,
{
    match params {
        None | Some(Value::Null) => Ok(P::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| {
            Error::JsonRpc(
                JsonRpcErrorData::invalid_params()
                    .detail(format!("failed to parse parameters: {}", e)),
            )
        }),
    }
}
