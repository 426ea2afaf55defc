//! Middleware system for the request pipeline
//!
//! A middleware decorates a handler: it takes the next handler in the chain
//! and returns a new handler with the same contract. This makes every
//! cross-cutting concern an ordinary wrapper that can run code before the
//! call, after it, or instead of it.
//!
//! # Ordering
//!
//! [`MiddlewareChain::apply`] folds the list from last to first, so the
//! first middleware added is the outermost wrapper. For `[A, B]` around a
//! handler `H` the execution order is:
//!
//! ```text
//! A before → B before → H → B after → A after
//! ```
//!
//! # Built-in Middleware
//!
//! - **LoggingMiddleware**: logs method, duration and outcome of each call
//! - **RecoveryMiddleware**: turns a panic in anything downstream into an
//!   Internal error with `data = {"panic": ..., "method": ...}`
//! - **TimeoutMiddleware**: answers with an Internal error, data
//!   `"request timeout"`, when the downstream call exceeds a deadline
//! - **MetricsMiddleware**: records request count, status and duration
//!
//! Recovery is conventionally added first so it also covers panics raised
//! inside other middleware.
//!
//! # Examples
//!
//! ```rust
//! use jripc_server::{MiddlewareChain, LoggingMiddleware, RecoveryMiddleware, TimeoutMiddleware};
//! use std::time::Duration;
//!
//! let mut chain = MiddlewareChain::new();
//! chain.push(RecoveryMiddleware);
//! chain.push(LoggingMiddleware::new());
//! chain.push(TimeoutMiddleware::new(Duration::from_secs(5)));
//! assert_eq!(chain.len(), 3);
//! ```

use crate::handler::{Handler, HandlerResult, RequestContext};
use crate::metrics::ServerMetrics;
use futures::FutureExt;
use jripc_core::{Error, JsonRpcErrorData, Result};
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A decorator around a handler
pub trait Middleware: Send + Sync {
    /// Wrap `next`, returning the handler to call instead.
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler>;
}

/// Ordered list of middleware
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an already shared middleware. It becomes the innermost so far.
    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn push<M: Middleware + 'static>(&mut self, middleware: M) {
        self.add(Arc::new(middleware));
    }

    /// Insert a middleware as the outermost wrapper.
    pub fn prepend(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.insert(0, middleware);
    }

    /// Compose the chain around `handler`; the first middleware ends up outermost.
    pub fn apply(&self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.middlewares
            .iter()
            .rev()
            .fold(handler, |next, middleware| middleware.wrap(next))
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Middleware built from an async closure
///
/// The closure receives the context, the params and the next handler, and
/// decides whether and how to call it.
pub struct FnMiddleware<F> {
    func: Arc<F>,
}

struct FnMiddlewareHandler<F> {
    func: Arc<F>,
    next: Arc<dyn Handler>,
}

/// Create a middleware from an async closure
///
/// # Examples
///
/// ```rust
/// use jripc_server::{middleware_fn, MiddlewareChain};
///
/// let mut chain = MiddlewareChain::new();
/// chain.push(middleware_fn(|ctx, params, next| async move {
///     tracing::debug!(method = ctx.method(), "before");
///     let result = next.handle(ctx, params).await;
///     tracing::debug!("after");
///     result
/// }));
/// ```
pub fn middleware_fn<F, Fut>(func: F) -> FnMiddleware<F>
where
    F: Fn(RequestContext, Option<Value>, Arc<dyn Handler>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    FnMiddleware {
        func: Arc::new(func),
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(RequestContext, Option<Value>, Arc<dyn Handler>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(FnMiddlewareHandler {
            func: Arc::clone(&self.func),
            next,
        })
    }
}

impl<F, Fut> Handler for FnMiddlewareHandler<F>
where
    F: Fn(RequestContext, Option<Value>, Arc<dyn Handler>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult {
        Box::pin((self.func)(ctx, params, Arc::clone(&self.next)))
    }
}

/// Receives method, duration and error (if any) for each call
pub type Logger = Arc<dyn Fn(&str, Duration, Option<&Error>) + Send + Sync>;

/// Logs every call; never changes the outcome
///
/// Without a custom logger, calls are logged through `tracing`: successes
/// at `info`, failures at `warn`.
#[derive(Clone, Default)]
pub struct LoggingMiddleware {
    logger: Option<Logger>,
}

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send call records to `logger` instead of `tracing`.
    pub fn with_logger<F>(logger: F) -> Self
    where
        F: Fn(&str, Duration, Option<&Error>) + Send + Sync + 'static,
    {
        Self {
            logger: Some(Arc::new(logger)),
        }
    }
}

struct LoggingHandler {
    next: Arc<dyn Handler>,
    logger: Option<Logger>,
}

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(LoggingHandler {
            next,
            logger: self.logger.clone(),
        })
    }
}

impl Handler for LoggingHandler {
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult {
        let next = Arc::clone(&self.next);
        let logger = self.logger.clone();

        Box::pin(async move {
            let method = ctx.method().to_string();
            let id = ctx.request_id().clone();
            let start = Instant::now();

            let result = next.handle(ctx, params).await;
            let elapsed = start.elapsed();

            match (&logger, &result) {
                (Some(log), _) => log(&method, elapsed, result.as_ref().err()),
                (None, Ok(_)) => tracing::info!(
                    method = %method,
                    id = %id,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    "Request handled"
                ),
                (None, Err(e)) => tracing::warn!(
                    method = %method,
                    id = %id,
                    duration_ms = elapsed.as_secs_f64() * 1000.0,
                    error = %e,
                    "Request failed"
                ),
            }

            result
        })
    }
}

/// Converts panics downstream into Internal errors
///
/// The error `data` is `{"panic": <panic value>, "method": <method>}`.
/// String panics carry their message. Payloads raised with
/// [`std::panic::panic_any`] are kept as JSON when they are a
/// `serde_json::Value`, a jripc `Error`, a number or a bool. Any other
/// payload type is reported as `"non-string panic payload"`. Both a panic
/// while building the handler future and a panic while polling it are
/// caught.
#[derive(Clone, Copy, Debug, Default)]
pub struct RecoveryMiddleware;

struct RecoveryHandler {
    next: Arc<dyn Handler>,
}

impl Middleware for RecoveryMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(RecoveryHandler { next })
    }
}

impl Handler for RecoveryHandler {
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult {
        let next = Arc::clone(&self.next);

        Box::pin(async move {
            let method = ctx.method().to_string();

            let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| next.handle(ctx, params)))
            {
                Ok(fut) => fut,
                Err(payload) => return Err(panic_error(&method, payload)),
            };

            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(panic_error(&method, payload)),
            }
        })
    }
}

fn panic_error(method: &str, payload: Box<dyn Any + Send>) -> Error {
    let value = panic_value(payload.as_ref());
    tracing::error!(method = %method, panic = %value, "Handler panicked");
    Error::JsonRpc(
        JsonRpcErrorData::internal_error()
            .detail(serde_json::json!({ "panic": value, "method": method })),
    )
}

fn panic_value(payload: &(dyn Any + Send)) -> Value {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Value::from(*s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Value::from(s.as_str())
    } else if let Some(v) = payload.downcast_ref::<Value>() {
        v.clone()
    } else if let Some(e) = payload.downcast_ref::<Error>() {
        Value::from(e.to_string())
    } else if let Some(n) = payload.downcast_ref::<i32>() {
        Value::from(*n)
    } else if let Some(n) = payload.downcast_ref::<i64>() {
        Value::from(*n)
    } else if let Some(n) = payload.downcast_ref::<u64>() {
        Value::from(*n)
    } else if let Some(n) = payload.downcast_ref::<f64>() {
        Value::from(*n)
    } else if let Some(b) = payload.downcast_ref::<bool>() {
        Value::from(*b)
    } else {
        // `dyn Any` carries no type name at runtime
        Value::from("non-string panic payload")
    }
}

/// Bounds the time a call may take
///
/// The downstream call runs as its own task with a child cancellation
/// token. When the deadline passes first, the token is cancelled and the
/// caller gets an Internal error with data `"request timeout"`. The task
/// is not aborted: a handler that ignores its token keeps running and its
/// late result is dropped.
#[derive(Clone, Copy, Debug)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

struct TimeoutHandler {
    next: Arc<dyn Handler>,
    timeout: Duration,
}

impl Middleware for TimeoutMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(TimeoutHandler {
            next,
            timeout: self.timeout,
        })
    }
}

impl Handler for TimeoutHandler {
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult {
        let next = Arc::clone(&self.next);
        let timeout = self.timeout;

        Box::pin(async move {
            let method = ctx.method().to_string();
            let cancel = ctx.cancellation().child_token();
            let ctx = ctx.with_cancellation(cancel.clone());

            let task = tokio::spawn(async move { next.handle(ctx, params).await });

            match tokio::time::timeout(timeout, task).await {
                Ok(Ok(result)) => result,
                // Re-raise so an outer RecoveryMiddleware reports the panic
                Ok(Err(join_err)) if join_err.is_panic() => {
                    std::panic::resume_unwind(join_err.into_panic())
                }
                Ok(Err(join_err)) => Err(Error::Internal(join_err.to_string())),
                Err(_) => {
                    cancel.cancel();
                    tracing::warn!(
                        method = %method,
                        timeout_ms = timeout.as_millis() as u64,
                        "Request timed out"
                    );
                    Err(Error::JsonRpc(
                        JsonRpcErrorData::internal_error().detail("request timeout"),
                    ))
                }
            }
        })
    }
}

/// Records request metrics into [`ServerMetrics`]
///
/// Status is `"success"` or `"error"`; duration is in seconds.
#[derive(Clone)]
pub struct MetricsMiddleware {
    metrics: Arc<ServerMetrics>,
}

impl MetricsMiddleware {
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }
}

struct MetricsHandler {
    next: Arc<dyn Handler>,
    metrics: Arc<ServerMetrics>,
}

impl Middleware for MetricsMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(MetricsHandler {
            next,
            metrics: Arc::clone(&self.metrics),
        })
    }
}

impl Handler for MetricsHandler {
    fn handle(&self, ctx: RequestContext, params: Option<Value>) -> HandlerResult {
        let next = Arc::clone(&self.next);
        let metrics = Arc::clone(&self.metrics);

        Box::pin(async move {
            let method = ctx.method().to_string();
            let start = Instant::now();
            let result = next.handle(ctx, params).await;
            let status = if result.is_ok() { "success" } else { "error" };
            metrics.record_request(&method, status, start.elapsed().as_secs_f64());
            result
        })
    }
}
