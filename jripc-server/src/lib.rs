//! JSON-RPC 2.0 server over local IPC
//!
//! This crate serves JSON-RPC 2.0 over Unix domain sockets (or named pipes
//! on Windows), one newline-delimited JSON object per message.
//!
//! # Core Features
//!
//! - **IPC Transport**: Unix sockets and named pipes behind one API
//! - **Method Registry**: register handlers by name, at startup or at runtime
//! - **Middleware**: decorators around every call, with logging, panic
//!   recovery, timeouts and metrics built in
//! - **Notifications**: handlers can push notifications to their caller, and
//!   the server can broadcast to every client
//! - **Graceful Shutdown**: stop accepting, drain, then force-close after a deadline
//! - **Observability**: `tracing` logs and optional OpenTelemetry export
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jripc_server::{JripcServer, from_typed_fn, RecoveryMiddleware};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Default)]
//! struct AddParams { a: i64, b: i64 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = JripcServer::builder()
//!         .bind("calculator")
//!         .handler("add", from_typed_fn(|_ctx, p: AddParams| async move {
//!             Ok(p.a + p.b)
//!         }))
//!         .use_middleware(RecoveryMiddleware)
//!         .build()
//!         .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Accept task**: the future returned by [`JripcServer::run`]
//! - **Connection tasks**: one per client, running [`Connection::serve`],
//!   tracked so [`JripcServer::stop`] can wait for them
//! - **Handler calls**: awaited in the connection task, one request at a
//!   time per connection; connections run in parallel

mod builder;
mod connection;
mod handler;
mod metrics;
mod middleware;
mod notification;
mod registry;

pub use builder::ServerBuilder;
pub use connection::{Connection, ConnectionOptions, ErrorHook};
pub use handler::{from_fn, from_typed_fn, AsyncHandler, Handler, HandlerResult, RequestContext};
pub use metrics::ServerMetrics;
pub use middleware::{
    middleware_fn, FnMiddleware, Logger, LoggingMiddleware, MetricsMiddleware, Middleware,
    MiddlewareChain, RecoveryMiddleware, TimeoutMiddleware,
};
pub use notification::{BroadcastManager, Notifier, DEFAULT_BROADCAST_TIMEOUT};
pub use registry::HandlerRegistry;

use futures::FutureExt;
use jripc_core::{Error, IpcListener, Result};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// How long [`JripcServer::stop`] waits for force-closed connections to unwind
const FORCE_CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Callback receiving a connection at a lifecycle point
pub type ConnectionHook = Arc<dyn Fn(&Arc<Connection>) + Send + Sync>;

/// Lifecycle and error callbacks of a server
#[derive(Clone, Default)]
pub struct ServerHooks {
    pub on_connect: Option<ConnectionHook>,
    pub on_disconnect: Option<ConnectionHook>,
    pub on_error: Option<ErrorHook>,
}

impl ServerHooks {
    /// Pass `err` to the error hook, or log it when none is set.
    pub fn report_error(&self, err: &Error) {
        match &self.on_error {
            Some(hook) => hook(err),
            None => tracing::error!(error = %err, "Server error"),
        }
    }
}

/// JSON-RPC 2.0 server over a Unix socket or named pipe
///
/// # Lifecycle
///
/// 1. **Build**: [`JripcServer::builder`] binds the listener
/// 2. **Run**: [`run`](Self::run) accepts clients until stopped
/// 3. **Stop**: [`stop`](Self::stop) stops accepting, waits for clients to
///    leave until the deadline, then closes the rest and removes the socket
///
/// `run` and `stop` take `&self`, so the usual shape is an `Arc<JripcServer>`
/// shared between the accept task and whoever triggers shutdown.
pub struct JripcServer {
    socket_path: String,
    listener: Mutex<Option<IpcListener>>,
    registry: HandlerRegistry,
    middleware: RwLock<MiddlewareChain>,
    broadcast: BroadcastManager,
    hooks: ServerHooks,
    metrics: Option<Arc<ServerMetrics>>,
    shutdown: CancellationToken,
    connections_cancel: CancellationToken,
    tracker: TaskTracker,
    stopped: AtomicBool,
}

impl JripcServer {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub(crate) fn new(
        listener: IpcListener,
        registry: HandlerRegistry,
        middleware: MiddlewareChain,
        hooks: ServerHooks,
        metrics: Option<Arc<ServerMetrics>>,
    ) -> Self {
        Self {
            socket_path: listener.path().to_string(),
            listener: Mutex::new(Some(listener)),
            registry,
            middleware: RwLock::new(middleware),
            broadcast: BroadcastManager::new(),
            hooks,
            metrics,
            shutdown: CancellationToken::new(),
            connections_cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Accept clients until [`stop`](Self::stop) is called.
    ///
    /// Each client is served on its own task. Accept failures go to the
    /// error hook and accepting resumes after a short pause. Fails if the
    /// server is already running or was stopped.
    #[tracing::instrument(skip(self), name = "server.run", fields(path = %self.socket_path))]
    pub async fn run(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::Internal("server is already running or stopped".to_string()))?;

        tracing::info!("Starting jripc server");

        loop {
            let accepted = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.spawn_connection(stream, peer),
                Err(e) => {
                    if self.shutdown.is_cancelled() {
                        break;
                    }
                    tracing::warn!(error = %e, "Accept failed");
                    self.hooks.report_error(&e);
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }

        if let Err(e) = listener.close() {
            tracing::warn!(error = %e, "Failed to close listener");
        }
        tracing::info!("Stopped accepting connections");
        Ok(())
    }

    fn spawn_connection<S>(&self, stream: S, peer: String)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + 'static,
    {
        let conn = Connection::with_options(
            stream,
            self.registry.clone(),
            self.middleware_snapshot(),
            ConnectionOptions {
                remote_addr: peer,
                cancel: self.connections_cancel.clone(),
                on_error: self.hooks.on_error.clone(),
                metrics: self.metrics.clone(),
            },
        );

        tracing::info!(conn_id = conn.id(), peer = %conn.remote_addr(), "Connection accepted");

        self.broadcast.add(Arc::clone(&conn));
        if let Some(metrics) = &self.metrics {
            metrics.record_connection();
        }

        let broadcast = self.broadcast.clone();
        let hooks = self.hooks.clone();
        let metrics = self.metrics.clone();

        self.tracker.spawn(async move {
            if let Some(hook) = &hooks.on_connect {
                hook(&conn);
            }

            // Without RecoveryMiddleware a handler panic unwinds through serve
            if AssertUnwindSafe(Arc::clone(&conn).serve())
                .catch_unwind()
                .await
                .is_err()
            {
                tracing::error!(conn_id = conn.id(), "Connection task panicked");
                conn.close().await;
            }

            broadcast.remove(conn.id());
            if let Some(metrics) = &metrics {
                metrics.record_disconnection();
            }
            if let Some(hook) = &hooks.on_disconnect {
                hook(&conn);
            }
            tracing::info!(conn_id = conn.id(), "Connection finished");
        });
    }

    /// Stop the server.
    ///
    /// Stops accepting, then waits up to `deadline` for connected clients to
    /// disconnect on their own. Connections still open after that are
    /// closed. Finally the broadcast set is cleared and the socket file
    /// removed. Calling it again does nothing.
    #[tracing::instrument(skip(self), name = "server.stop", fields(path = %self.socket_path))]
    pub async fn stop(&self, deadline: Duration) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        tracing::info!(connections = self.connection_count(), "Stopping server");
        self.shutdown.cancel();

        // Never ran: the listener is still parked here
        let parked = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = parked {
            if let Err(e) = listener.close() {
                tracing::warn!(error = %e, "Failed to close listener");
            }
        }

        self.tracker.close();
        if tokio::time::timeout(deadline, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.tracker.len(),
                "Shutdown deadline passed, closing remaining connections"
            );
            self.connections_cancel.cancel();
            if tokio::time::timeout(FORCE_CLOSE_GRACE, self.tracker.wait())
                .await
                .is_err()
            {
                tracing::warn!(remaining = self.tracker.len(), "Connections still unwinding");
            }
        }

        self.broadcast.clear();
        jripc_core::cleanup_socket(&self.socket_path)?;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Run until `signal` completes, then stop with `deadline`.
    pub async fn run_until<F>(&self, signal: F, deadline: Duration) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result?,
            _ = signal => {}
        }
        self.stop(deadline).await
    }

    /// Send a notification to every connected client.
    ///
    /// Returns how many clients it was delivered to.
    pub async fn broadcast(&self, method: &str, params: Option<Value>) -> usize {
        let delivered = self.broadcast.broadcast(method, params).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_broadcast(method, delivered);
        }
        delivered
    }

    /// The live connection set
    pub fn broadcast_manager(&self) -> &BroadcastManager {
        &self.broadcast
    }

    pub fn connection_count(&self) -> usize {
        self.broadcast.count()
    }

    /// Registered method names, in no particular order
    pub fn methods(&self) -> Vec<String> {
        self.registry.methods()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Register a handler. Live connections see it immediately.
    pub fn register_handler(&self, method: impl Into<String>, handler: Box<dyn Handler>) {
        self.registry.register(method, handler);
    }

    pub fn register_fn<F, Fut>(&self, method: impl Into<String>, func: F)
    where
        F: Fn(RequestContext, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.registry.register_fn(method, func);
    }

    /// Append a middleware. Applies to connections accepted afterwards.
    pub fn register_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(middleware);
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn middleware_snapshot(&self) -> MiddlewareChain {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The normalized socket path or pipe name
    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    pub fn metrics(&self) -> Option<&Arc<ServerMetrics>> {
        self.metrics.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Token cancelled when [`stop`](Self::stop) begins
    ///
    /// Handlers doing long work outside a connection can watch it to wind
    /// down with the server.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
