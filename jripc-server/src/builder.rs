//! Server builder for constructing IPC JSON-RPC servers
//!
//! The builder collects everything a [`JripcServer`] needs before the
//! listener is bound:
//! - the socket path (or pipe name)
//! - method handlers
//! - middleware, in wrapping order
//! - connection lifecycle and error hooks
//! - observability
//!
//! # Examples
//!
//! ```rust,no_run
//! use jripc_server::{JripcServer, from_fn, RecoveryMiddleware, LoggingMiddleware};
//!
//! # async fn example() -> jripc_core::Result<()> {
//! let server = JripcServer::builder()
//!     .bind("/tmp/myapp.sock")
//!     .handler("ping", from_fn(|_ctx, _params| async {
//!         Ok(serde_json::json!({"pong": true}))
//!     }))
//!     .use_middleware(RecoveryMiddleware)
//!     .use_middleware(LoggingMiddleware::new())
//!     .on_connect(|conn| tracing::info!(conn_id = conn.id(), "Client connected"))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use crate::connection::Connection;
use crate::handler::Handler;
use crate::metrics::ServerMetrics;
use crate::middleware::{MetricsMiddleware, Middleware, MiddlewareChain};
use crate::registry::HandlerRegistry;
use crate::{JripcServer, ServerHooks};
use jripc_core::{Error, ObservabilityConfig, Result};
use std::sync::Arc;

/// Builder for constructing a [`JripcServer`]
#[derive(Default)]
pub struct ServerBuilder {
    path: Option<String>,
    registry: HandlerRegistry,
    middleware: MiddlewareChain,
    hooks: ServerHooks,
    observability_config: Option<ObservabilityConfig>,
    service_name: Option<String>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the socket path or pipe name.
    ///
    /// Bare names are normalized by [`jripc_core::socket_path`].
    pub fn bind(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Register a handler for a method
    pub fn handler(self, method: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        self.registry.register(method, handler);
        self
    }

    /// Use an existing registry (replaces any previously registered handlers)
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Append a middleware. The first one added is the outermost.
    pub fn use_middleware<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn use_middleware_arc(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.add(middleware);
        self
    }

    /// Called with each connection after it is accepted, before it is served
    pub fn on_connect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.hooks.on_connect = Some(Arc::new(hook));
        self
    }

    /// Called with each connection after it stopped being served
    pub fn on_disconnect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Arc<Connection>) + Send + Sync + 'static,
    {
        self.hooks.on_disconnect = Some(Arc::new(hook));
        self
    }

    /// Called for accept failures and failed writes to clients
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.hooks.on_error = Some(Arc::new(hook));
        self
    }

    /// Install logging and OpenTelemetry export while building.
    ///
    /// Also records [`ServerMetrics`] for every request.
    pub fn with_observability(mut self, config: ObservabilityConfig) -> Self {
        self.observability_config = Some(config);
        self
    }

    pub fn with_default_observability(mut self) -> Self {
        self.observability_config = Some(ObservabilityConfig::default());
        self
    }

    /// Override the service name of the observability configuration
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Record metrics into `metrics` without installing observability.
    pub fn metrics(mut self, metrics: Arc<ServerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Bind the listener and assemble the server.
    pub async fn build(self) -> Result<JripcServer> {
        let path = self
            .path
            .ok_or_else(|| Error::InvalidRequest("No socket path specified".to_string()))?;

        let mut metrics = self.metrics;
        if let Some(mut config) = self.observability_config {
            if let Some(name) = self.service_name {
                config.service_name = name;
            }
            let service_name = config.service_name.clone();

            jripc_core::init_observability(config).map_err(|e| {
                Error::Internal(format!("Failed to initialize observability: {}", e))
            })?;

            if metrics.is_none() {
                metrics = Some(Arc::new(ServerMetrics::new(service_name)));
            }
        }

        let mut middleware = self.middleware;
        if let Some(metrics) = &metrics {
            middleware.prepend(Arc::new(MetricsMiddleware::new(Arc::clone(metrics))));
        }

        let listener = jripc_core::listen(&path).await?;
        tracing::info!(path = %listener.path(), "Server listening");

        Ok(JripcServer::new(
            listener,
            self.registry,
            middleware,
            self.hooks,
            metrics,
        ))
    }
}
