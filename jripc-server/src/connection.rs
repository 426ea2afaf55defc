//! Connection engine for one IPC client
//!
//! A [`Connection`] owns one byte stream and serves it until it ends. The
//! server spawns one task per accepted stream that runs [`Connection::serve`].
//!
//! # Lifecycle
//!
//! 1. **Open**: the read loop decodes one line at a time and answers it
//! 2. **Closing**: [`Connection::close`] was called, the peer hung up, or the
//!    cancellation token fired; the loop stops reading
//! 3. **Closed**: the token is cancelled, the notifier refuses new sends and
//!    the write half is shut down, exactly once
//!
//! Every write races the cancellation token, so a peer that stops reading
//! cannot hold a response, a notification or [`Connection::close`] hostage.
//!
//! # Line Handling
//!
//! | incoming line | reply |
//! |---|---|
//! | invalid JSON | `-32700`, `id: null`, data = parser message |
//! | JSON that is not one request object | `-32600`, `id: null` |
//! | request for an unknown method | `-32601`, data = `{"method": ...}` |
//! | request | handler result or its error |
//! | notification | nothing |
//! | anything else | `-32600`, data = "message must have method field" |
//!
//! None of these end the connection. Only a closed or broken stream does,
//! or a failure to write a reply.
//!
//! # Ordering
//!
//! Requests on one connection are handled one at a time, in arrival order,
//! so responses go out in request order. Notifications pushed by handlers or
//! broadcasts share the write path and may land between responses.

use crate::handler::RequestContext;
use crate::metrics::ServerMetrics;
use crate::middleware::MiddlewareChain;
use crate::notification::Notifier;
use crate::registry::HandlerRegistry;
use jripc_core::{
    codec, Error, Id, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, LineCodec, Result,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Upper bound on shutting down the write half during close
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Callback for errors that do not reach the peer (write failures, broken streams)
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

/// Optional wiring for a [`Connection`]
#[derive(Clone, Default)]
pub struct ConnectionOptions {
    /// Peer description used in logs
    pub remote_addr: String,
    /// Parent scope; cancelling it closes the connection
    pub cancel: CancellationToken,
    pub on_error: Option<ErrorHook>,
    pub metrics: Option<Arc<ServerMetrics>>,
}

/// Server side of one client stream
pub struct Connection {
    id: u64,
    remote_addr: String,
    codec: Arc<LineCodec>,
    registry: HandlerRegistry,
    middleware: MiddlewareChain,
    notifier: Notifier,
    cancel: CancellationToken,
    closed: AtomicBool,
    on_error: Option<ErrorHook>,
    metrics: Option<Arc<ServerMetrics>>,
}

impl Connection {
    /// Wrap `stream` with default options.
    pub fn new<S>(stream: S, registry: HandlerRegistry, middleware: MiddlewareChain) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_options(stream, registry, middleware, ConnectionOptions::default())
    }

    pub fn with_options<S>(
        stream: S,
        registry: HandlerRegistry,
        middleware: MiddlewareChain,
        options: ConnectionOptions,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = Arc::new(LineCodec::new(stream));
        // A child token: the owner's cancel reaches us, our close does not reach the owner
        let cancel = options.cancel.child_token();
        Arc::new(Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            remote_addr: options.remote_addr,
            notifier: Notifier::new(Arc::clone(&codec), cancel.clone()),
            codec,
            registry,
            middleware,
            cancel,
            closed: AtomicBool::new(false),
            on_error: options.on_error,
            metrics: options.metrics,
        })
    }

    /// Process-unique connection id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote_addr
    }

    /// Token cancelled when the connection closes
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Serve the stream until it ends or the connection is cancelled, then close.
    #[tracing::instrument(skip(self), fields(conn_id = self.id, remote = %self.remote_addr))]
    pub async fn serve(self: Arc<Self>) {
        tracing::debug!("Serving connection");

        loop {
            let line = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("Connection cancelled");
                    break;
                }
                line = self.codec.read_message() => line,
            };

            match line {
                Ok(bytes) => {
                    if self.handle_line(&bytes).await.is_err() {
                        break;
                    }
                }
                Err(Error::ConnectionClosed) => {
                    tracing::debug!("Connection closed by peer");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Read failed");
                    self.report_error(&e);
                    break;
                }
            }
        }

        self.close().await;
    }

    /// Answer one line. An error means the reply could not be written.
    async fn handle_line(self: &Arc<Self>, line: &[u8]) -> Result<()> {
        let message = match codec::decode(line) {
            Ok(message) => message,
            Err(Error::Parse(detail)) => {
                tracing::debug!(error = %detail, "Malformed line");
                return self
                    .send_error(JsonRpcErrorData::parse_error().detail(detail), Id::Null)
                    .await;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Invalid message");
                return self.send_error(e.into_rpc_error(), Id::Null).await;
            }
        };

        if message.is_request() {
            let id = message.response_id();
            match message.into_request() {
                Ok(request) => self.dispatch(request).await,
                Err(e) => self.send_error(e.into_rpc_error(), id).await,
            }
        } else if message.is_notification() {
            tracing::trace!(method = ?message.method, "Ignoring client notification");
            Ok(())
        } else {
            let id = message.response_id();
            self.send_error(
                JsonRpcErrorData::invalid_request().detail("message must have method field"),
                id,
            )
            .await
        }
    }

    async fn dispatch(self: &Arc<Self>, request: JsonRpcRequest) -> Result<()> {
        let JsonRpcRequest {
            method, params, id, ..
        } = request;

        let Some(handler) = self.registry.get(&method) else {
            tracing::debug!(method = %method, "Method not found");
            return self
                .send_error(JsonRpcErrorData::method_not_found(method.as_str()), id)
                .await;
        };

        tracing::trace!(method = %method, id = %id, "Dispatching request");

        let handler = self.middleware.apply(handler);
        let ctx = RequestContext::new(method, id.clone(), Arc::clone(self), self.cancel.child_token());

        let response = match handler.handle(ctx, params).await {
            Ok(result) => JsonRpcResponse::success(result, id),
            Err(e) => JsonRpcResponse::error(e.into_rpc_error(), id),
        };
        self.send(&response).await
    }

    async fn send_error(&self, error: JsonRpcErrorData, id: Id) -> Result<()> {
        self.send(&JsonRpcResponse::error(error, id)).await
    }

    async fn send(&self, response: &JsonRpcResponse) -> Result<()> {
        let written = tokio::select! {
            biased;
            result = self.codec.write_json(response) => result,
            _ = self.cancel.cancelled() => {
                tracing::debug!(conn_id = self.id, "Response write abandoned on cancel");
                return Err(Error::ConnectionClosed);
            }
        };
        written.map_err(|e| {
            tracing::warn!(conn_id = self.id, error = %e, "Failed to write response");
            self.report_error(&e);
            e
        })
    }

    /// Push a notification to this client.
    ///
    /// Safe to call from any number of tasks at once. Fails with
    /// `NotifierClosed` once the connection is closed.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.notifier.send(method, params).await?;
        if let Some(metrics) = &self.metrics {
            metrics.record_notification(method);
        }
        Ok(())
    }

    /// Close the connection. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        // Cancelling first makes in-flight writes release the write lock
        self.cancel.cancel();
        self.notifier.close();
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.codec.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(conn_id = self.id, error = %e, "Stream shutdown failed"),
            Err(_) => tracing::warn!(conn_id = self.id, "Stream shutdown timed out"),
        }
        tracing::debug!(conn_id = self.id, "Connection closed");
    }

    fn report_error(&self, err: &Error) {
        if let Some(metrics) = &self.metrics {
            metrics.record_error(error_kind(err));
        }
        if let Some(hook) = &self.on_error {
            hook(err);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote_addr", &self.remote_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Io(_) | Error::ConnectionClosed => "io",
        Error::Serialization(_) => "serialization",
        Error::NotifierClosed => "closed",
        _ => "other",
    }
}
