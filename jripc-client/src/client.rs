//! IPC JSON-RPC client
//!
//! The client owns one stream to the server. Writes happen on the caller's
//! task under the codec's write lock; a background reader task routes every
//! incoming line:
//!
//! - **Responses** complete the pending request with the same id
//! - **Notifications** run the callback registered for their method
//! - **End of stream** fails every pending request with `ConnectionClosed`
//!
//! Notification callbacks run on the reader task, one at a time and in
//! arrival order. A callback that awaits a request on the same client would
//! stall the reader; spawn such work instead.

use crate::notification::NotificationHandler;
use crate::request::RequestManager;
use jripc_core::{
    codec, Error, JsonRpcNotification, JsonRpcRequest, LineCodec, Result,
};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::AbortHandle;

/// JSON-RPC 2.0 client over a Unix socket or named pipe
pub struct JripcClient {
    codec: Arc<LineCodec>,
    request_manager: RequestManager,
    notification_handler: NotificationHandler,
    closed: Arc<AtomicBool>,
    reader: AbortHandle,
}

impl JripcClient {
    /// Connect to the server listening at `path`.
    ///
    /// Bare names are normalized the same way the server normalizes them.
    #[tracing::instrument(skip(path), fields(path = %path))]
    pub async fn connect(path: &str) -> Result<Self> {
        let stream = jripc_core::dial(path).await?;
        tracing::debug!("Connected");
        Ok(Self::from_stream(stream))
    }

    /// Speak JSON-RPC over an already connected stream.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let codec = Arc::new(LineCodec::new(stream));
        let request_manager = RequestManager::new();
        let notification_handler = NotificationHandler::new();
        let closed = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(Self::receive_loop(
            Arc::clone(&codec),
            request_manager.clone(),
            notification_handler.clone(),
            Arc::clone(&closed),
        ))
        .abort_handle();

        Self {
            codec,
            request_manager,
            notification_handler,
            closed,
            reader,
        }
    }

    /// Call `method` and decode its result into `R`.
    ///
    /// `params` that serialize to `null` are omitted from the request. A
    /// server error comes back as `Error::JsonRpc` with the server's code,
    /// message and data.
    #[tracing::instrument(skip(self, params))]
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let result = self.call(method, to_params(params)?, None).await?;
        serde_json::from_value(result).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Like [`request`](Self::request), failing with `Error::Timeout` when
    /// no response arrives within `timeout`.
    #[tracing::instrument(skip(self, params))]
    pub async fn request_with_timeout<P, R>(
        &self,
        method: &str,
        params: P,
        timeout: Duration,
    ) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let result = self.call(method, to_params(params)?, Some(timeout)).await?;
        serde_json::from_value(result).map_err(|e| Error::Serialization(e.to_string()))
    }

    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let id = self.request_manager.next_id();
        let request = JsonRpcRequest::new(method, params, id.clone());

        // Register before writing so a fast response cannot be missed
        let rx = self.request_manager.register(id.clone()).await;
        // The reader marks the client closed before failing pending calls
        if self.is_closed() {
            self.request_manager.cancel(&id).await;
            return Err(Error::ConnectionClosed);
        }
        if let Err(e) = self.codec.write_json(&request).await {
            self.request_manager.cancel(&id).await;
            return Err(e);
        }
        tracing::trace!(id = %id, "Request sent");

        let response = match timeout {
            None => rx.await,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.request_manager.cancel(&id).await;
                    tracing::debug!(id = %id, "Request timed out");
                    return Err(Error::Timeout);
                }
            },
        }
        .map_err(|_| Error::ConnectionClosed)??;

        response.into_result()
    }

    /// Send a notification; the server sends nothing back.
    pub async fn notify<P>(&self, method: &str, params: P) -> Result<()>
    where
        P: serde::Serialize,
    {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let notification = JsonRpcNotification::new(method, to_params(params)?);
        self.codec.write_json(&notification).await
    }

    /// Register a callback for server notifications named `method`.
    pub async fn on_notification<F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(JsonRpcNotification) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.notification_handler.register(method, handler).await;
    }

    pub fn notification_handler(&self) -> &NotificationHandler {
        &self.notification_handler
    }

    /// Close the connection and fail pending requests. Later calls do nothing.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.reader.abort();
        self.request_manager.fail_all(Error::ConnectionClosed).await;
        let result = self.codec.shutdown().await;
        tracing::debug!("Client closed");
        result
    }

    /// Whether the client was closed or the server hung up
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn receive_loop(
        codec: Arc<LineCodec>,
        request_manager: RequestManager,
        notification_handler: NotificationHandler,
        closed: Arc<AtomicBool>,
    ) {
        loop {
            match codec.read_message().await {
                Ok(line) => {
                    Self::handle_line(&line, &request_manager, &notification_handler).await;
                }
                Err(Error::ConnectionClosed) => {
                    tracing::debug!("Connection closed by server");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Read failed");
                    break;
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        request_manager.fail_all(Error::ConnectionClosed).await;
    }

    async fn handle_line(
        line: &[u8],
        request_manager: &RequestManager,
        notification_handler: &NotificationHandler,
    ) {
        let message = match codec::decode(line) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring undecodable line from server");
                return;
            }
        };

        if message.is_response() {
            match message.into_response() {
                Ok(response) => {
                    let id = response.id.clone();
                    if !request_manager.complete(response).await {
                        tracing::debug!(id = %id, "Response for unknown request");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Malformed response"),
            }
        } else if message.is_notification() {
            match message.into_notification() {
                Ok(notification) => {
                    tracing::trace!(method = %notification.method, "Notification received");
                    notification_handler.handle(notification).await;
                }
                Err(e) => tracing::warn!(error = %e, "Malformed notification"),
            }
        } else if let Some(error) = message.error {
            // Errors the server could not tie to a request, such as parse errors
            tracing::warn!(code = error.code, message = %error.message, "Server reported an error");
        } else {
            tracing::warn!("Ignoring unexpected message from server");
        }
    }
}

impl Drop for JripcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn to_params<P: serde::Serialize>(params: P) -> Result<Option<Value>> {
    match serde_json::to_value(params).map_err(|e| Error::Serialization(e.to_string()))? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
