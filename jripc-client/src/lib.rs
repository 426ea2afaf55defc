//! JSON-RPC 2.0 client over local IPC
//!
//! A thin client for servers built with `jripc-server`: it connects to a
//! Unix socket (or named pipe), sends requests and notifications as
//! newline-delimited JSON, and routes server notifications to callbacks.
//!
//! # Core Features
//!
//! - **Request-Response**: typed params and results, matched by id
//! - **Timeouts**: per-call deadline with `request_with_timeout`
//! - **Notifications**: callbacks per method for server pushes
//!
//! The client does not reconnect. When the server hangs up, pending and
//! later requests fail with `Error::ConnectionClosed`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jripc_client::JripcClient;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JripcClient::connect("calculator").await?;
//!
//!     client.on_notification("progress", |notif| async move {
//!         tracing::info!(params = ?notif.params, "Progress");
//!     }).await;
//!
//!     let sum: i64 = client.request("add", json!({"a": 5, "b": 3})).await?;
//!     assert_eq!(sum, 8);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod notification;
mod request;

pub use client::JripcClient;
pub use notification::{NotificationFn, NotificationHandler};
pub use request::RequestManager;
