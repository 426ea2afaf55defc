//! JRIPC - JSON-RPC 2.0 over local IPC
//!
//! This is the convenience crate that re-exports the JRIPC sub-crates.
//! Use it if you want a single dependency that provides both client and
//! server functionality.
//!
//! # Architecture
//!
//! JRIPC is organized into modular crates:
//!
//! - **jripc-core**: Message types, line codec, IPC transport, error handling, observability
//! - **jripc-server**: Socket server with handler registry, middleware and broadcast
//! - **jripc-client**: Client with typed requests, timeouts and notification callbacks
//!
//! Messages are newline-delimited JSON over a Unix domain socket, or a
//! named pipe on Windows. A bare name such as `"calculator"` becomes
//! `/tmp/calculator.sock` (or `\\.\pipe\calculator`).
//!
//! # Quick Start - Server
//!
//! ```rust,no_run
//! use jripc::JripcServer;
//! use jripc::server::{from_typed_fn, RecoveryMiddleware};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize, Default)]
//! struct AddParams { a: i64, b: i64 }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = JripcServer::builder()
//!         .bind("calculator")
//!         .use_middleware(RecoveryMiddleware)
//!         .handler("add", from_typed_fn(|_ctx, p: AddParams| async move {
//!             Ok(p.a + p.b)
//!         }))
//!         .build()
//!         .await?;
//!
//!     server.run_until(async { let _ = tokio::signal::ctrl_c().await; },
//!                      std::time::Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Client
//!
//! ```rust,no_run
//! use jripc::JripcClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = JripcClient::connect("calculator").await?;
//!
//!     let sum: i64 = client.request("add", serde_json::json!({"a": 5, "b": 3})).await?;
//!     println!("Result: {}", sum);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

// Sub-crates under short names: `jripc::server::...`
pub use jripc_client as client;
pub use jripc_core as core;
pub use jripc_server as server;

// The types almost every program touches
pub use jripc_client::JripcClient;
pub use jripc_core::{Error, Id, Result};
pub use jripc_server::JripcServer;
