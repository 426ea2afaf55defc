//! Core JSON-RPC 2.0 types, line codec and IPC transport for jripc
//!
//! This crate provides the foundation shared by the jripc server and client:
//!
//! - **Types**: JSON-RPC 2.0 messages and the classification union used on
//!   every incoming line
//! - **Error handling**: the application error type and the wire-format
//!   error object with the standard codes
//! - **Codec**: newline-delimited framing over any async byte stream, and
//!   JSON encoding/decoding of messages
//! - **Transport**: Unix domain sockets, or named pipes on Windows
//! - **Observability**: `tracing` subscriber and OpenTelemetry bootstrap
//!
//! # Wire Format
//!
//! Each message is exactly one JSON object followed by `\n`. Batches (JSON
//! arrays) are not supported.
//!
//! ```text
//! --> {"jsonrpc":"2.0","method":"add","params":{"a":5,"b":3},"id":1}
//! <-- {"jsonrpc":"2.0","result":8,"id":1}
//! <-- {"jsonrpc":"2.0","method":"progress","params":{"current":1}}
//! ```
//!
//! # Example
//!
//! ```rust
//! use jripc_core::{JsonRpcRequest, Id, codec};
//!
//! let request = JsonRpcRequest::new("add", Some(serde_json::json!({"a": 5, "b": 3})), Id::from(1));
//! let json = codec::encode_request(&request).unwrap();
//!
//! let decoded = codec::decode(json.as_bytes()).unwrap();
//! assert!(decoded.is_request());
//! assert_eq!(decoded.into_request().unwrap().method, "add");
//! ```

pub mod codec;
pub mod error;
pub mod observability;
pub mod transport;
pub mod types;

pub use codec::LineCodec;
pub use error::{Error, JsonRpcErrorData, Result};
pub use observability::{init_observability, shutdown_observability, ObservabilityConfig};
pub use transport::{cleanup_socket, dial, listen, socket_path, IpcListener};
pub use types::{Id, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
