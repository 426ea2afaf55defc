//! Error types for jripc
//!
//! This module provides error handling for JSON-RPC 2.0 over local IPC.
//! It defines two main error types:
//!
//! - **Error**: Application-level errors for internal use (uses thiserror)
//! - **JsonRpcErrorData**: Wire-format errors as carried in an error response
//!
//! # Error Codes
//!
//! JSON-RPC 2.0 reserves these codes:
//! - `-32700`: Parse error (invalid JSON)
//! - `-32600`: Invalid Request (valid JSON, not a valid request object)
//! - `-32601`: Method not found
//! - `-32602`: Invalid params
//! - `-32603`: Internal error
//! - `-32000 to -32099`: Server error (implementation-defined)
//!
//! Any other integer is an application-defined error code.
//!
//! # Converting Failures
//!
//! Handlers return `Result<Value>`. When a handler fails, the connection
//! converts the `Error` into wire format with [`Error::into_rpc_error`]: an
//! embedded `JsonRpcErrorData` passes through untouched, the protocol variants
//! map to their reserved codes, and everything else becomes an Internal error
//! whose `data` carries the error description.
//!
//! # Examples
//!
//! ```rust
//! use jripc_core::{Error, JsonRpcErrorData};
//!
//! let error = JsonRpcErrorData::method_not_found("unknownMethod");
//! assert_eq!(error.code, -32601);
//! assert_eq!(error.data, Some(serde_json::json!({"method": "unknownMethod"})));
//!
//! let rpc = Error::Internal("disk full".into()).into_rpc_error();
//! assert_eq!(rpc.code, -32603);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON sent is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;
/// The method does not exist or is not available.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;
/// Lowest code of the reserved server-error band.
pub const SERVER_ERROR_MIN: i32 = -32099;
/// Highest code of the reserved server-error band.
pub const SERVER_ERROR_MAX: i32 = -32000;

/// Result type for jripc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for jripc operations
///
/// # Error Categories
///
/// - **Protocol errors**: Parse, InvalidRequest, MethodNotFound, InvalidParams
/// - **Transport errors**: Io, ConnectionClosed, NotifierClosed
/// - **Processing errors**: Serialization, Internal, Timeout
///
/// `JsonRpc` holds an error that is already in wire format, either returned
/// deliberately by a handler or received from a remote peer.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// JSON-RPC protocol error (already in wire format)
    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcErrorData),

    /// A line could not be parsed as JSON
    ///
    /// Distinct from `Serialization` so the connection can answer with
    /// a `-32700` Parse error and keep serving.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization or deserialization error
    ///
    /// Occurs when converting between Rust types and JSON values.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Input/output error from the underlying socket or pipe
    #[error("IO error: {0}")]
    Io(String),

    /// Valid JSON that is not a valid JSON-RPC 2.0 message
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Method not found in the handler registry
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// The method exists but its parameters are unusable
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// Unexpected error during method execution
    #[error("Internal error: {0}")]
    Internal(String),

    /// Request operation timeout
    #[error("Request timeout")]
    Timeout,

    /// The stream reached end-of-file or was shut down
    #[error("Connection closed")]
    ConnectionClosed,

    /// A notification was sent after the notifier was closed
    #[error("notification manager is closed")]
    NotifierClosed,
}

impl Error {
    /// Convert into the wire-format error sent to the peer.
    ///
    /// An embedded `JsonRpcErrorData` is returned unchanged. `InvalidParams`,
    /// `InvalidRequest` and `MethodNotFound` keep their reserved codes.
    /// Everything else is normalized to an Internal error carrying the
    /// error description as `data`.
    pub fn into_rpc_error(self) -> JsonRpcErrorData {
        match self {
            Error::JsonRpc(data) => data,
            Error::Parse(detail) => JsonRpcErrorData::parse_error().detail(detail),
            Error::InvalidRequest(detail) => JsonRpcErrorData::invalid_request().detail(detail),
            Error::MethodNotFound(method) => JsonRpcErrorData::method_not_found(method),
            Error::InvalidParams(detail) => JsonRpcErrorData::invalid_params().detail(detail),
            other => JsonRpcErrorData::internal_error().detail(other.to_string()),
        }
    }

    /// Whether the error means the stream is gone rather than a bad message.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::ConnectionClosed | Error::Io(_))
    }
}

impl From<Error> for JsonRpcErrorData {
    fn from(err: Error) -> Self {
        err.into_rpc_error()
    }
}

/// JSON-RPC 2.0 error object
///
/// This structure is the exact wire format of the `error` member of an error
/// response: an integer `code`, a short `message`, and optional `data`.
///
/// The standard constructors use the canonical messages (`"Parse error"`,
/// `"Invalid Request"`, `"Method not found"`, `"Invalid params"`,
/// `"Internal error"`); extra context goes in `data` via [`detail`].
///
/// # Examples
///
/// ```rust
/// use jripc_core::JsonRpcErrorData;
/// use serde_json::json;
///
/// let error = JsonRpcErrorData::invalid_params().detail("text is required");
/// assert_eq!(error.code, -32602);
/// assert_eq!(error.message, "Invalid params");
///
/// // Custom application error with additional data
/// let custom = JsonRpcErrorData::with_data(
///     1001,
///     "Insufficient funds",
///     json!({"balance": 50, "required": 100})
/// );
/// assert_eq!(custom.code, 1001);
/// ```
///
/// [`detail`]: JsonRpcErrorData::detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code
    pub code: i32,

    /// Short description of the error
    pub message: String,

    /// Optional additional error information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Create a new JSON-RPC error with code and message
    ///
    /// # Examples
    ///
    /// ```rust
    /// use jripc_core::JsonRpcErrorData;
    ///
    /// let error = JsonRpcErrorData::new(-32000, "Database connection failed");
    /// assert!(error.is_server_error());
    /// ```
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a new JSON-RPC error with additional data
    pub fn with_data(code: i32, message: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data.into()),
        }
    }

    /// Attach `data` to this error, replacing any existing data.
    pub fn detail(mut self, data: impl Into<Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Create an error whose `data` is the description of `err`.
    ///
    /// Useful for reporting a lower-level failure under an application code
    /// without exposing its type to the peer.
    pub fn wrap(code: i32, message: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::with_data(code, message, err.to_string())
    }

    /// Parse error (-32700)
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error")
    }

    /// Invalid Request (-32600)
    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request")
    }

    /// Method not found (-32601), with `data = {"method": method}`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use jripc_core::JsonRpcErrorData;
    ///
    /// let error = JsonRpcErrorData::method_not_found("calculateFoo");
    /// assert_eq!(error.message, "Method not found");
    /// assert_eq!(error.data.unwrap()["method"], "calculateFoo");
    /// ```
    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::with_data(
            METHOD_NOT_FOUND,
            "Method not found",
            serde_json::json!({ "method": method.into() }),
        )
    }

    /// Invalid params (-32602)
    pub fn invalid_params() -> Self {
        Self::new(INVALID_PARAMS, "Invalid params")
    }

    /// Internal error (-32603)
    pub fn internal_error() -> Self {
        Self::new(INTERNAL_ERROR, "Internal error")
    }

    /// Build an error for an arbitrary code.
    ///
    /// Standard codes get their canonical error, codes inside the reserved
    /// server band get `"Server error"`, anything else `"Error code N"`.
    pub fn from_code(code: i32) -> Self {
        match code {
            PARSE_ERROR => Self::parse_error(),
            INVALID_REQUEST => Self::invalid_request(),
            METHOD_NOT_FOUND => Self::new(METHOD_NOT_FOUND, "Method not found"),
            INVALID_PARAMS => Self::invalid_params(),
            INTERNAL_ERROR => Self::internal_error(),
            c if is_server_error_code(c) => Self::new(c, "Server error"),
            c => Self::new(c, format!("Error code {}", c)),
        }
    }

    /// Whether the code lies in the reserved `-32099..=-32000` band.
    pub fn is_server_error(&self) -> bool {
        is_server_error_code(self.code)
    }
}

/// Whether `code` lies in the reserved server-error band.
pub fn is_server_error_code(code: i32) -> bool {
    (SERVER_ERROR_MIN..=SERVER_ERROR_MAX).contains(&code)
}

impl std::fmt::Display for JsonRpcErrorData {
    /// Formats as "[code] message", for example "[-32601] Method not found"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcErrorData {}
