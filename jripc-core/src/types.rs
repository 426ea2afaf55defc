//! JSON-RPC 2.0 message types
//!
//! This module implements the data structures exchanged over an IPC stream
//! (https://www.jsonrpc.org/specification):
//!
//! 1. **Request**: A call to a remote method that expects a response
//! 2. **Notification**: A call with no `id`, for which no response is sent
//! 3. **Response**: The result of a request, either `result` or `error`
//!
//! # Classifying Incoming Lines
//!
//! An incoming line is first decoded into [`JsonRpcMessage`], a flat struct
//! in which every member is optional. The classification predicates
//! (`is_request`, `is_notification`, `is_response`, ...) decide what the line
//! is before it is committed to a concrete type with
//! [`JsonRpcMessage::into_request`] or [`JsonRpcMessage::into_response`].
//! Deciding from the members present, rather than trying each concrete type
//! in turn, lets a peer send `"result": null` or omit `jsonrpc` without the
//! line being misread.
//!
//! # Request IDs
//!
//! IDs are strings or numbers. Numeric IDs are kept as [`serde_json::Number`]
//! so that integer and floating point IDs both survive a round trip, and they
//! compare by numeric value: `1` and `1.0` are the same ID.

use crate::error::{Error, JsonRpcErrorData, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Number, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier used to correlate requests with responses
///
/// `Null` only appears in error responses whose request id could not be
/// determined, for example when the line was not valid JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    /// String identifier
    String(String),
    /// Integer or floating point identifier
    Number(Number),
    /// Explicit `null`
    Null,
}

impl Id {
    /// Returns true for `Id::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Id::Null)
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Id::String(a), Id::String(b)) => a == b,
            (Id::Number(a), Id::Number(b)) => numbers_equal(a, b),
            (Id::Null, Id::Null) => true,
            _ => false,
        }
    }
}

impl Eq for Id {}

impl Hash for Id {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Id::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Id::Number(n) => {
                1u8.hash(state);
                hash_number(n, state);
            }
            Id::Null => 2u8.hash(state),
        }
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

// Integral values hash as i64 so that `1` and `1.0` land in the same bucket.
fn hash_number<H: Hasher>(n: &Number, state: &mut H) {
    if let Some(i) = n.as_i64() {
        return i.hash(state);
    }
    let f = n.as_f64().unwrap_or_default();
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        (f as i64).hash(state);
    } else {
        f.to_bits().hash(state);
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write!(f, "\"{}\"", s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Null => write!(f, "null"),
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i32> for Id {
    fn from(n: i32) -> Self {
        Id::Number(n.into())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n.into())
    }
}

impl From<u64> for Id {
    fn from(n: u64) -> Self {
        Id::Number(n.into())
    }
}

impl From<f64> for Id {
    /// Non-finite values have no JSON representation and become `Id::Null`.
    fn from(n: f64) -> Self {
        Number::from_f64(n).map(Id::Number).unwrap_or(Id::Null)
    }
}

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

// Keeps `"result": null` distinguishable from a missing `result` member.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// A JSON-RPC 2.0 request
///
/// `method` is non-empty and `id` is present and non-null. When a request
/// arrives without a `jsonrpc` member it is recorded as `"2.0"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version, always "2.0"
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Name of the method to invoke
    pub method: String,
    /// Method parameters, passed through to the handler untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Request identifier
    pub id: Id,
}

impl JsonRpcRequest {
    /// Create a new request
    ///
    /// # Examples
    ///
    /// ```rust
    /// use jripc_core::{JsonRpcRequest, Id};
    /// use serde_json::json;
    ///
    /// let req = JsonRpcRequest::new("add", Some(json!({"a": 5, "b": 3})), Id::from(1));
    /// assert_eq!(req.jsonrpc, "2.0");
    /// ```
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 notification
///
/// Notifications have no `id` member at all; that absence is what makes them
/// notifications. They never receive a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version, always "2.0"
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Name of the notification
    pub method: String,
    /// Notification payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a new notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: default_version(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response
///
/// Exactly one of `result` or `error` is set. A successful response always
/// serializes its `result` member, even when the value is `null`. An error
/// response may carry `Id::Null` when the request id was unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0"
    #[serde(default = "default_version")]
    pub jsonrpc: String,
    /// Result of a successful call
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error of a failed call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
    /// Id of the request this answers
    pub id: Id,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(result: Value, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    pub fn error(error: JsonRpcErrorData, id: Id) -> Self {
        Self {
            jsonrpc: default_version(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Check if this is a success response
    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Turn the response into the call outcome.
    pub fn into_result(self) -> Result<Value> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(Error::JsonRpc(error)),
            (Some(result), None) => Ok(result),
            (None, None) => Err(Error::InvalidRequest(
                "response has neither result nor error".to_string(),
            )),
        }
    }
}

/// Any single JSON-RPC value as read off the wire
///
/// Every member is optional so that any JSON object with correctly typed
/// members decodes, and the classification predicates decide what it is:
///
/// | predicate | rule |
/// |---|---|
/// | `is_request` | method non-empty and id non-null |
/// | `is_notification` | method non-empty and id absent or null |
/// | `is_response` | id non-null and method absent or empty |
/// | `is_success_response` | response with `result` and without `error` |
/// | `is_error_response` | `error` present and id non-null |
///
/// A line that satisfies none of them is an invalid request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    /// Protocol version as sent by the peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    /// Method name, for requests and notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Parameters, for requests and notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Identifier; `null` decodes to `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    /// Result, for success responses (present even when `null`)
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// Error, for error responses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorData>,
}

impl JsonRpcMessage {
    fn has_method(&self) -> bool {
        self.method.as_deref().is_some_and(|m| !m.is_empty())
    }

    fn has_id(&self) -> bool {
        self.id.as_ref().is_some_and(|id| !id.is_null())
    }

    /// The id to answer with: the message id, or `Id::Null` when absent.
    pub fn response_id(&self) -> Id {
        self.id.clone().unwrap_or(Id::Null)
    }

    pub fn is_request(&self) -> bool {
        self.has_method() && self.has_id()
    }

    pub fn is_notification(&self) -> bool {
        self.has_method() && !self.has_id()
    }

    pub fn is_response(&self) -> bool {
        self.has_id() && !self.has_method()
    }

    pub fn is_success_response(&self) -> bool {
        self.is_response() && self.result.is_some() && self.error.is_none()
    }

    pub fn is_error_response(&self) -> bool {
        self.error.is_some() && self.has_id()
    }

    /// Commit the message to a request.
    ///
    /// Fails with `Error::InvalidRequest` if the message is not a request or
    /// announces a protocol version other than "2.0".
    pub fn into_request(self) -> Result<JsonRpcRequest> {
        if !self.is_request() {
            return Err(Error::InvalidRequest("message is not a request".to_string()));
        }
        let jsonrpc = checked_version(self.jsonrpc)?;
        match (self.method, self.id) {
            (Some(method), Some(id)) => Ok(JsonRpcRequest {
                jsonrpc,
                method,
                params: self.params,
                id,
            }),
            _ => Err(Error::InvalidRequest("message is not a request".to_string())),
        }
    }

    /// Commit the message to a notification.
    pub fn into_notification(self) -> Result<JsonRpcNotification> {
        if !self.is_notification() {
            return Err(Error::InvalidRequest(
                "message is not a notification".to_string(),
            ));
        }
        let jsonrpc = checked_version(self.jsonrpc)?;
        match self.method {
            Some(method) => Ok(JsonRpcNotification {
                jsonrpc,
                method,
                params: self.params,
            }),
            None => Err(Error::InvalidRequest(
                "message is not a notification".to_string(),
            )),
        }
    }

    /// Commit the message to a response.
    ///
    /// Fails when the message is not a response, or carries both `result`
    /// and `error`, or neither.
    pub fn into_response(self) -> Result<JsonRpcResponse> {
        if !self.is_success_response() && !self.is_error_response() {
            return Err(Error::InvalidRequest("message is not a response".to_string()));
        }
        if self.result.is_some() && self.error.is_some() {
            return Err(Error::InvalidRequest(
                "response has both result and error".to_string(),
            ));
        }
        let jsonrpc = checked_version(self.jsonrpc)?;
        Ok(JsonRpcResponse {
            jsonrpc,
            result: self.result,
            error: self.error,
            id: self.id.unwrap_or(Id::Null),
        })
    }
}

fn checked_version(version: Option<String>) -> Result<String> {
    match version {
        None => Ok(default_version()),
        Some(v) if v == JSONRPC_VERSION => Ok(v),
        Some(v) => Err(Error::InvalidRequest(format!(
            "unsupported jsonrpc version {:?}",
            v
        ))),
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(req: JsonRpcRequest) -> Self {
        Self {
            jsonrpc: Some(req.jsonrpc),
            method: Some(req.method),
            params: req.params,
            id: Some(req.id),
            ..Default::default()
        }
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(notif: JsonRpcNotification) -> Self {
        Self {
            jsonrpc: Some(notif.jsonrpc),
            method: Some(notif.method),
            params: notif.params,
            ..Default::default()
        }
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(resp: JsonRpcResponse) -> Self {
        Self {
            jsonrpc: Some(resp.jsonrpc),
            id: Some(resp.id),
            result: resp.result,
            error: resp.error,
            ..Default::default()
        }
    }
}
