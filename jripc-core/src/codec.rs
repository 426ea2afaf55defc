//! Newline-delimited JSON framing and message encoding
//!
//! Every JSON-RPC message travels as a single JSON value followed by `\n`.
//! This module provides both halves of that contract:
//!
//! - [`LineCodec`] frames an async byte stream (Unix socket, named pipe, or
//!   anything implementing `AsyncRead + AsyncWrite`) into lines and back
//! - free functions encode Rust values to JSON text and decode JSON text
//!   into [`JsonRpcMessage`] for classification
//!
//! # Framing Rules
//!
//! - A message is the bytes up to, and excluding, a `\n`
//! - A `\r` directly before the `\n` is stripped, so CRLF peers work
//! - Empty lines are skipped; an empty message is never surfaced
//! - At end of stream, buffered bytes without a terminator are returned as
//!   a final message; a clean end of stream is `Error::ConnectionClosed`
//!
//! # Concurrency
//!
//! Reading and writing are guarded by independent locks, so a pending read
//! never blocks a write. Concurrent writers are serialized and each message
//! is flushed as one unit, which keeps responses and notifications from
//! interleaving mid-line.
//!
//! A write that is dropped before it completes can leave part of a line in
//! the buffer. The stream is unusable for framing after that, so callers
//! only abandon writes when they are about to [`shutdown`](LineCodec::shutdown),
//! which discards the buffer instead of flushing it.
//!
//! # Error Mapping
//!
//! - Invalid JSON → `Error::Parse` (answered with `-32700`)
//! - Valid JSON that is not a single JSON-RPC object → `Error::InvalidRequest`
//! - Serialization issues → `Error::Serialization`
//!
//! # Examples
//!
//! ```rust
//! use jripc_core::{codec, JsonRpcRequest, Id};
//!
//! let request = JsonRpcRequest::new("ping", None, Id::from(1));
//! let json = codec::encode_request(&request).unwrap();
//!
//! let decoded = codec::decode(json.as_bytes()).unwrap();
//! assert!(decoded.is_request());
//! ```

use crate::error::{Error, Result};
use crate::types::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Line framing over one byte stream
///
/// The codec owns both directions of the stream. It is shared behind an
/// `Arc` between the connection's read loop and every task that writes to
/// the peer.
pub struct LineCodec {
    reader: Mutex<BufReader<BoxedReader>>,
    writer: Mutex<BufWriter<BoxedWriter>>,
}

impl LineCodec {
    /// Split `stream` into independently locked read and write halves.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_parts(reader, writer)
    }

    /// Build a codec from separate read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Mutex::new(BufReader::new(Box::new(reader))),
            writer: Mutex::new(BufWriter::new(Box::new(writer))),
        }
    }

    /// Read the next non-empty line, without its terminator.
    pub async fn read_message(&self) -> Result<Vec<u8>> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = Vec::new();
            let n = reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|e| Error::Io(e.to_string()))?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if !line.is_empty() {
                return Ok(line);
            }
        }
    }

    /// Write `payload` followed by `\n` and flush.
    pub async fn write_message(&self, payload: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(payload)
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| Error::Io(e.to_string()))?;
        writer.flush().await.map_err(|e| Error::Io(e.to_string()))
    }

    /// Read the next line and parse it as JSON.
    ///
    /// A malformed line yields `Error::Parse`; the stream stays usable.
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T> {
        let line = self.read_message().await?;
        serde_json::from_slice(&line).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Serialize `value` and write it as one line.
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let payload = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.write_message(&payload).await
    }

    /// Shut down the write half. The peer observes end of stream.
    ///
    /// Completed writes are already flushed, so anything still buffered is
    /// the tail of an abandoned write and is dropped rather than sent.
    pub async fn shutdown(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .get_mut()
            .shutdown()
            .await
            .map_err(|e| Error::Io(e.to_string()))
    }
}

/// Encode any serializable message to a JSON string
pub fn encode<T: Serialize>(msg: &T) -> Result<String> {
    serde_json::to_string(msg).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode one line into a [`JsonRpcMessage`] for classification.
///
/// Invalid JSON is `Error::Parse`. Arrays are rejected because batches are
/// not supported; any other non-object value, or an object whose members
/// have the wrong types, is `Error::InvalidRequest`.
pub fn decode(data: &[u8]) -> Result<JsonRpcMessage> {
    // Parse to a Value first so syntax errors and shape errors stay apart
    let value: serde_json::Value =
        serde_json::from_slice(data).map_err(|e| Error::Parse(e.to_string()))?;

    if value.is_array() {
        return Err(Error::InvalidRequest(
            "batch requests are not supported".to_string(),
        ));
    }
    if !value.is_object() {
        return Err(Error::InvalidRequest(
            "message must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(value).map_err(|e| Error::InvalidRequest(e.to_string()))
}

/// Decode JSON text into a specific type
pub fn decode_as<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| Error::Serialization(e.to_string()))
}

pub fn encode_request(req: &JsonRpcRequest) -> Result<String> {
    encode(req)
}

pub fn encode_notification(notif: &JsonRpcNotification) -> Result<String> {
    encode(notif)
}

pub fn encode_response(resp: &JsonRpcResponse) -> Result<String> {
    encode(resp)
}

pub fn decode_request(data: &[u8]) -> Result<JsonRpcRequest> {
    decode_as(data)
}

pub fn decode_notification(data: &[u8]) -> Result<JsonRpcNotification> {
    decode_as(data)
}

pub fn decode_response(data: &[u8]) -> Result<JsonRpcResponse> {
    decode_as(data)
}
