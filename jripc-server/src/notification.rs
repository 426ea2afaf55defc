//! Server-initiated notifications
//!
//! Two pieces live here:
//!
//! - [`Notifier`]: the send path of one connection, guarded by a closed flag
//!   so a notification after close fails fast with
//!   [`Error::NotifierClosed`] instead of touching a dead stream
//! - [`BroadcastManager`]: the set of live connections, used to push the
//!   same notification to every client
//!
//! Writes go through the connection's [`LineCodec`], whose write lock keeps
//! concurrent notifications and responses from interleaving mid-line. A
//! write stuck on a peer that stopped reading is abandoned when the
//! connection's token is cancelled.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jripc_server::BroadcastManager;
//!
//! # async fn example(manager: BroadcastManager) {
//! let delivered = manager
//!     .broadcast("config.changed", Some(serde_json::json!({"version": 2})))
//!     .await;
//! tracing::info!(delivered, "Broadcast sent");
//! # }
//! ```

use crate::connection::Connection;
use jripc_core::{Error, JsonRpcNotification, LineCodec, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default bound on one broadcast delivery
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection notification sender
pub struct Notifier {
    codec: Arc<LineCodec>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Notifier {
    /// Sender over `codec`; an in-flight send gives up once `cancel` fires.
    pub fn new(codec: Arc<LineCodec>, cancel: CancellationToken) -> Self {
        Self {
            codec,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    /// Write one notification. Fails with `NotifierClosed` after [`close`](Self::close)
    /// or when the token is cancelled before the write completes.
    pub async fn send(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::NotifierClosed);
        }

        let notification = JsonRpcNotification::new(method, params);
        tokio::select! {
            biased;
            result = self.codec.write_json(&notification) => result,
            _ = self.cancel.cancelled() => Err(Error::NotifierClosed),
        }
    }

    /// Stop accepting notifications. Safe to call repeatedly.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Live connection set for server-wide notifications
///
/// Membership is keyed by connection id, so adding the same connection
/// twice keeps a single entry. Removing or clearing never closes a
/// connection; only a delivery that exceeds the send timeout does.
#[derive(Clone)]
pub struct BroadcastManager {
    connections: Arc<RwLock<HashMap<u64, Arc<Connection>>>>,
    send_timeout: Duration,
}

impl Default for BroadcastManager {
    fn default() -> Self {
        Self {
            connections: Arc::default(),
            send_timeout: DEFAULT_BROADCAST_TIMEOUT,
        }
    }
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each per-connection delivery by `timeout`.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Add a connection. Returns `false` if it was already a member.
    pub fn add(&self, conn: Arc<Connection>) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(PoisonError::into_inner);
        match connections.entry(conn.id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(conn);
                true
            }
        }
    }

    /// Remove a connection by id. Returns whether it was a member.
    pub fn remove(&self, conn_id: u64) -> bool {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&conn_id)
            .is_some()
    }

    pub fn contains(&self, conn_id: u64) -> bool {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&conn_id)
    }

    pub fn count(&self) -> usize {
        self.connections.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Forget every member without closing any of them.
    pub fn clear(&self) {
        self.connections.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Snapshot of the current members
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Notify every member and return how many sends succeeded.
    ///
    /// Sends run concurrently over a snapshot of the membership. Each one is
    /// bounded by the send timeout; a member that cannot take the message in
    /// time counts as a failure and is closed, since its stream may now hold
    /// a partial line.
    pub async fn broadcast(&self, method: &str, params: Option<Value>) -> usize {
        let targets = self.connections();
        if targets.is_empty() {
            return 0;
        }

        let send_timeout = self.send_timeout;
        let sends = targets.iter().map(|conn| {
            let params = params.clone();
            async move {
                let result =
                    match tokio::time::timeout(send_timeout, conn.notify(method, params)).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!(
                                conn_id = conn.id(),
                                timeout_ms = send_timeout.as_millis() as u64,
                                "Broadcast delivery timed out, closing connection"
                            );
                            conn.close().await;
                            Err(Error::Timeout)
                        }
                    };
                if let Err(e) = &result {
                    tracing::debug!(conn_id = conn.id(), error = %e, "Broadcast delivery failed");
                }
                result
            }
        });

        let delivered = futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(Result::is_ok)
            .count();

        tracing::debug!(
            method = %method,
            delivered,
            members = targets.len(),
            "Broadcast complete"
        );
        delivered
    }
}
