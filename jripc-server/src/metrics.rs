//! Server metrics definitions
//!
//! OpenTelemetry instruments for server health. They record into the global
//! meter provider, so nothing leaves the process unless
//! [`init_observability`](jripc_core::init_observability) installed an
//! exporter; otherwise the calls are no-ops.
//!
//! # Metrics Collected
//!
//! - **jripc.server.connections.active**: open connections (gauge)
//! - **jripc.server.connections.total**: connections accepted since startup
//! - **jripc.server.requests.total**: requests answered, by method and status
//! - **jripc.server.request.duration**: handler latency in seconds (histogram)
//! - **jripc.server.notifications.total**: notifications sent, by method
//! - **jripc.server.broadcasts.total**: broadcast deliveries, by method
//! - **jripc.server.errors.total**: transport and write errors, by kind
//!
//! # Examples
//!
//! ```rust
//! use jripc_server::ServerMetrics;
//!
//! let metrics = ServerMetrics::new("my-daemon");
//! metrics.record_connection();
//! metrics.record_request("add", "success", 0.002);
//! metrics.record_disconnection();
//! assert_eq!(metrics.active_connections(), 0);
//! ```

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram, Meter},
    InstrumentationScope, KeyValue,
};
use std::sync::atomic::{AtomicI64, Ordering};

/// OpenTelemetry instruments for one server
pub struct ServerMetrics {
    pub connections_active: Gauge<i64>,
    pub connections_total: Counter<u64>,
    pub requests_total: Counter<u64>,
    /// Seconds
    pub request_duration: Histogram<f64>,
    pub notifications_total: Counter<u64>,
    pub broadcasts_total: Counter<u64>,
    pub errors_total: Counter<u64>,
    active: AtomicI64,
}

impl ServerMetrics {
    /// Create instruments on the global meter provider under `service_name`.
    pub fn new(service_name: impl Into<String>) -> Self {
        let scope = InstrumentationScope::builder(service_name.into()).build();
        Self::with_meter(&global::meter_with_scope(scope))
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            connections_active: meter
                .i64_gauge("jripc.server.connections.active")
                .with_description("Number of open IPC connections")
                .build(),
            connections_total: meter
                .u64_counter("jripc.server.connections.total")
                .with_description("Total number of connections accepted")
                .build(),
            requests_total: meter
                .u64_counter("jripc.server.requests.total")
                .with_description("Total number of requests answered")
                .build(),
            request_duration: meter
                .f64_histogram("jripc.server.request.duration")
                .with_description("Request processing duration in seconds")
                .with_unit("s")
                .build(),
            notifications_total: meter
                .u64_counter("jripc.server.notifications.total")
                .with_description("Total number of notifications sent")
                .build(),
            broadcasts_total: meter
                .u64_counter("jripc.server.broadcasts.total")
                .with_description("Total number of broadcast deliveries")
                .build(),
            errors_total: meter
                .u64_counter("jripc.server.errors.total")
                .with_description("Total number of errors encountered")
                .build(),
            active: AtomicI64::new(0),
        }
    }

    pub fn record_connection(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.connections_active.record(active, &[]);
        self.connections_total.add(1, &[]);
    }

    pub fn record_disconnection(&self) {
        let active = self.active.fetch_sub(1, Ordering::SeqCst) - 1;
        self.connections_active.record(active, &[]);
    }

    /// Connections currently counted as open
    pub fn active_connections(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    /// Record one answered request. `status` is `"success"` or `"error"`.
    pub fn record_request(&self, method: &str, status: &str, duration_secs: f64) {
        let attributes = &[
            KeyValue::new("method", method.to_string()),
            KeyValue::new("status", status.to_string()),
        ];
        self.requests_total.add(1, attributes);
        self.request_duration.record(duration_secs, attributes);
    }

    pub fn record_notification(&self, method: &str) {
        self.notifications_total
            .add(1, &[KeyValue::new("method", method.to_string())]);
    }

    /// Record a broadcast that reached `delivered` connections.
    pub fn record_broadcast(&self, method: &str, delivered: usize) {
        self.broadcasts_total
            .add(delivered as u64, &[KeyValue::new("method", method.to_string())]);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors_total
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }
}

impl std::fmt::Debug for ServerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerMetrics")
            .field("active", &self.active_connections())
            .finish_non_exhaustive()
    }
}
