//! Echo server over a local socket
//!
//! Methods:
//!   - echo(any): returns its params unchanged
//!   - uppercase({text}): returns {result: TEXT}
//!   - startNotifications({count, interval}): streams `progress` notifications
//!
//! Run with `cargo run --example echo_server`, then start `echo_client`.

use jripc_core::{Error, JsonRpcErrorData};
use jripc_server::{
    from_fn, from_typed_fn, JripcServer, LoggingMiddleware, RecoveryMiddleware,
    TimeoutMiddleware,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Deserialize, Default)]
struct UppercaseParams {
    text: String,
}

#[derive(Serialize)]
struct UppercaseResult {
    result: String,
}

#[derive(Deserialize, Default)]
struct NotificationParams {
    count: u32,
    /// Milliseconds between notifications
    interval: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let echo_handler = from_fn(|_ctx, params| async move {
        Ok(params.unwrap_or(serde_json::Value::Null))
    });

    let uppercase_handler = from_typed_fn(|_ctx, p: UppercaseParams| async move {
        if p.text.is_empty() {
            return Err(Error::JsonRpc(
                JsonRpcErrorData::invalid_params().detail("text is required"),
            ));
        }
        Ok(UppercaseResult {
            result: p.text.to_uppercase(),
        })
    });

    let notifications_handler = from_typed_fn(|ctx, p: NotificationParams| async move {
        let conn = Arc::clone(ctx.connection());

        // Answer right away and stream in the background
        tokio::spawn(async move {
            for current in 1..=p.count {
                tokio::time::sleep(Duration::from_millis(p.interval)).await;

                let progress = serde_json::json!({
                    "current": current,
                    "total": p.count,
                    "percent": f64::from(current) / f64::from(p.count) * 100.0,
                });
                if let Err(e) = conn.notify("progress", Some(progress)).await {
                    tracing::warn!(error = %e, "Failed to send notification");
                    return;
                }
            }
        });

        Ok(serde_json::json!({"message": "notifications started"}))
    });

    let server = JripcServer::builder()
        .bind("echo-server")
        .use_middleware(RecoveryMiddleware)
        .use_middleware(LoggingMiddleware::new())
        .use_middleware(TimeoutMiddleware::new(Duration::from_secs(30)))
        .on_connect(|conn| tracing::info!(peer = %conn.remote_addr(), "Client connected"))
        .on_disconnect(|conn| tracing::info!(peer = %conn.remote_addr(), "Client disconnected"))
        .handler("echo", echo_handler)
        .handler("uppercase", uppercase_handler)
        .handler("startNotifications", notifications_handler)
        .build()
        .await?;

    println!("Echo server listening on {}", server.socket_path());
    println!("Available methods: {:?}", server.methods());
    println!("Press Ctrl+C to stop");

    server
        .run_until(
            async {
                let _ = tokio::signal::ctrl_c().await;
                tracing::info!("Shutting down server...");
            },
            Duration::from_secs(10),
        )
        .await?;

    println!("Server stopped");
    Ok(())
}
