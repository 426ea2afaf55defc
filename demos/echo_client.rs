//! Client for the echo server demo
//!
//! Start `echo_server` first, then run `cargo run --example echo_client`.

use jripc_client::JripcClient;
use jripc_core::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Serialize)]
struct UppercaseParams {
    text: String,
}

#[derive(Deserialize)]
struct UppercaseResult {
    result: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Connecting to echo-server...");
    let client = JripcClient::connect("echo-server").await?;
    println!("Connected! Sending requests...\n");

    let echoed: serde_json::Value = client
        .request("echo", serde_json::json!({"hello": "world", "number": 42}))
        .await?;
    println!("echo({{...}}) = {}", echoed);

    let upper: UppercaseResult = client
        .request(
            "uppercase",
            UppercaseParams {
                text: "hello, ipc".to_string(),
            },
        )
        .await?;
    println!("uppercase('hello, ipc') = {}", upper.result);

    // Empty text is rejected with Invalid params
    match client
        .request::<_, UppercaseResult>("uppercase", UppercaseParams { text: String::new() })
        .await
    {
        Err(Error::JsonRpc(e)) => println!("uppercase('') failed: {} ({})", e.message, e.code),
        Err(e) => return Err(e.into()),
        Ok(_) => println!("uppercase('') unexpectedly succeeded"),
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .on_notification("progress", move |notif| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(notif.params.unwrap_or_default());
            }
        })
        .await;

    let count = 5;
    let started: serde_json::Value = client
        .request(
            "startNotifications",
            serde_json::json!({"count": count, "interval": 200}),
        )
        .await?;
    println!("\nstartNotifications = {}", started);

    for _ in 0..count {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(progress)) => println!(
                "progress: {}/{} ({}%)",
                progress["current"], progress["total"], progress["percent"]
            ),
            _ => {
                println!("Timed out waiting for progress");
                break;
            }
        }
    }

    client.close().await?;
    println!("\nDone");
    Ok(())
}
