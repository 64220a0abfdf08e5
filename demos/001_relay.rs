//! Relay round trip demonstration.
//!
//! Demonstrates:
//! - Building a relay with a stub surface capture
//! - Attaching an executor with a stub page evaluator
//! - Connecting a channel and answering a controller command
//! - Tab removal stopping the executor
//!
//! A local controller is started on an ephemeral port, so no browser or
//! external server is needed.
//!
//! Usage:
//!   cargo run --example 001_relay
//!   RUST_LOG=tab_relay=debug cargo run --example 001_relay

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use tab_relay::{
    Error, Evaluation, Relay, Result, ScriptEvaluator, SessionStatus, SurfaceCapture, TabId,
    WindowId,
};

// ============================================================================
// Constants
// ============================================================================

const CHANNEL: &str = "demo";
const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Stubs
// ============================================================================

/// Evaluates nothing; answers every script with `42`.
struct StubPage;

#[async_trait]
impl ScriptEvaluator for StubPage {
    async fn evaluate(&self, source: &str) -> Result<Evaluation> {
        println!("    page evaluates: {source}");
        Ok(Evaluation::value(json!(42)))
    }
}

/// Has no windows to capture.
struct StubScreen;

#[async_trait]
impl SurfaceCapture for StubScreen {
    async fn window_of(&self, tab_id: TabId) -> Result<WindowId> {
        Err(Error::capture_failed(tab_id, "No window in demo"))
    }

    async fn capture_visible(&self, _window_id: WindowId) -> Result<Option<String>> {
        Ok(None)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    println!("=== 001: Relay ===\n");

    // ========================================================================
    // Setup
    // ========================================================================

    println!("[Setup] Starting controller and relay...");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let relay = Relay::builder()
        .host("127.0.0.1")
        .port(port)
        .capture(Arc::new(StubScreen))
        .build()?;

    let tab = TabId::new(1).ok_or_else(|| anyhow::anyhow!("invalid tab id"))?;
    let executor = relay.attach_executor(tab, Arc::new(StubPage))?;
    println!("        ✓ Relay listening for controller on port {port}\n");

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Connecting channel \"{CHANNEL}\"");
    executor.connect(CHANNEL)?;

    let (stream, _) = tokio::time::timeout(WAIT, listener.accept()).await??;
    let mut controller = tokio_tungstenite::accept_async(stream).await?;

    let status = tokio::time::timeout(WAIT, executor.wait_for(SessionStatus::is_connected)).await??;
    println!("    Status: {status}");
    println!("    ✓ Passed\n");

    // ========================================================================
    // Evaluate
    // ========================================================================

    println!("[2] Controller sends EVALUATE_SCRIPT");
    let command = json!({"type": "EVALUATE_SCRIPT", "requestId": "demo-1", "script": "6 * 7"});
    controller
        .send(Message::Text(command.to_string().into()))
        .await?;

    let result = loop {
        match tokio::time::timeout(WAIT, controller.next()).await? {
            Some(Ok(Message::Text(text))) => break serde_json::from_str::<Value>(text.as_str())?,
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => anyhow::bail!("link closed before result"),
        }
    };
    println!("    Result: {result}");
    assert_eq!(result["result"], json!(42), "stub page answers 42");
    println!("    ✓ Passed\n");

    // ========================================================================
    // Tab removal
    // ========================================================================

    println!("[3] Removing the tab");
    relay.supervisor().tab_removed(tab)?;

    let status = tokio::time::timeout(WAIT, executor.wait_for(SessionStatus::is_terminal)).await??;
    println!("    Status: {status}");
    assert!(relay.supervisor().snapshot(tab).await?.is_none());
    println!("    ✓ Passed\n");

    relay.shutdown().await;
    println!("=== Done ===");
    Ok(())
}
