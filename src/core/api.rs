//! HTTP + WebSocket status API for Proxi-Lock
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /status - Engine status snapshot
//! - POST /config - Hot-swap engine config
//! - POST /wake - Report a system wake
//! - POST /sleep - Report an imminent system sleep
//! - POST /start - Start monitoring
//! - POST /stop - Stop monitoring
//! - WS /ws - Live decision stream

use axum::{
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::core::config::EngineConfig;
use crate::core::monitor::Monitor;
use crate::types::{DecisionOutput, EngineStatus};

/// Monitor shared between the API and the CLI
pub type SharedMonitor = Arc<Mutex<Monitor>>;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub monitoring: bool,
}

/// Config swap response
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    /// False when the thresholds were invalid and the previous pair was kept
    pub thresholds_accepted: bool,
    pub config: EngineConfig,
}

/// Lifecycle response
#[derive(Debug, Serialize)]
pub struct LifecycleResponse {
    pub monitoring: bool,
    pub changed: bool,
}

/// Create the API router
pub fn create_router(monitor: SharedMonitor) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/config", post(configure))
        .route("/wake", post(wake))
        .route("/sleep", post(sleep))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/ws", get(websocket_handler))
        .with_state(monitor)
}

/// Health check endpoint
async fn health(State(monitor): State<SharedMonitor>) -> Json<HealthResponse> {
    let monitor = monitor.lock().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
        monitoring: monitor.is_running(),
    })
}

/// Current engine status
async fn status(State(monitor): State<SharedMonitor>) -> Json<EngineStatus> {
    Json(monitor.lock().await.status())
}

/// Swap engine configuration
async fn configure(
    State(monitor): State<SharedMonitor>,
    Json(config): Json<EngineConfig>,
) -> Json<ConfigResponse> {
    let mut monitor = monitor.lock().await;
    let thresholds_accepted = monitor.configure(config).await;
    if !thresholds_accepted {
        warn!("config swap with invalid thresholds, previous pair kept");
    }
    Json(ConfigResponse {
        thresholds_accepted,
        config: monitor.config().clone(),
    })
}

/// Report a system wake (e.g. from a sleepwatcher hook)
async fn wake(State(monitor): State<SharedMonitor>) -> StatusCode {
    info!("wake reported over HTTP");
    monitor.lock().await.notify_wake().await;
    StatusCode::NO_CONTENT
}

/// Report an imminent system sleep
async fn sleep(State(monitor): State<SharedMonitor>) -> StatusCode {
    monitor.lock().await.notify_sleep();
    StatusCode::NO_CONTENT
}

/// Start monitoring
async fn start(State(monitor): State<SharedMonitor>) -> Result<Json<LifecycleResponse>, StatusCode> {
    let mut monitor = monitor.lock().await;
    let changed = monitor.start().map_err(|e| {
        warn!(error = %e, "start failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(LifecycleResponse { monitoring: monitor.is_running(), changed }))
}

/// Stop monitoring
async fn stop(State(monitor): State<SharedMonitor>) -> Result<Json<LifecycleResponse>, StatusCode> {
    let mut monitor = monitor.lock().await;
    let changed = monitor.is_running();
    monitor.stop().await.map_err(|e| {
        warn!(error = %e, "stop failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(LifecycleResponse { monitoring: monitor.is_running(), changed }))
}

/// WebSocket handler for live updates
async fn websocket_handler(
    State(monitor): State<SharedMonitor>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = monitor.lock().await.subscribe();
    ws.on_upgrade(move |socket| handle_websocket(socket, rx))
}

/// Handle WebSocket connection until the client goes away
async fn handle_websocket(socket: WebSocket, mut rx: broadcast::Receiver<DecisionOutput>) {
    let (mut sender, mut receiver) = socket.split();
    loop {
        tokio::select! {
            update = rx.recv() => {
                let update = match update {
                    Ok(update) => update,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket subscriber lagging");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Ok(json) = serde_json::to_string(&update) else { continue };
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// Run the API server
pub async fn run_server(addr: &str, monitor: SharedMonitor) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let router = create_router(monitor);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "status API listening");
    println!("🔐 Proxi-Lock API running on {}", addr);
    println!("  GET  /health  - Health check");
    println!("  GET  /status  - Engine status");
    println!("  POST /config  - Swap engine config");
    println!("  POST /wake    - Report system wake");
    println!("  POST /sleep   - Report system sleep");
    println!("  POST /start   - Start monitoring");
    println!("  POST /stop    - Stop monitoring");
    println!("  WS   /ws      - Live decisions");
    axum::serve(listener, router).await?;
    Ok(())
}
