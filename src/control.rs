//! Control interface (§6, logical): a minimal axum router for
//! start/stop/status plus the `/stream` broadcast WebSocket and a `/health`
//! liveness endpoint. The alerts/vessels query surface is out of scope.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::session::{SessionRegistry, StartReplayArgs};

static STARTUP_MS: AtomicU64 = AtomicU64::new(0);

pub fn record_startup_time() {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    STARTUP_MS.store(now, Ordering::Relaxed);
}

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/replay/start", post(start_replay))
        .route("/replay/stop", post(stop_replay))
        .route("/replay/status", get(replay_status))
        .route("/stream", get(stream_handler))
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64;
    let startup = STARTUP_MS.load(Ordering::Relaxed);
    let uptime_secs = if startup > 0 { (now_ms - startup) / 1000 } else { 0 };
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": uptime_secs,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartReplayBody {
    path: String,
    #[serde(default = "default_speedup")]
    speedup: f64,
    use_streaming: Option<bool>,
    batch_size: Option<usize>,
}

fn default_speedup() -> f64 {
    1.0
}

async fn start_replay(
    State(state): State<AppState>,
    Json(body): Json<StartReplayBody>,
) -> (StatusCode, Json<serde_json::Value>) {
    let result = state
        .sessions
        .start(StartReplayArgs {
            path: PathBuf::from(body.path),
            speedup: body.speedup,
            use_streaming: body.use_streaming,
            batch_size: body.batch_size,
        })
        .await;

    match result {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "started" }))),
        Err(crate::error::SessionError::Conflict) => {
            (StatusCode::CONFLICT, Json(json!({ "status": "conflict" })))
        }
        Err(crate::error::SessionError::Load(crate::error::LoadError::NotFound(path))) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "status": "not-found", "path": path })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error", "message": e.to_string() })),
        ),
    }
}

async fn stop_replay(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    state.sessions.stop().await;
    (StatusCode::ACCEPTED, Json(json!({ "status": "stopping" })))
}

async fn replay_status(State(state): State<AppState>) -> Json<crate::replay::ReplayStatus> {
    Json(state.sessions.status().await)
}

async fn stream_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_stream(socket, state))
}

async fn handle_stream(mut socket: WebSocket, state: AppState) {
    let mut rx = state.sessions_hub_subscribe();
    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(_)) => continue,
                    _ => break,
                }
            }
        }
    }
}

impl AppState {
    fn sessions_hub_subscribe(&self) -> tokio::sync::broadcast::Receiver<String> {
        self.sessions.hub_subscribe()
    }
}
