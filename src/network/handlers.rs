//! HTTP status API handlers

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::audio::AudioFormat;
use crate::network::server::ServerState;
use crate::session::SessionStatus;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Server status
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub mode: String,
    pub active_sessions: usize,
    pub uptime_seconds: u64,
    pub format: AudioFormat,
}

/// Get server status
pub async fn get_status(State(state): State<Arc<ServerState>>) -> Json<ApiResponse<ServerStatus>> {
    let status = ServerStatus {
        mode: "server".to_string(),
        active_sessions: state.registry.len(),
        uptime_seconds: state.started.elapsed().as_secs(),
        format: state.format,
    };

    Json(ApiResponse::ok(status))
}

/// Get all active sessions
pub async fn get_sessions(
    State(state): State<Arc<ServerState>>,
) -> Json<ApiResponse<Vec<SessionStatus>>> {
    Json(ApiResponse::ok(state.registry.snapshot()))
}

/// Fallback for unknown API paths
pub async fn not_found() -> (axum::http::StatusCode, Json<ApiResponse<()>>) {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(ApiResponse::error("Not found")),
    )
}
