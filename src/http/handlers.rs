use super::state::AppState;
use crate::error::PipelineError;
use crate::recorder::RecorderState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub state: RecorderState,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub state: RecorderState,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: RecorderState,
    /// Normalized input level, 0.0 to 1.0
    pub volume: f32,
    pub session_id: Option<Uuid>,
    pub segments_submitted: usize,
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectivityRequest {
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectivityResponse {
    pub online: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_status(e: &PipelineError) -> StatusCode {
    match e {
        PipelineError::PermissionDenied => StatusCode::FORBIDDEN,
        PipelineError::InsufficientStorage { .. } => StatusCode::INSUFFICIENT_STORAGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recorder/start
/// Begin a recording session
pub async fn start_recorder(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let requested = body.and_then(|Json(req)| req.session_id);

    // Check if already recording
    if state.recorder.state().is_active() {
        return (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Recorder is already active".to_string(),
            }),
        )
            .into_response();
    }

    match state.recorder.start(requested).await {
        Ok(session_id) => {
            info!("Recording started: {}", session_id);
            (
                StatusCode::OK,
                Json(StartResponse {
                    session_id,
                    state: state.recorder.state(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to start recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /recorder/pause
pub async fn pause_recorder(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.pause().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ControlResponse {
                state: state.recorder.state(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to pause recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /recorder/resume
pub async fn resume_recorder(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.resume().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ControlResponse {
                state: state.recorder.state(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to resume recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// POST /recorder/stop
/// End the session; transcription of submitted segments continues
pub async fn stop_recorder(State(state): State<AppState>) -> impl IntoResponse {
    match state.recorder.stop().await {
        Ok(()) => {
            info!("Recording stopped");
            (
                StatusCode::OK,
                Json(ControlResponse {
                    state: state.recorder.state(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            (
                error_status(&e),
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /recorder/status
pub async fn recorder_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = StatusResponse {
        state: state.recorder.state(),
        volume: state.recorder.volume(),
        session_id: state.recorder.session_id().await,
        segments_submitted: state.recorder.segments_submitted(),
        online: state.connectivity.is_online(),
    };
    (StatusCode::OK, Json(status))
}

/// GET /sessions?offset&limit
/// Session history, newest first
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<SessionsQuery>,
) -> impl IntoResponse {
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(50).min(200);

    let sessions = state.store.query_sessions(offset, limit).await;
    (StatusCode::OK, Json(sessions))
}

/// GET /sessions/:session_id
/// Full session detail including per-segment status and transcripts
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.store.session(session_id).await {
        Some(record) => (StatusCode::OK, Json(record)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// POST /connectivity
/// Reachability signal injection from the platform
pub async fn set_connectivity(
    State(state): State<AppState>,
    Json(req): Json<ConnectivityRequest>,
) -> impl IntoResponse {
    state.connectivity.set_online(req.online);
    (
        StatusCode::OK,
        Json(ConnectivityResponse { online: req.online }),
    )
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
