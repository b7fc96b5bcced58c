use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recorder control
        .route("/recorder/start", post(handlers::start_recorder))
        .route("/recorder/pause", post(handlers::pause_recorder))
        .route("/recorder/resume", post(handlers::resume_recorder))
        .route("/recorder/stop", post(handlers::stop_recorder))
        .route("/recorder/status", get(handlers::recorder_status))
        // Session history
        .route("/sessions", get(handlers::list_sessions))
        .route("/sessions/:session_id", get(handlers::get_session))
        // Reachability injection
        .route("/connectivity", post(handlers::set_connectivity))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
