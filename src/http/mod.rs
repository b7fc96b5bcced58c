//! HTTP API server for external control (UI frontends, scripts)
//!
//! This module provides a REST API for driving the capture pipeline:
//! - POST /recorder/start - Begin a recording session
//! - POST /recorder/pause - Suspend writing without closing the segment
//! - POST /recorder/resume - Resume writing
//! - POST /recorder/stop - End the session, submit the final segment
//! - GET  /recorder/status - State, volume, session, connectivity
//! - GET  /sessions - Session history (offset/limit, newest first)
//! - GET  /sessions/:id - Session detail with per-segment transcripts
//! - POST /connectivity - Inject the platform reachability signal
//! - GET  /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
