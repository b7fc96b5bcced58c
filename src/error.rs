//! Error types for the capture and transcription pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline-level errors
///
/// `PermissionDenied` and `InsufficientStorage` abort a start attempt and
/// surface to the control API; everything else is contained per-segment.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("insufficient disk space: {available_mb} MB free, {required_mb} MB required")]
    InsufficientStorage { available_mb: u64, required_mb: u64 },

    #[error("segment write failed for {path:?}: {reason}")]
    SegmentWrite { path: PathBuf, reason: String },

    #[error("network unavailable")]
    NetworkUnavailable,

    #[error("transcription backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("audio source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from a transcription backend (remote endpoint or local recognizer)
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unparsable backend response: {0}")]
    InvalidResponse(String),

    #[error("recognizer failed: {0}")]
    Recognizer(String),
}
