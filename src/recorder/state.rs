use std::fmt;

use serde::Serialize;

/// Lifecycle state of the segment recorder
///
/// `Rotating` and `Stopping` are transient states the capture task
/// passes through; observers see them on the state watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Recording,
    Paused,
    Rotating,
    Stopping,
}

impl RecorderState {
    pub fn is_active(&self) -> bool {
        !matches!(self, RecorderState::Idle)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Idle => "idle",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Rotating => "rotating",
            RecorderState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}
