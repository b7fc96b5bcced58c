use std::sync::Arc;

use crate::connectivity::ConnectivityMonitor;
use crate::persist::TranscriptStore;
use crate::recorder::SegmentRecorder;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single recorder instance driven by the control endpoints
    pub recorder: Arc<SegmentRecorder>,
    /// Session and transcript history
    pub store: Arc<dyn TranscriptStore>,
    /// Reachability signal, injected over POST /connectivity
    pub connectivity: ConnectivityMonitor,
}

impl AppState {
    pub fn new(
        recorder: Arc<SegmentRecorder>,
        store: Arc<dyn TranscriptStore>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        Self {
            recorder,
            store,
            connectivity,
        }
    }
}
