pub mod audio;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod http;
pub mod ledger;
pub mod persist;
pub mod recorder;
pub mod segment;
pub mod transcribe;

pub use audio::{
    AudioFrame, AudioSource, MicAuthorization, QualityPreset, SourceConfig, SourceEvent,
    SourceStream, VolumeMeter, WavFileSource,
};
pub use config::Config;
pub use connectivity::ConnectivityMonitor;
pub use error::{BackendError, PipelineError};
pub use http::{create_router, AppState};
pub use ledger::RetryLedger;
pub use persist::{
    MemoryStore, SegmentRecord, SegmentStatus, SessionRecord, SessionSummary, TranscriptRecord,
    TranscriptStore,
};
pub use recorder::{RecorderState, SegmentRecorder};
pub use segment::{SegmentMeta, SegmentStore, SegmentWriter};
pub use transcribe::{
    LocalBackend, RemoteBackend, TranscriptionBackend, TranscriptionCoordinator,
    UNAVAILABLE_TRANSCRIPT,
};
