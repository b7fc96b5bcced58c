pub mod recorder;
pub mod state;

pub use recorder::SegmentRecorder;
pub use state::RecorderState;
