pub mod meter;
pub mod source;
pub mod wav_source;

pub use meter::VolumeMeter;
pub use source::{
    AudioFrame, AudioSource, MicAuthorization, QualityPreset, SourceConfig, SourceEvent,
    SourceStream,
};
pub use wav_source::WavFileSource;
