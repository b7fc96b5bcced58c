use anyhow::Result;
use serde::Deserialize;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Capture quality preset (mono linear PCM)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    /// 8 kHz, 8-bit
    Low,
    /// 16 kHz, 16-bit
    Medium,
    /// 44.1 kHz, 16-bit
    High,
}

impl QualityPreset {
    pub fn sample_rate(&self) -> u32 {
        match self {
            QualityPreset::Low => 8_000,
            QualityPreset::Medium => 16_000,
            QualityPreset::High => 44_100,
        }
    }

    pub fn bits_per_sample(&self) -> u16 {
        match self {
            QualityPreset::Low => 8,
            QualityPreset::Medium | QualityPreset::High => 16,
        }
    }

    pub fn channels(&self) -> u16 {
        1
    }

    pub fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels(),
            sample_rate: self.sample_rate(),
            bits_per_sample: self.bits_per_sample(),
            sample_format: hound::SampleFormat::Int,
        }
    }
}

/// Microphone authorization state reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicAuthorization {
    Granted,
    Denied,
    Undetermined,
}

/// Out-of-band events emitted by a capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEvent {
    /// Platform-level audio interruption started (e.g. an incoming call);
    /// the recorder treats this as a forced stop
    InterruptionBegan,
    InterruptionEnded,
    /// Input/output route changed (e.g. headset plugged in)
    RouteChanged,
}

/// Channels handed out by a started source
pub struct SourceStream {
    /// Captured audio frames
    pub frames: mpsc::Receiver<AudioFrame>,
    /// Interruption and route-change notifications
    pub events: mpsc::Receiver<SourceEvent>,
}

/// Configuration for a capture source
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Target capture format
    pub preset: QualityPreset,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            preset: QualityPreset::High,
            buffer_duration_ms: 100,
        }
    }
}

/// Audio capture source trait
///
/// The platform audio subsystem sits behind this boundary. Implementations
/// push frames into a bounded channel from their own capture context; the
/// recorder never blocks that context.
#[async_trait::async_trait]
pub trait AudioSource: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns the frame channel plus the event channel for interruption
    /// and route-change notifications.
    async fn start(&mut self) -> Result<SourceStream>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Current microphone authorization state
    fn authorization(&self) -> MicAuthorization;

    /// Ask the platform for microphone access; returns true when granted
    async fn request_authorization(&mut self) -> bool;

    /// Source name for logging
    fn name(&self) -> &str;
}
