use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::source::{
    AudioFrame, AudioSource, MicAuthorization, SourceConfig, SourceStream,
};

/// Audio source that streams an on-disk WAV file as capture frames
///
/// Stands in for the device microphone in development and testing. The
/// file is decoded up front and replayed in buffer-sized frames; with
/// `realtime` set the replay is paced at the file's actual duration,
/// otherwise frames are delivered as fast as the consumer drains them.
pub struct WavFileSource {
    path: PathBuf,
    config: SourceConfig,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl WavFileSource {
    pub fn new(path: impl AsRef<Path>, config: SourceConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            realtime: false,
            task: None,
        }
    }

    /// Pace frame delivery at the file's real duration
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

#[async_trait::async_trait]
impl AudioSource for WavFileSource {
    async fn start(&mut self) -> Result<SourceStream> {
        let path = self.path.clone();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(&path)
            .with_context(|| format!("Failed to open WAV file: {}", path.display()))?;
        let spec = reader.spec();
        let samples: Vec<i16> = match spec.sample_format {
            hound::SampleFormat::Int => reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .map(|s| s.map(|f| (f.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);
        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let (frame_tx, frame_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(16);

        let buffer_ms = self.config.buffer_duration_ms.max(1);
        let samples_per_frame =
            (spec.sample_rate as u64 * spec.channels as u64 * buffer_ms / 1000).max(1) as usize;
        let realtime = self.realtime;

        let task = tokio::spawn(async move {
            // Hold the event sender open for the lifetime of the stream so
            // the receiver stays pending rather than closing immediately.
            let _event_tx = event_tx;
            let mut timestamp_ms = 0u64;

            for chunk in samples.chunks(samples_per_frame) {
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms,
                };
                timestamp_ms +=
                    chunk.len() as u64 * 1000 / (spec.sample_rate as u64 * spec.channels as u64);

                if frame_tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, stopping file playback");
                    return;
                }

                if realtime {
                    tokio::time::sleep(std::time::Duration::from_millis(buffer_ms)).await;
                }
            }

            debug!("Audio file fully streamed");
        });
        self.task = Some(task);

        Ok(SourceStream {
            frames: frame_rx,
            events: event_rx,
        })
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("File source stopped");
        }
        Ok(())
    }

    fn authorization(&self) -> MicAuthorization {
        // File playback needs no microphone permission
        MicAuthorization::Granted
    }

    async fn request_authorization(&mut self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "wav-file"
    }
}
