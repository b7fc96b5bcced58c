use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::audio::{AudioFrame, QualityPreset};
use crate::error::PipelineError;

/// Metadata for a single recorded segment
#[derive(Debug, Clone)]
pub struct SegmentMeta {
    pub session_id: Uuid,
    /// File path of the segment audio
    pub path: PathBuf,
    /// Wall-clock time the segment was opened
    pub started_at: DateTime<Utc>,
    /// Sample rate the file was written at
    pub sample_rate: u32,
    /// Number of samples written
    pub sample_count: usize,
    /// Audio duration derived from the sample count, filled on finish
    pub duration_ms: u64,
}

/// Append-only WAV writer for one open segment
///
/// The WAV spec comes from the quality preset, independent of what the
/// source delivers. Finalization rewrites the header with the real data
/// length; an unfinalized file is truncated at the header, which the
/// rest of the pipeline treats as a zero-audio segment.
pub struct SegmentWriter {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    meta: SegmentMeta,
    bits_per_sample: u16,
}

impl SegmentWriter {
    pub fn create(
        path: PathBuf,
        session_id: Uuid,
        preset: QualityPreset,
    ) -> Result<Self, PipelineError> {
        let spec = preset.wav_spec();
        let writer =
            hound::WavWriter::create(&path, spec).map_err(|e| PipelineError::SegmentWrite {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            writer: Some(writer),
            meta: SegmentMeta {
                session_id,
                path,
                started_at: Utc::now(),
                sample_rate: spec.sample_rate,
                sample_count: 0,
                duration_ms: 0,
            },
            bits_per_sample: spec.bits_per_sample,
        })
    }

    pub fn path(&self) -> &Path {
        &self.meta.path
    }

    pub fn sample_count(&self) -> usize {
        self.meta.sample_count
    }

    /// Append a frame of samples to the open segment
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), PipelineError> {
        let path = self.meta.path.clone();
        if let Some(writer) = &mut self.writer {
            if self.bits_per_sample == 8 {
                for &sample in &frame.samples {
                    // Low preset stores 8-bit audio; drop the low byte
                    writer
                        .write_sample((sample >> 8) as i8)
                        .map_err(|e| PipelineError::SegmentWrite {
                            path: path.clone(),
                            reason: e.to_string(),
                        })?;
                }
            } else {
                for &sample in &frame.samples {
                    writer
                        .write_sample(sample)
                        .map_err(|e| PipelineError::SegmentWrite {
                            path: path.clone(),
                            reason: e.to_string(),
                        })?;
                }
            }

            self.meta.sample_count += frame.samples.len();
        }

        Ok(())
    }

    /// Finalize the WAV file and hand back the segment metadata
    pub fn finish(mut self) -> Result<SegmentMeta, PipelineError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(|e| PipelineError::SegmentWrite {
                path: self.meta.path.clone(),
                reason: e.to_string(),
            })?;
        }

        self.meta.duration_ms =
            self.meta.sample_count as u64 * 1000 / self.meta.sample_rate as u64;
        Ok(self.meta.clone())
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
