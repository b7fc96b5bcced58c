/// Normalized input loudness derived from raw capture frames
///
/// Tracks the RMS level of the most recent frame, scaled to 0.0..=1.0.
/// Consumers poll `level()` for UI-style display; the value is purely
/// informational and never gates recording behavior.
#[derive(Debug, Default)]
pub struct VolumeMeter {
    last_level: f32,
}

impl VolumeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a frame of samples into the meter and return the new level
    ///
    /// An empty frame carries no information and leaves the level unchanged.
    pub fn update(&mut self, samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return self.last_level;
        }

        let sum_squares: f64 = samples
            .iter()
            .map(|&s| {
                let normalized = s as f64 / i16::MAX as f64;
                normalized * normalized
            })
            .sum();
        let rms = (sum_squares / samples.len() as f64).sqrt() as f32;

        self.last_level = rms.clamp(0.0, 1.0);
        self.last_level
    }

    /// Most recently computed level, 0.0 (silence) to 1.0 (full scale)
    pub fn level(&self) -> f32 {
        self.last_level
    }

    /// Drop back to silence, e.g. when recording stops
    pub fn reset(&mut self) {
        self.last_level = 0.0;
    }
}
