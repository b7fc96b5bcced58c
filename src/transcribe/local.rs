use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::FallbackConfig;
use crate::error::BackendError;

use super::backend::TranscriptionBackend;

/// On-device recognizer driven as a subprocess
///
/// Invokes the configured program with its arguments plus the audio path
/// and takes stdout as the transcript. No network involved; this is the
/// last resort once the remote backend is exhausted.
pub struct LocalBackend {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl LocalBackend {
    pub fn new(config: &FallbackConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for LocalBackend {
    async fn transcribe(&self, audio: &Path) -> Result<String, BackendError> {
        debug!(
            "Running local recognizer: {} {}",
            self.program,
            audio.display()
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(audio)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| {
                BackendError::Recognizer(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| BackendError::Recognizer(format!("{} failed to run: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::Recognizer(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let transcript = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if transcript.is_empty() {
            return Err(BackendError::Recognizer(format!(
                "{} produced no transcript",
                self.program
            )));
        }

        debug!("Local recognizer produced {} chars", transcript.len());
        Ok(transcript)
    }

    fn name(&self) -> &str {
        "local"
    }
}
