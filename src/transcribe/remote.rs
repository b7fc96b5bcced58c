use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::BackendError;

use super::backend::TranscriptionBackend;

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// HTTP transcription backend
///
/// Uploads the segment as a multipart form (`file` + `model`) and expects
/// a 200 response with a JSON `text` field. The bearer token is read from
/// the environment variable named in config at request time and is never
/// written to logs.
pub struct RemoteBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key_env: String,
}

impl RemoteBackend {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = config.base_url.trim().trim_end_matches('/');
        let url = format!("{}/audio/transcriptions", base_url);

        Ok(Self {
            client,
            url,
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionBackend for RemoteBackend {
    async fn transcribe(&self, audio: &Path) -> Result<String, BackendError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| BackendError::Request(format!("failed to read segment audio: {e}")))?;

        let file_name = audio
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment.wav".to_string());
        let file_part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| BackendError::Request(format!("failed to build audio part: {e}")))?;

        let form = Form::new()
            .part("file", file_part)
            .text("model", self.model.clone());

        debug!("Sending transcription request to: {}", self.url);
        let mut request = self.client.post(&self.url).multipart(form);
        if let Ok(api_key) = std::env::var(&self.api_key_env) {
            if !api_key.trim().is_empty() {
                request = request.bearer_auth(api_key.trim());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))?;

        debug!("Received transcript: {} chars", body.text.len());
        Ok(body.text)
    }

    fn name(&self) -> &str {
        "remote"
    }
}
