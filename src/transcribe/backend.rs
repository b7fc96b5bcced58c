use std::path::Path;

use async_trait::async_trait;

use crate::error::BackendError;

/// A transcription capability: segment audio in, transcript text out
///
/// Implementations must be safe to call concurrently; the coordinator
/// runs one call per segment but drains several segments at once.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, BackendError>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
