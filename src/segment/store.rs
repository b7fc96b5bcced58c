use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PipelineError;

/// Byte length of a WAV header with no audio data behind it
const WAV_HEADER_LEN: u64 = 44;

/// Scratch-directory manager for segment audio files
///
/// Owns path allocation, the disk-space preflight, and the
/// missing/empty classification the coordinator relies on. Allocated
/// paths are remembered for the process lifetime so two segments can
/// never be handed the same file.
pub struct SegmentStore {
    scratch_dir: PathBuf,
    min_free_mb: u64,
    allocated: Mutex<HashSet<PathBuf>>,
}

impl SegmentStore {
    pub fn new(scratch_dir: impl Into<PathBuf>, min_free_mb: u64) -> Result<Self, PipelineError> {
        let scratch_dir = scratch_dir.into();
        fs::create_dir_all(&scratch_dir)?;

        info!(
            "Segment store initialized: {} (min free: {} MB)",
            scratch_dir.display(),
            min_free_mb
        );

        Ok(Self {
            scratch_dir,
            min_free_mb,
            allocated: Mutex::new(HashSet::new()),
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Reserve a fresh on-disk path for the next segment of a session
    ///
    /// Paths embed a UTC timestamp plus a random suffix and are checked
    /// against everything allocated so far, so a path is never reused even
    /// across rapid rotations within the same second.
    pub fn allocate(&self, session_id: &Uuid) -> Result<PathBuf, PipelineError> {
        let session_dir = self.scratch_dir.join(session_id.to_string());
        fs::create_dir_all(&session_dir)?;

        let mut allocated = self.allocated.lock().expect("allocation set poisoned");
        loop {
            let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
            let nonce = Uuid::new_v4().simple().to_string();
            let path = session_dir.join(format!("seg-{stamp}-{}.wav", &nonce[..8]));

            if allocated.insert(path.clone()) && !path.exists() {
                debug!("Allocated segment path: {}", path.display());
                return Ok(path);
            }
        }
    }

    /// Verify the scratch volume has room for more audio
    pub fn has_sufficient_space(&self) -> Result<(), PipelineError> {
        let available = fs4::available_space(&self.scratch_dir)?;
        let available_mb = available / (1024 * 1024);

        if available_mb < self.min_free_mb {
            return Err(PipelineError::InsufficientStorage {
                available_mb,
                required_mb: self.min_free_mb,
            });
        }

        Ok(())
    }

    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// True when the file exists and holds audio beyond the WAV header
    ///
    /// A finalized zero-frame segment is a bare header; the coordinator
    /// short-circuits those instead of sending them to a backend.
    pub fn has_audio(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| m.len() > WAV_HEADER_LEN)
            .unwrap_or(false)
    }
}
