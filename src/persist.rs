use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Transcription lifecycle status of a segment
///
/// `Pending` is the only non-terminal status. Terminal statuses never
/// change again; the store enforces that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    /// Recorded, transcription not yet resolved
    Pending,
    /// Remote transcription succeeded
    Success,
    /// Local recognizer produced the transcript after remote gave up
    Fallback,
    /// Both paths exhausted, sentinel transcript attached
    Failed,
}

impl SegmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SegmentStatus::Pending)
    }
}

/// An attached transcript
///
/// Created the moment a backend (or the failure sentinel) resolves a
/// segment and never mutated afterwards. At most one exists per
/// segment path.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptRecord {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One recorded segment as persisted
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    pub id: Uuid,
    pub path: PathBuf,
    pub captured_at: DateTime<Utc>,
    pub status: SegmentStatus,
    pub transcript: Option<TranscriptRecord>,
}

impl SegmentRecord {
    pub fn transcript_text(&self) -> Option<&str> {
        self.transcript.as_ref().map(|t| t.text.as_str())
    }
}

/// A recording session with its segments in capture order
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub segments: Vec<SegmentRecord>,
}

/// Condensed session row for history listings
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub segment_count: usize,
    pub transcribed_count: usize,
}

/// Persistence boundary for sessions, segments, and transcripts
///
/// Segments are keyed by their audio file path. `attach_transcript` is
/// the exactly-once gate: the first caller wins, later calls for the
/// same path are reported back as suppressed duplicates.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn insert_session(&self, id: Uuid, started_at: DateTime<Utc>);

    /// Mark a session as ended; harmless if already ended
    async fn end_session(&self, id: Uuid, ended_at: DateTime<Utc>);

    async fn insert_segment(
        &self,
        session: Uuid,
        path: &Path,
        captured_at: DateTime<Utc>,
        status: SegmentStatus,
    );

    /// Attach a transcript and move the segment to a terminal status
    ///
    /// Returns false without changing anything when the segment is
    /// unknown or already terminal.
    async fn attach_transcript(&self, path: &Path, text: &str, status: SegmentStatus) -> bool;

    /// Transition a segment's status; terminal statuses are frozen
    ///
    /// Returns whether the transition was applied.
    async fn update_status(&self, path: &Path, status: SegmentStatus) -> bool;

    /// Whether a transcript has already been attached for this path
    async fn transcript_exists(&self, path: &Path) -> bool;

    /// Session summaries, newest first
    async fn query_sessions(&self, offset: usize, limit: usize) -> Vec<SessionSummary>;

    async fn session(&self, id: Uuid) -> Option<SessionRecord>;
}

/// In-process transcript store backing the daemon and tests
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    sessions: HashMap<Uuid, SessionRecord>,
    /// Audio path to owning session, for O(1) segment lookup
    segment_index: HashMap<PathBuf, Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StoreInner {
    fn segment_mut(&mut self, path: &Path) -> Option<&mut SegmentRecord> {
        let session_id = self.segment_index.get(path)?;
        self.sessions
            .get_mut(session_id)?
            .segments
            .iter_mut()
            .find(|s| s.path == path)
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn insert_session(&self, id: Uuid, started_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        inner.sessions.entry(id).or_insert(SessionRecord {
            id,
            started_at,
            ended_at: None,
            segments: Vec::new(),
        });
    }

    async fn end_session(&self, id: Uuid, ended_at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(&id) {
            Some(session) if session.ended_at.is_none() => session.ended_at = Some(ended_at),
            Some(_) => {}
            None => warn!("Cannot end unknown session: {}", id),
        }
    }

    async fn insert_segment(
        &self,
        session: Uuid,
        path: &Path,
        captured_at: DateTime<Utc>,
        status: SegmentStatus,
    ) {
        let mut inner = self.inner.write().await;

        if inner.segment_index.contains_key(path) {
            warn!("Segment already registered: {}", path.display());
            return;
        }

        match inner.sessions.get_mut(&session) {
            Some(record) => {
                record.segments.push(SegmentRecord {
                    id: Uuid::new_v4(),
                    path: path.to_path_buf(),
                    captured_at,
                    status,
                    transcript: None,
                });
                inner.segment_index.insert(path.to_path_buf(), session);
            }
            None => warn!(
                "Cannot register segment for unknown session {}: {}",
                session,
                path.display()
            ),
        }
    }

    async fn attach_transcript(&self, path: &Path, text: &str, status: SegmentStatus) -> bool {
        let mut inner = self.inner.write().await;
        let Some(segment) = inner.segment_mut(path) else {
            warn!("Transcript for unknown segment: {}", path.display());
            return false;
        };

        if segment.status.is_terminal() {
            debug!("Duplicate transcript suppressed: {}", path.display());
            return false;
        }

        segment.transcript = Some(TranscriptRecord {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: Utc::now(),
        });
        segment.status = status;
        true
    }

    async fn update_status(&self, path: &Path, status: SegmentStatus) -> bool {
        let mut inner = self.inner.write().await;
        let Some(segment) = inner.segment_mut(path) else {
            warn!("Status update for unknown segment: {}", path.display());
            return false;
        };

        if segment.status.is_terminal() {
            debug!(
                "Ignoring status change on terminal segment {}: {:?} -> {:?}",
                path.display(),
                segment.status,
                status
            );
            return false;
        }

        segment.status = status;
        true
    }

    async fn transcript_exists(&self, path: &Path) -> bool {
        let inner = self.inner.read().await;
        let Some(session_id) = inner.segment_index.get(path) else {
            return false;
        };
        inner
            .sessions
            .get(session_id)
            .and_then(|s| s.segments.iter().find(|seg| seg.path == path))
            .map(|seg| seg.transcript.is_some())
            .unwrap_or(false)
    }

    async fn query_sessions(&self, offset: usize, limit: usize) -> Vec<SessionSummary> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<SessionSummary> = inner
            .sessions
            .values()
            .map(|s| SessionSummary {
                id: s.id,
                started_at: s.started_at,
                ended_at: s.ended_at,
                segment_count: s.segments.len(),
                transcribed_count: s
                    .segments
                    .iter()
                    .filter(|seg| seg.transcript.is_some())
                    .count(),
            })
            .collect();

        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.into_iter().skip(offset).take(limit).collect()
    }

    async fn session(&self, id: Uuid) -> Option<SessionRecord> {
        self.inner.read().await.sessions.get(&id).cloned()
    }
}
