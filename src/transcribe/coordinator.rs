use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::RetryConfig;
use crate::connectivity::ConnectivityMonitor;
use crate::ledger::RetryLedger;
use crate::persist::{SegmentStatus, TranscriptStore};
use crate::segment::SegmentStore;

use super::backend::TranscriptionBackend;

/// Sentinel transcript recorded when both backends are exhausted
pub const UNAVAILABLE_TRANSCRIPT: &str = "[transcription unavailable]";

/// Drives each finalized segment from audio file to persisted transcript
///
/// One `process` call owns the full lifecycle of a single attempt round:
/// remote transcription with exponential backoff, fallback to the local
/// recognizer after the remote attempt budget is spent, and ledger
/// bookkeeping so unfinished segments survive a restart. Segments are
/// processed independently and concurrently; per-path exclusion comes
/// from the in-flight set, and the transcript store's duplicate gate
/// makes replays harmless.
pub struct TranscriptionCoordinator {
    remote: Arc<dyn TranscriptionBackend>,
    local: Arc<dyn TranscriptionBackend>,
    store: Arc<dyn TranscriptStore>,
    segments: Arc<SegmentStore>,
    ledger: Arc<RetryLedger>,
    connectivity: ConnectivityMonitor,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
    max_remote_attempts: u32,
    backoff_base: Duration,
}

impl TranscriptionCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        remote: Arc<dyn TranscriptionBackend>,
        local: Arc<dyn TranscriptionBackend>,
        store: Arc<dyn TranscriptStore>,
        segments: Arc<SegmentStore>,
        ledger: Arc<RetryLedger>,
        connectivity: ConnectivityMonitor,
        retry: &RetryConfig,
    ) -> Self {
        Self {
            remote,
            local,
            store,
            segments,
            ledger,
            connectivity,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            max_remote_attempts: retry.max_remote_attempts,
            backoff_base: retry.backoff_base(),
        }
    }

    /// Run one attempt round for a segment
    ///
    /// Safe to call again for the same path at any time: an existing
    /// transcript short-circuits, and a concurrent round for the same
    /// path turns this call into a no-op.
    pub async fn process(self: Arc<Self>, path: PathBuf) {
        if self.store.transcript_exists(&path).await {
            debug!("Transcript already attached, skipping: {}", path.display());
            self.clear_ledger(&path).await;
            return;
        }

        let Some(_guard) = self.begin(&path) else {
            debug!("Transcription already in flight: {}", path.display());
            return;
        };

        // A segment that vanished or never got audio has nothing to
        // transcribe; resolve it instead of burning attempts.
        if !self.segments.has_audio(&path) {
            warn!(
                "Segment missing or empty, marking failed: {}",
                path.display()
            );
            self.finish_failed(&path).await;
            return;
        }

        if !self.connectivity.is_online() {
            info!("Offline, parking segment for retry: {}", path.display());
            if let Err(e) = self.ledger.record(&path, 0).await {
                error!("Failed to persist retry ledger: {:#}", e);
            }
            return;
        }

        // A restart can resurface a segment whose remote budget was
        // already spent; it goes straight to the recognizer.
        let prior_attempts = self.ledger.attempts(&path).await.unwrap_or(0);
        if prior_attempts >= self.max_remote_attempts {
            self.run_local(&path).await;
            return;
        }

        match self.remote.transcribe(&path).await {
            Ok(text) => {
                info!("Remote transcription succeeded: {}", path.display());
                self.attach(&path, &text, SegmentStatus::Success).await;
            }
            Err(e) => {
                warn!(
                    "Remote transcription failed for {}: {}",
                    path.display(),
                    e
                );
                let attempts = match self.ledger.increment(&path).await {
                    Ok(n) => n,
                    Err(err) => {
                        error!("Failed to persist retry ledger: {:#}", err);
                        return;
                    }
                };

                if attempts >= self.max_remote_attempts {
                    self.run_local(&path).await;
                } else {
                    Self::schedule_retry(Arc::clone(&self), path.clone(), attempts);
                }
            }
        }
    }

    /// Watch connectivity and drain the ledger on every offline-to-online
    /// transition, plus once at startup if already online
    pub fn spawn_drain_task(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.connectivity.subscribe();
        tokio::spawn(async move {
            let mut online = *rx.borrow_and_update();
            if online {
                Self::drain(&self).await;
            }

            loop {
                if rx.changed().await.is_err() {
                    debug!("Connectivity channel closed, drain task exiting");
                    break;
                }
                let now_online = *rx.borrow_and_update();
                if now_online && !online {
                    Self::drain(&self).await;
                }
                online = now_online;
            }
        })
    }

    /// Re-submit every pending ledger entry, concurrently
    async fn drain(this: &Arc<Self>) {
        let pending = this.ledger.snapshot().await;
        if pending.is_empty() {
            return;
        }

        info!("Draining retry ledger: {} pending segments", pending.len());
        let rounds = pending
            .into_iter()
            .map(|(path, _)| Arc::clone(this).process(path));
        futures::future::join_all(rounds).await;
    }

    fn schedule_retry(this: Arc<Self>, path: PathBuf, attempts: u32) {
        let delay = this.backoff_delay(attempts);
        info!(
            "Scheduling retry {}/{} for {} in {:?}",
            attempts + 1,
            this.max_remote_attempts,
            path.display(),
            delay
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.process(path).await;
        });
    }

    fn backoff_delay(&self, attempts: u32) -> Duration {
        backoff_delay(self.backoff_base, attempts)
    }

    async fn run_local(&self, path: &Path) {
        info!(
            "Remote attempts exhausted, falling back to {}: {}",
            self.local.name(),
            path.display()
        );
        match self.local.transcribe(path).await {
            Ok(text) => {
                self.attach(path, &text, SegmentStatus::Fallback).await;
            }
            Err(e) => {
                error!(
                    "Local transcription failed for {}: {}",
                    path.display(),
                    e
                );
                self.finish_failed(path).await;
            }
        }
    }

    async fn attach(&self, path: &Path, text: &str, status: SegmentStatus) {
        if !self.store.attach_transcript(path, text, status).await {
            debug!("Transcript insert suppressed: {}", path.display());
        }
        self.clear_ledger(path).await;
    }

    async fn finish_failed(&self, path: &Path) {
        self.attach(path, UNAVAILABLE_TRANSCRIPT, SegmentStatus::Failed)
            .await;
    }

    async fn clear_ledger(&self, path: &Path) {
        if let Err(e) = self.ledger.remove(path).await {
            warn!(
                "Failed to clear ledger entry for {}: {:#}",
                path.display(),
                e
            );
        }
    }

    /// Claim a path for exclusive processing; None if another round owns it
    fn begin(&self, path: &Path) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().expect("in-flight set poisoned");
        if in_flight.insert(path.to_path_buf()) {
            Some(InFlightGuard {
                set: Arc::clone(&self.in_flight),
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }
}

/// Delay before retry N+1: base doubled per attempt already consumed
fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    base * 2u32.saturating_pow(attempts)
}

/// Releases the in-flight claim when an attempt round ends, however it ends
struct InFlightGuard {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .lock()
            .expect("in-flight set poisoned")
            .remove(&self.path);
    }
}
