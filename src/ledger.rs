use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Durable record of segments still awaiting transcription
///
/// Maps each pending audio path to the number of remote attempts already
/// consumed. Every mutation is flushed to disk before the lock is
/// released, so a crash never loses more than the in-flight operation.
/// The file is a JSON object of `path: attempts` pairs, replaced
/// atomically via a temp-file rename.
pub struct RetryLedger {
    inner: Mutex<LedgerInner>,
}

struct LedgerInner {
    path: PathBuf,
    entries: HashMap<PathBuf, u32>,
}

impl RetryLedger {
    /// Load the ledger from disk, or start empty if the file is absent
    ///
    /// Entries whose audio file no longer exists are dropped on load;
    /// there is nothing left to transcribe for them.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut entries: HashMap<PathBuf, u32> = HashMap::new();

        if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read retry ledger: {}", path.display()))?;
            match serde_json::from_str::<HashMap<PathBuf, u32>>(&raw) {
                Ok(parsed) => {
                    let total = parsed.len();
                    entries = parsed
                        .into_iter()
                        .filter(|(audio, _)| audio.exists())
                        .collect();
                    let dropped = total - entries.len();
                    if dropped > 0 {
                        debug!(
                            "Dropped {} ledger entries with missing audio files",
                            dropped
                        );
                    }
                    info!(
                        "Retry ledger loaded: {} pending segments ({})",
                        entries.len(),
                        path.display()
                    );
                }
                Err(e) => {
                    warn!(
                        "Retry ledger at {} is unreadable, starting empty: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(Self {
            inner: Mutex::new(LedgerInner { path, entries }),
        })
    }

    /// Record a pending segment with an explicit attempt count
    ///
    /// Keeps an existing (higher) count if the path is already present.
    pub async fn record(&self, audio: &Path, attempts: u32) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let current = inner.entries.entry(audio.to_path_buf()).or_insert(attempts);
        if *current < attempts {
            *current = attempts;
        }
        inner.persist()
    }

    /// Bump the attempt count for a segment and return the new total
    pub async fn increment(&self, audio: &Path) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        let count = inner.entries.entry(audio.to_path_buf()).or_insert(0);
        *count += 1;
        let count = *count;
        inner.persist()?;
        Ok(count)
    }

    /// Current attempt count for a segment, if it is pending
    pub async fn attempts(&self, audio: &Path) -> Option<u32> {
        self.inner.lock().await.entries.get(audio).copied()
    }

    /// Drop a segment from the ledger once it reaches a terminal status
    pub async fn remove(&self, audio: &Path) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.entries.remove(audio).is_some() {
            inner.persist()?;
        }
        Ok(())
    }

    /// All pending segments with their attempt counts
    pub async fn snapshot(&self) -> Vec<(PathBuf, u32)> {
        let inner = self.inner.lock().await;
        inner
            .entries
            .iter()
            .map(|(p, &a)| (p.clone(), a))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }
}

impl LedgerInner {
    /// Flush the current entries to disk, called with the lock held
    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger directory: {:?}", parent))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .context("Failed to serialize retry ledger")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)
            .with_context(|| format!("Failed to write retry ledger: {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace retry ledger: {}", self.path.display()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::write(path, b"RIFF").unwrap();
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = RetryLedger::load(tmp.path().join("ledger.json")).unwrap();
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn entries_survive_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger_path = tmp.path().join("ledger.json");
        let audio = tmp.path().join("seg.wav");
        touch(&audio);

        let ledger = RetryLedger::load(&ledger_path).unwrap();
        ledger.record(&audio, 2).await.unwrap();

        let reloaded = RetryLedger::load(&ledger_path).unwrap();
        assert_eq!(reloaded.attempts(&audio).await, Some(2));
        assert_eq!(reloaded.len().await, 1);
    }

    #[tokio::test]
    async fn load_drops_entries_for_missing_audio() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger_path = tmp.path().join("ledger.json");
        let kept = tmp.path().join("kept.wav");
        touch(&kept);
        let gone = tmp.path().join("gone.wav");

        let mut entries = HashMap::new();
        entries.insert(kept.clone(), 2u32);
        entries.insert(gone.clone(), 4u32);
        fs::write(&ledger_path, serde_json::to_string(&entries).unwrap()).unwrap();

        let ledger = RetryLedger::load(&ledger_path).unwrap();
        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.attempts(&kept).await, Some(2));
        assert_eq!(ledger.attempts(&gone).await, None);
    }

    #[tokio::test]
    async fn corrupt_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger_path = tmp.path().join("ledger.json");
        fs::write(&ledger_path, "not json {").unwrap();

        let ledger = RetryLedger::load(&ledger_path).unwrap();
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn increment_counts_up_from_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = RetryLedger::load(tmp.path().join("ledger.json")).unwrap();
        let audio = tmp.path().join("seg.wav");
        touch(&audio);

        assert_eq!(ledger.increment(&audio).await.unwrap(), 1);
        assert_eq!(ledger.increment(&audio).await.unwrap(), 2);
        assert_eq!(ledger.increment(&audio).await.unwrap(), 3);
        assert_eq!(ledger.attempts(&audio).await, Some(3));
    }

    #[tokio::test]
    async fn record_keeps_higher_existing_count() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = RetryLedger::load(tmp.path().join("ledger.json")).unwrap();
        let audio = tmp.path().join("seg.wav");
        touch(&audio);

        ledger.record(&audio, 3).await.unwrap();
        ledger.record(&audio, 0).await.unwrap();
        assert_eq!(ledger.attempts(&audio).await, Some(3));
    }

    #[tokio::test]
    async fn remove_is_persisted() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger_path = tmp.path().join("ledger.json");
        let audio = tmp.path().join("seg.wav");
        touch(&audio);

        let ledger = RetryLedger::load(&ledger_path).unwrap();
        ledger.record(&audio, 1).await.unwrap();
        ledger.remove(&audio).await.unwrap();

        let reloaded = RetryLedger::load(&ledger_path).unwrap();
        assert!(reloaded.is_empty().await);
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger_path = tmp.path().join("ledger.json");
        let audio = tmp.path().join("seg.wav");
        touch(&audio);

        let ledger = RetryLedger::load(&ledger_path).unwrap();
        ledger.record(&audio, 0).await.unwrap();

        assert!(ledger_path.exists());
        assert!(!ledger_path.with_extension("tmp").exists());
    }
}
