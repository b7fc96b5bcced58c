// Shared test doubles and fixtures
//
// ScriptedSource stands in for the platform audio source; tests feed
// frames and events through its SourceFeed handle. ScriptedBackend and
// GatedBackend stand in for the transcription backends with
// predetermined outcomes.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use segscribe::audio::{
    AudioFrame, AudioSource, MicAuthorization, QualityPreset, SourceEvent, SourceStream,
};
use segscribe::config::RetryConfig;
use segscribe::error::BackendError;
use segscribe::persist::{MemoryStore, SegmentStatus, TranscriptStore};
use segscribe::transcribe::{TranscriptionBackend, TranscriptionCoordinator};
use segscribe::{ConnectivityMonitor, RetryLedger, SegmentRecorder, SegmentStore};
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

/// Poll a condition until it holds or a 5 second deadline passes
#[macro_export]
macro_rules! eventually {
    ($what:expr, $cond:expr) => {{
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
        loop {
            if $cond {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {}",
                $what
            );
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }};
}

/// Feeds frames and events into a started ScriptedSource
pub struct SourceFeed {
    frames: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    events: Mutex<Option<mpsc::Sender<SourceEvent>>>,
    clock_ms: AtomicU64,
    started: AtomicUsize,
    stopped: AtomicUsize,
}

impl SourceFeed {
    fn new() -> Self {
        Self {
            frames: Mutex::new(None),
            events: Mutex::new(None),
            clock_ms: AtomicU64::new(0),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    /// Push one 16 kHz mono frame with the given samples
    pub async fn frame(&self, samples: Vec<i16>) {
        let timestamp_ms = self.clock_ms.fetch_add(100, Ordering::SeqCst);
        let tx = self.frames.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(AudioFrame {
                    samples,
                    sample_rate: 16_000,
                    channels: 1,
                    timestamp_ms,
                })
                .await;
        }
    }

    pub async fn event(&self, event: SourceEvent) {
        let tx = self.events.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Drop both channel senders, ending the capture stream
    pub fn end_stream(&self) {
        *self.frames.lock().unwrap() = None;
        *self.events.lock().unwrap() = None;
    }

    pub fn times_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn times_stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Audio source double driven by the test through a SourceFeed
pub struct ScriptedSource {
    authorization: MicAuthorization,
    grant_on_request: bool,
    feed: Arc<SourceFeed>,
}

impl ScriptedSource {
    pub fn granted() -> (Box<dyn AudioSource>, Arc<SourceFeed>) {
        Self::with_authorization(MicAuthorization::Granted, false)
    }

    pub fn with_authorization(
        authorization: MicAuthorization,
        grant_on_request: bool,
    ) -> (Box<dyn AudioSource>, Arc<SourceFeed>) {
        let feed = Arc::new(SourceFeed::new());
        let source = Box::new(Self {
            authorization,
            grant_on_request,
            feed: Arc::clone(&feed),
        });
        (source, feed)
    }
}

#[async_trait]
impl AudioSource for ScriptedSource {
    async fn start(&mut self) -> Result<SourceStream> {
        let (frame_tx, frames) = mpsc::channel(64);
        let (event_tx, events) = mpsc::channel(8);
        *self.feed.frames.lock().unwrap() = Some(frame_tx);
        *self.feed.events.lock().unwrap() = Some(event_tx);
        self.feed.started.fetch_add(1, Ordering::SeqCst);
        Ok(SourceStream { frames, events })
    }

    async fn stop(&mut self) -> Result<()> {
        self.feed.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn authorization(&self) -> MicAuthorization {
        self.authorization
    }

    async fn request_authorization(&mut self) -> bool {
        if self.grant_on_request {
            self.authorization = MicAuthorization::Granted;
        }
        self.grant_on_request
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Transcription backend returning scripted outcomes
///
/// The first `fail_first` calls return a request error; later calls
/// succeed with the configured text. A `failing` backend never succeeds.
pub struct ScriptedBackend {
    label: &'static str,
    text: String,
    fail_first: usize,
    always_fail: bool,
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedBackend {
    pub fn ok(label: &'static str, text: &str) -> Arc<Self> {
        Self::build(label, text, 0, false)
    }

    pub fn failing(label: &'static str) -> Arc<Self> {
        Self::build(label, "", 0, true)
    }

    pub fn fail_then_ok(label: &'static str, failures: usize, text: &str) -> Arc<Self> {
        Self::build(label, text, failures, false)
    }

    fn build(label: &'static str, text: &str, fail_first: usize, always_fail: bool) -> Arc<Self> {
        Arc::new(Self {
            label,
            text: text.to_string(),
            fail_first,
            always_fail,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Paths passed to transcribe, in call order
    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptionBackend for ScriptedBackend {
    async fn transcribe(&self, audio: &Path) -> Result<String, BackendError> {
        self.seen.lock().unwrap().push(audio.to_path_buf());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.always_fail || call < self.fail_first {
            Err(BackendError::Request("scripted failure".to_string()))
        } else {
            Ok(self.text.clone())
        }
    }

    fn name(&self) -> &str {
        self.label
    }
}

/// Backend that blocks inside transcribe until the test releases it
pub struct GatedBackend {
    entered: Semaphore,
    gate: Semaphore,
    calls: AtomicUsize,
    text: String,
}

impl GatedBackend {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            entered: Semaphore::new(0),
            gate: Semaphore::new(0),
            calls: AtomicUsize::new(0),
            text: text.to_string(),
        })
    }

    /// Wait until a transcribe call is blocked inside the backend
    pub async fn wait_for_entry(&self) {
        self.entered.acquire().await.unwrap().forget();
    }

    pub fn release(&self) {
        self.gate.add_permits(1);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptionBackend for GatedBackend {
    async fn transcribe(&self, _audio: &Path) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.add_permits(1);
        self.gate.acquire().await.unwrap().forget();
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Everything a pipeline test needs, wired the way the daemon wires it
pub struct TestRig {
    pub temp: TempDir,
    pub store: Arc<MemoryStore>,
    pub segments: Arc<SegmentStore>,
    pub ledger: Arc<RetryLedger>,
    pub connectivity: ConnectivityMonitor,
    pub coordinator: Arc<TranscriptionCoordinator>,
}

/// Fast-retry config pointing into the given directory
pub fn test_retry_config(dir: &Path) -> RetryConfig {
    RetryConfig {
        max_remote_attempts: 5,
        backoff_base_ms: 5,
        ledger_path: dir.join("retry-ledger.json"),
    }
}

pub fn rig(
    remote: Arc<dyn TranscriptionBackend>,
    local: Arc<dyn TranscriptionBackend>,
    online: bool,
) -> TestRig {
    rig_with_space(remote, local, online, 0)
}

pub fn rig_with_space(
    remote: Arc<dyn TranscriptionBackend>,
    local: Arc<dyn TranscriptionBackend>,
    online: bool,
    min_free_mb: u64,
) -> TestRig {
    let temp = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let segments =
        Arc::new(SegmentStore::new(temp.path().join("segments"), min_free_mb).unwrap());
    let retry = test_retry_config(temp.path());
    let ledger = Arc::new(RetryLedger::load(retry.ledger_path.clone()).unwrap());
    let connectivity = ConnectivityMonitor::new(online);

    let coordinator = Arc::new(TranscriptionCoordinator::new(
        remote,
        local,
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        Arc::clone(&segments),
        Arc::clone(&ledger),
        connectivity.clone(),
        &retry,
    ));

    TestRig {
        temp,
        store,
        segments,
        ledger,
        connectivity,
        coordinator,
    }
}

/// Recorder wired to the rig, capturing at the 16 kHz preset
pub fn recorder(
    rig: &TestRig,
    source: Box<dyn AudioSource>,
    segment_duration: std::time::Duration,
) -> SegmentRecorder {
    SegmentRecorder::new(
        source,
        QualityPreset::Medium,
        segment_duration,
        Arc::clone(&rig.segments),
        Arc::clone(&rig.coordinator),
        Arc::clone(&rig.store) as Arc<dyn TranscriptStore>,
    )
}

/// Write a 16 kHz mono 16-bit WAV with the given samples
pub fn write_wav(path: &Path, samples: &[i16]) {
    let mut writer = hound::WavWriter::create(path, QualityPreset::Medium.wav_spec()).unwrap();
    for sample in samples {
        writer.write_sample(*sample).unwrap();
    }
    writer.finalize().unwrap();
}

/// Write a finalized WAV holding nothing but its header
pub fn write_empty_wav(path: &Path) {
    let writer = hound::WavWriter::create(path, QualityPreset::Medium.wav_spec()).unwrap();
    writer.finalize().unwrap();
}

/// Create a WAV in the rig's temp dir and register it as a pending
/// segment of a fresh session
pub async fn seed_segment(rig: &TestRig, name: &str, samples: &[i16]) -> (Uuid, PathBuf) {
    let path = rig.temp.path().join(name);
    write_wav(&path, samples);
    let session = register_pending(&rig.store, &path).await;
    (session, path)
}

/// Insert a session plus a pending segment row for an existing path
pub async fn register_pending(store: &Arc<MemoryStore>, path: &Path) -> Uuid {
    let session = Uuid::new_v4();
    store.insert_session(session, Utc::now()).await;
    store
        .insert_segment(session, path, Utc::now(), SegmentStatus::Pending)
        .await;
    session
}
