use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::{
    AudioFrame, AudioSource, MicAuthorization, QualityPreset, SourceEvent, SourceStream,
    VolumeMeter,
};
use crate::error::PipelineError;
use crate::persist::{SegmentStatus, TranscriptStore};
use crate::segment::{SegmentStore, SegmentWriter};
use crate::transcribe::TranscriptionCoordinator;

use super::state::RecorderState;

/// Control messages for the capture task, each acknowledged once applied
enum Command {
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// Handle to a running capture task
///
/// The capture task owns the audio source while it runs and hands it
/// back through its join handle, so the recorder can be restarted.
struct ActiveHandle {
    session_id: Uuid,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Box<dyn AudioSource>>,
}

/// Orchestrates the audio capture loop and fixed-duration segment rotation
///
/// One session at a time. Frames stream from the audio source into the
/// open segment writer; a wall-clock interval rotates segments, handing
/// each finalized file to the transcription coordinator without ever
/// blocking the capture path. State and input volume are published on
/// watch channels for the control surface.
pub struct SegmentRecorder {
    preset: QualityPreset,
    segment_duration: Duration,
    source: Mutex<Option<Box<dyn AudioSource>>>,
    segments: Arc<SegmentStore>,
    coordinator: Arc<TranscriptionCoordinator>,
    store: Arc<dyn TranscriptStore>,
    state_tx: Arc<watch::Sender<RecorderState>>,
    volume_tx: Arc<watch::Sender<f32>>,
    active: Mutex<Option<ActiveHandle>>,
    segments_submitted: Arc<AtomicUsize>,
}

impl SegmentRecorder {
    pub fn new(
        source: Box<dyn AudioSource>,
        preset: QualityPreset,
        segment_duration: Duration,
        segments: Arc<SegmentStore>,
        coordinator: Arc<TranscriptionCoordinator>,
        store: Arc<dyn TranscriptStore>,
    ) -> Self {
        Self {
            preset,
            segment_duration,
            source: Mutex::new(Some(source)),
            segments,
            coordinator,
            store,
            state_tx: Arc::new(watch::channel(RecorderState::Idle).0),
            volume_tx: Arc::new(watch::channel(0.0).0),
            active: Mutex::new(None),
            segments_submitted: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Begin a recording session
    ///
    /// Checks microphone authorization and free disk space before
    /// creating anything; on success the first segment is open and the
    /// capture task is running. Starting while already active is a
    /// warned no-op returning the current session id.
    pub async fn start(&self, requested: Option<Uuid>) -> Result<Uuid, PipelineError> {
        let mut active = self.active.lock().await;

        if let Some(handle) = active.as_ref() {
            if !handle.task.is_finished() {
                warn!(
                    "Recorder already active for session {}, ignoring start",
                    handle.session_id
                );
                return Ok(handle.session_id);
            }
        }
        // A capture task that stopped itself (interruption, stream end)
        // still owns the source; reclaim it before starting over.
        if let Some(handle) = active.take() {
            self.reap(handle).await;
        }

        let mut source_slot = self.source.lock().await;
        let Some(mut source) = source_slot.take() else {
            return Err(PipelineError::Source("audio source unavailable".into()));
        };

        match source.authorization() {
            MicAuthorization::Granted => {}
            MicAuthorization::Denied => {
                *source_slot = Some(source);
                return Err(PipelineError::PermissionDenied);
            }
            MicAuthorization::Undetermined => {
                info!("Requesting microphone authorization");
                if !source.request_authorization().await {
                    *source_slot = Some(source);
                    return Err(PipelineError::PermissionDenied);
                }
            }
        }

        if let Err(e) = self.segments.has_sufficient_space() {
            *source_slot = Some(source);
            return Err(e);
        }

        let session_id = requested.unwrap_or_else(Uuid::new_v4);
        info!(
            "Starting recording session {} ({:?} preset, {}s segments)",
            session_id,
            self.preset,
            self.segment_duration.as_secs()
        );

        self.store.insert_session(session_id, Utc::now()).await;

        let path = match self.segments.allocate(&session_id) {
            Ok(p) => p,
            Err(e) => {
                *source_slot = Some(source);
                self.store.end_session(session_id, Utc::now()).await;
                return Err(e);
            }
        };
        let writer = match SegmentWriter::create(path.clone(), session_id, self.preset) {
            Ok(w) => w,
            Err(e) => {
                *source_slot = Some(source);
                self.store.end_session(session_id, Utc::now()).await;
                return Err(e);
            }
        };
        self.store
            .insert_segment(session_id, &path, Utc::now(), SegmentStatus::Pending)
            .await;

        let stream = match source.start().await {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to start audio source: {:#}", e);
                // The opened segment is already registered; let the
                // coordinator resolve it as empty.
                drop(writer);
                self.submit(path);
                self.store.end_session(session_id, Utc::now()).await;
                *source_slot = Some(source);
                return Err(PipelineError::Source(format!("{e:#}")));
            }
        };
        drop(source_slot);

        let (command_tx, command_rx) = mpsc::channel(8);
        let session = CaptureSession {
            session_id,
            preset: self.preset,
            writer: Some(writer),
            paused: false,
            meter: VolumeMeter::new(),
            segments: Arc::clone(&self.segments),
            coordinator: Arc::clone(&self.coordinator),
            store: Arc::clone(&self.store),
            state_tx: Arc::clone(&self.state_tx),
            volume_tx: Arc::clone(&self.volume_tx),
            submitted: Arc::clone(&self.segments_submitted),
        };
        let segment_duration = self.segment_duration;
        let task = tokio::spawn(capture_loop(
            session,
            source,
            stream,
            command_rx,
            segment_duration,
        ));

        *active = Some(ActiveHandle {
            session_id,
            commands: command_tx,
            task,
        });
        self.state_tx.send_replace(RecorderState::Recording);
        Ok(session_id)
    }

    /// Suspend writing without closing the open segment
    pub async fn pause(&self) -> Result<(), PipelineError> {
        self.send_command(Command::Pause).await
    }

    /// Resume writing into the still-open segment
    pub async fn resume(&self) -> Result<(), PipelineError> {
        self.send_command(Command::Resume).await
    }

    /// End the session: final segment is closed and submitted
    ///
    /// In-flight transcription work is unaffected; only the capture
    /// side shuts down.
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let mut active = self.active.lock().await;
        let Some(handle) = active.take() else {
            warn!("Recorder not active, ignoring stop");
            return Ok(());
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.commands.send(Command::Stop(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        self.reap(handle).await;
        Ok(())
    }

    pub fn state(&self) -> RecorderState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<RecorderState> {
        self.state_tx.subscribe()
    }

    /// Most recent input level, 0.0 to 1.0
    pub fn volume(&self) -> f32 {
        *self.volume_tx.borrow()
    }

    pub fn subscribe_volume(&self) -> watch::Receiver<f32> {
        self.volume_tx.subscribe()
    }

    /// Session id of the running capture, if any
    pub async fn session_id(&self) -> Option<Uuid> {
        self.active
            .lock()
            .await
            .as_ref()
            .filter(|h| !h.task.is_finished())
            .map(|h| h.session_id)
    }

    /// Total segments handed to the coordinator since process start
    pub fn segments_submitted(&self) -> usize {
        self.segments_submitted.load(Ordering::SeqCst)
    }

    async fn send_command(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> Command,
    ) -> Result<(), PipelineError> {
        let active = self.active.lock().await;
        let Some(handle) = active.as_ref() else {
            warn!("Recorder not active, ignoring command");
            return Ok(());
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if handle.commands.send(make(ack_tx)).await.is_ok() {
            let _ = ack_rx.await;
        }
        Ok(())
    }

    /// Join a finished capture task and put the audio source back
    async fn reap(&self, handle: ActiveHandle) {
        match handle.task.await {
            Ok(source) => {
                *self.source.lock().await = Some(source);
            }
            Err(e) => {
                error!("Capture task panicked: {}", e);
            }
        }
    }

    fn submit(&self, path: std::path::PathBuf) {
        self.segments_submitted.fetch_add(1, Ordering::SeqCst);
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(coordinator.process(path));
    }
}

/// Per-session state owned by the capture task
struct CaptureSession {
    session_id: Uuid,
    preset: QualityPreset,
    writer: Option<SegmentWriter>,
    paused: bool,
    meter: VolumeMeter,
    segments: Arc<SegmentStore>,
    coordinator: Arc<TranscriptionCoordinator>,
    store: Arc<dyn TranscriptStore>,
    state_tx: Arc<watch::Sender<RecorderState>>,
    volume_tx: Arc<watch::Sender<f32>>,
    submitted: Arc<AtomicUsize>,
}

impl CaptureSession {
    fn set_state(&self, state: RecorderState) {
        self.state_tx.send_replace(state);
    }

    fn pause(&mut self) {
        if self.paused {
            warn!("Recording already paused");
            return;
        }
        self.paused = true;
        self.set_state(RecorderState::Paused);
        info!("Recording paused");
    }

    fn resume(&mut self) {
        if !self.paused {
            warn!("Recording not paused");
            return;
        }
        self.paused = false;
        self.set_state(RecorderState::Recording);
        info!("Recording resumed");
    }

    /// Meter and append one frame; paused sessions drop frames
    fn handle_frame(&mut self, frame: &AudioFrame) -> Result<(), PipelineError> {
        if self.paused {
            return Ok(());
        }

        let level = self.meter.update(&frame.samples);
        self.volume_tx.send_replace(level);

        if let Some(writer) = &mut self.writer {
            writer.write_frame(frame)?;
        }
        Ok(())
    }

    /// Swap in a fresh segment and hand the finished one off
    ///
    /// The next writer is opened before the old one is finalized, so
    /// there is always an open segment; frames arriving during the swap
    /// wait in the channel.
    async fn rotate(&mut self) -> Result<(), PipelineError> {
        self.set_state(RecorderState::Rotating);

        let next_path = self.segments.allocate(&self.session_id)?;
        let next = SegmentWriter::create(next_path.clone(), self.session_id, self.preset)?;
        self.store
            .insert_segment(self.session_id, &next_path, Utc::now(), SegmentStatus::Pending)
            .await;

        if let Some(old) = self.writer.replace(next) {
            self.close_and_submit(old);
        }

        self.set_state(RecorderState::Recording);
        Ok(())
    }

    /// Finalize a segment and hand its path to the coordinator
    ///
    /// Submission happens even if finalization fails; the coordinator
    /// decides what a broken or empty file becomes.
    fn close_and_submit(&self, writer: SegmentWriter) {
        let path = writer.path().to_path_buf();
        match writer.finish() {
            Ok(meta) => info!(
                "Segment complete: {} ({} samples, {} ms)",
                meta.path.display(),
                meta.sample_count,
                meta.duration_ms
            ),
            Err(e) => error!("Failed to finalize segment {}: {}", path.display(), e),
        }

        self.submitted.fetch_add(1, Ordering::SeqCst);
        let coordinator = Arc::clone(&self.coordinator);
        tokio::spawn(coordinator.process(path));
    }

    /// Close out the session: final segment submitted, state back to Idle
    async fn finish(&mut self) {
        self.set_state(RecorderState::Stopping);

        if let Some(writer) = self.writer.take() {
            self.close_and_submit(writer);
        }

        self.store.end_session(self.session_id, Utc::now()).await;
        self.volume_tx.send_replace(0.0);
        self.set_state(RecorderState::Idle);
        info!("Recording session ended: {}", self.session_id);
    }
}

/// The capture loop: frames in, segments out
///
/// Owns the audio source for the lifetime of the session and returns it
/// when the loop exits so the recorder can start again.
async fn capture_loop(
    mut session: CaptureSession,
    mut source: Box<dyn AudioSource>,
    mut stream: SourceStream,
    mut commands: mpsc::Receiver<Command>,
    segment_duration: Duration,
) -> Box<dyn AudioSource> {
    info!("Capture task started for session {}", session.session_id);

    let mut rotation = tokio::time::interval_at(
        tokio::time::Instant::now() + segment_duration,
        segment_duration,
    );
    rotation.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;

            Some(command) = commands.recv() => {
                match command {
                    Command::Pause(ack) => {
                        session.pause();
                        let _ = ack.send(());
                    }
                    Command::Resume(ack) => {
                        session.resume();
                        let _ = ack.send(());
                    }
                    Command::Stop(ack) => {
                        session.finish().await;
                        let _ = ack.send(());
                        break;
                    }
                }
            }

            _ = rotation.tick() => {
                if session.paused {
                    debug!("Rotation tick ignored while paused");
                } else if let Err(e) = session.rotate().await {
                    error!("Segment rotation failed, stopping session: {}", e);
                    session.finish().await;
                    break;
                }
            }

            event = stream.events.recv(), if events_open => {
                match event {
                    Some(SourceEvent::InterruptionBegan) => {
                        warn!(
                            "Audio interruption began, stopping session {}",
                            session.session_id
                        );
                        session.finish().await;
                        break;
                    }
                    Some(SourceEvent::InterruptionEnded) => {
                        info!("Audio interruption ended");
                    }
                    Some(SourceEvent::RouteChanged) => {
                        info!("Audio route changed, capture continues");
                    }
                    None => {
                        events_open = false;
                    }
                }
            }

            frame = stream.frames.recv() => {
                match frame {
                    Some(frame) => {
                        if let Err(e) = session.handle_frame(&frame) {
                            error!("Segment write failed, stopping session: {}", e);
                            session.finish().await;
                            break;
                        }
                    }
                    None => {
                        info!("Audio source stream ended");
                        session.finish().await;
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = source.stop().await {
        warn!("Failed to stop audio source: {:#}", e);
    }
    info!("Capture task stopped for session {}", session.session_id);
    source
}
