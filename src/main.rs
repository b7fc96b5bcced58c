use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use segscribe::audio::{AudioSource, SourceConfig, WavFileSource};
use segscribe::transcribe::{
    LocalBackend, RemoteBackend, TranscriptionBackend, TranscriptionCoordinator,
};
use segscribe::{
    create_router, AppState, Config, ConnectivityMonitor, MemoryStore, RetryLedger,
    SegmentRecorder, SegmentStore, TranscriptStore,
};
use tracing::info;

/// Segmented audio capture and transcription daemon
#[derive(Parser, Debug)]
#[command(name = "segscribe", version)]
struct Args {
    /// Config file stem (TOML, every key optional)
    #[arg(long, default_value = "config/segscribe")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Segscribe v0.1.0");
    info!("Loaded config: {}", cfg.service.name);

    // The capture source replays a WAV file in place of a device
    // microphone; realtime pacing makes segment rotation behave as it
    // would against live input.
    let input_wav = cfg
        .audio
        .input_wav
        .clone()
        .context("audio.input_wav must point at a WAV file to use as the capture source")?;
    let source: Box<dyn AudioSource> = Box::new(
        WavFileSource::new(
            &input_wav,
            SourceConfig {
                preset: cfg.audio.preset,
                ..SourceConfig::default()
            },
        )
        .realtime(true),
    );

    let store: Arc<dyn TranscriptStore> = Arc::new(MemoryStore::new());
    let segments = Arc::new(SegmentStore::new(
        cfg.recording.scratch_dir.clone(),
        cfg.recording.min_free_mb,
    )?);
    let ledger = Arc::new(RetryLedger::load(cfg.retry.ledger_path.clone())?);
    let connectivity = ConnectivityMonitor::new(true);

    let remote: Arc<dyn TranscriptionBackend> = Arc::new(RemoteBackend::new(&cfg.remote)?);
    let local: Arc<dyn TranscriptionBackend> = Arc::new(LocalBackend::new(&cfg.fallback));

    let coordinator = Arc::new(TranscriptionCoordinator::new(
        remote,
        local,
        Arc::clone(&store),
        Arc::clone(&segments),
        Arc::clone(&ledger),
        connectivity.clone(),
        &cfg.retry,
    ));

    // Startup drain resolves segments the ledger carried over from a
    // previous run, then keeps listening for offline-to-online edges.
    let _drain_task = Arc::clone(&coordinator).spawn_drain_task();

    let recorder = Arc::new(SegmentRecorder::new(
        source,
        cfg.audio.preset,
        cfg.recording.segment_duration(),
        Arc::clone(&segments),
        Arc::clone(&coordinator),
        Arc::clone(&store),
    ));

    let state = AppState::new(recorder, store, connectivity);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
