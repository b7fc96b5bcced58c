// Example: Capture a WAV file as fixed-duration segments
//
// This example demonstrates the complete capture pipeline:
// 1. Stream a WAV file as if it were a live microphone
// 2. Rotate segment files on a fixed cadence
// 3. Hand each closed segment to the transcription coordinator
// 4. Print the session record and retry ledger at the end
//
// With --offline the remote backend is never tried: every segment is
// parked in the durable ledger, which is what happens on a device with
// no connectivity. Without it the example posts each segment to the
// transcription endpoint at --base-url.
//
// Usage: cargo run --example record_segments -- --input sample.wav --duration 12

use anyhow::Result;
use clap::Parser;
use segscribe::audio::{AudioSource, QualityPreset, SourceConfig, WavFileSource};
use segscribe::config::{FallbackConfig, RemoteConfig, RetryConfig};
use segscribe::transcribe::{
    LocalBackend, RemoteBackend, TranscriptionBackend, TranscriptionCoordinator,
};
use segscribe::{
    ConnectivityMonitor, MemoryStore, RetryLedger, SegmentRecorder, SegmentStore, TranscriptStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "record_segments")]
#[command(about = "Capture a WAV file as transcribed segments")]
struct Args {
    /// WAV file to stream as the capture source
    #[arg(short, long)]
    input: String,

    /// Duration to record in seconds
    #[arg(short, long, default_value = "12")]
    duration: u64,

    /// Segment duration in seconds
    #[arg(short, long, default_value = "5")]
    segment_duration: u64,

    /// Scratch directory for segment files
    #[arg(short, long, default_value = "~/.segscribe/segments")]
    output_dir: String,

    /// Transcription endpoint base URL
    #[arg(short, long, default_value = "http://127.0.0.1:8080/v1")]
    base_url: String,

    /// Park every segment in the retry ledger instead of posting it
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    info!("Segscribe - Segmented Recording Example");
    info!("Recording for {} seconds", args.duration);
    info!("Segment duration: {} seconds", args.segment_duration);

    // Expand home directory
    let output_dir = shellexpand::tilde(&args.output_dir);
    let output_dir = PathBuf::from(output_dir.as_ref());

    info!("Output directory: {}", output_dir.display());

    let source: Box<dyn AudioSource> = Box::new(
        WavFileSource::new(
            &args.input,
            SourceConfig {
                preset: QualityPreset::Medium,
                ..SourceConfig::default()
            },
        )
        .realtime(true),
    );

    let store: Arc<dyn TranscriptStore> = Arc::new(MemoryStore::new());
    let segments = Arc::new(SegmentStore::new(output_dir.clone(), 50)?);
    let retry = RetryConfig {
        ledger_path: output_dir.join("retry-ledger.json"),
        ..RetryConfig::default()
    };
    let ledger = Arc::new(RetryLedger::load(retry.ledger_path.clone())?);
    let connectivity = ConnectivityMonitor::new(!args.offline);

    let remote_config = RemoteConfig {
        base_url: args.base_url.clone(),
        ..RemoteConfig::default()
    };
    let remote: Arc<dyn TranscriptionBackend> = Arc::new(RemoteBackend::new(&remote_config)?);
    let local: Arc<dyn TranscriptionBackend> = Arc::new(LocalBackend::new(&FallbackConfig::default()));

    let coordinator = Arc::new(TranscriptionCoordinator::new(
        remote,
        local,
        Arc::clone(&store),
        Arc::clone(&segments),
        Arc::clone(&ledger),
        connectivity.clone(),
        &retry,
    ));

    let recorder = SegmentRecorder::new(
        source,
        QualityPreset::Medium,
        Duration::from_secs(args.segment_duration),
        Arc::clone(&segments),
        Arc::clone(&coordinator),
        Arc::clone(&store),
    );

    // Start capturing
    info!("Starting capture...");
    let session_id = recorder.start(None).await?;

    info!("Recording session {} started, waiting {} seconds", session_id, args.duration);
    sleep(Duration::from_secs(args.duration)).await;

    // Stop capture; the final partial segment is submitted on the way out
    info!("Stopping capture...");
    recorder.stop().await?;

    // Give in-flight transcription rounds a moment to resolve
    sleep(Duration::from_millis(500)).await;

    // Print summary
    info!("Recording complete!");
    if let Some(session) = store.session(session_id).await {
        info!("Session {} saved {} segments:", session.id, session.segments.len());
        for segment in &session.segments {
            info!(
                "  - {} [{:?}] {}",
                segment.path.display(),
                segment.status,
                segment.transcript_text().unwrap_or("(pending)")
            );
        }
    }

    let parked = ledger.snapshot().await;
    if parked.is_empty() {
        info!("Retry ledger is empty");
    } else {
        info!("Retry ledger holds {} segments awaiting connectivity:", parked.len());
        for (path, attempts) in &parked {
            info!("  - {} ({} remote attempts so far)", path.display(), attempts);
        }
    }

    Ok(())
}
