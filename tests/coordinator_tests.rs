// Integration tests for the transcription pipeline
//
// These tests drive the coordinator directly with scripted backends:
// remote success, offline parking and reconnect drains, backoff
// exhaustion into the local recognizer, the durable retry ledger across
// a simulated restart, and the duplicate-suppression guarantees.

mod common;

use anyhow::Result;
use common::{
    register_pending, rig, seed_segment, test_retry_config, write_empty_wav, write_wav,
    GatedBackend, ScriptedBackend,
};
use segscribe::persist::{MemoryStore, SegmentStatus, TranscriptStore};
use segscribe::transcribe::{TranscriptionCoordinator, UNAVAILABLE_TRANSCRIPT};
use segscribe::{ConnectivityMonitor, RetryLedger, SegmentStore};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

use crate::eventually;

#[tokio::test]
async fn test_remote_success_attaches_transcript() -> Result<()> {
    let remote = ScriptedBackend::ok("remote", "hello world");
    let local = ScriptedBackend::failing("local");
    let rig = rig(remote.clone(), local.clone(), true);

    let (session, path) = seed_segment(&rig, "seg-a.wav", &[1200i16; 3200]).await;
    Arc::clone(&rig.coordinator).process(path.clone()).await;

    assert!(rig.store.transcript_exists(&path).await);
    let record = rig.store.session(session).await.unwrap();
    assert_eq!(record.segments[0].status, SegmentStatus::Success);
    assert_eq!(record.segments[0].transcript_text(), Some("hello world"));

    assert_eq!(remote.calls(), 1);
    assert_eq!(remote.seen(), vec![path]);
    assert_eq!(local.calls(), 0);
    assert!(rig.ledger.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_offline_parks_then_reconnect_drains_once() -> Result<()> {
    let remote = ScriptedBackend::ok("remote", "after reconnect");
    let local = ScriptedBackend::failing("local");
    let rig = rig(remote.clone(), local.clone(), false);

    let drain_task = Arc::clone(&rig.coordinator).spawn_drain_task();

    let (session, path) = seed_segment(&rig, "seg-offline.wav", &[700i16; 3200]).await;
    Arc::clone(&rig.coordinator).process(path.clone()).await;

    // Parked: no attempt was made, the ledger holds it at zero
    assert_eq!(remote.calls(), 0);
    assert_eq!(rig.ledger.attempts(&path).await, Some(0));
    assert!(!rig.store.transcript_exists(&path).await);

    // Coming online drains the ledger
    rig.connectivity.set_online(true);
    eventually!(
        "parked segment to resolve",
        rig.store.transcript_exists(&path).await
    );
    assert_eq!(remote.calls(), 1);
    assert!(rig.ledger.is_empty().await);

    let record = rig.store.session(session).await.unwrap();
    assert_eq!(record.segments[0].status, SegmentStatus::Success);
    assert_eq!(
        record.segments[0].transcript_text(),
        Some("after reconnect")
    );

    // Later transitions with an empty ledger change nothing
    rig.connectivity.set_online(false);
    rig.connectivity.set_online(true);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(remote.calls(), 1);

    drain_task.abort();
    Ok(())
}

#[tokio::test]
async fn test_offline_parking_keeps_prior_attempt_count() -> Result<()> {
    let remote = ScriptedBackend::ok("remote", "unused");
    let local = ScriptedBackend::failing("local");
    let rig = rig(remote.clone(), local.clone(), false);

    let (_, path) = seed_segment(&rig, "seg-parked.wav", &[250i16; 3200]).await;
    rig.ledger.record(&path, 3).await?;

    Arc::clone(&rig.coordinator).process(path.clone()).await;

    // Re-parking must not reset the attempts already spent
    assert_eq!(rig.ledger.attempts(&path).await, Some(3));
    assert_eq!(remote.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_remote_exhaustion_falls_back_to_local() -> Result<()> {
    let remote = ScriptedBackend::failing("remote");
    let local = ScriptedBackend::ok("local", "on-device transcript");
    let rig = rig(remote.clone(), local.clone(), true);

    let (session, path) = seed_segment(&rig, "seg-fail.wav", &[300i16; 3200]).await;
    Arc::clone(&rig.coordinator).process(path.clone()).await;

    // The first round failed and scheduled a backoff retry; with a 5ms
    // base the remaining attempts resolve within a few hundred ms
    eventually!(
        "fallback transcript to attach",
        rig.store.transcript_exists(&path).await
    );

    let record = rig.store.session(session).await.unwrap();
    assert_eq!(record.segments[0].status, SegmentStatus::Fallback);
    assert_eq!(
        record.segments[0].transcript_text(),
        Some("on-device transcript")
    );
    assert_eq!(remote.calls(), 5, "remote gets exactly the attempt budget");
    assert_eq!(local.calls(), 1);
    assert!(rig.ledger.is_empty().await);

    // Replays after resolution never reach a backend again
    Arc::clone(&rig.coordinator).process(path.clone()).await;
    assert_eq!(remote.calls(), 5);
    assert_eq!(local.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_fallback_failure_marks_unavailable() -> Result<()> {
    let remote = ScriptedBackend::failing("remote");
    let local = ScriptedBackend::failing("local");
    let rig = rig(remote.clone(), local.clone(), true);

    let (session, path) = seed_segment(&rig, "seg-doomed.wav", &[150i16; 3200]).await;
    Arc::clone(&rig.coordinator).process(path.clone()).await;

    eventually!(
        "sentinel transcript to attach",
        rig.store.transcript_exists(&path).await
    );

    let record = rig.store.session(session).await.unwrap();
    assert_eq!(record.segments[0].status, SegmentStatus::Failed);
    assert_eq!(
        record.segments[0].transcript_text(),
        Some(UNAVAILABLE_TRANSCRIPT)
    );
    assert_eq!(remote.calls(), 5);
    assert_eq!(local.calls(), 1);
    assert!(rig.ledger.is_empty().await, "resolved segments leave the ledger");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_rounds_share_one_attempt() -> Result<()> {
    let remote = GatedBackend::new("gated transcript");
    let local = ScriptedBackend::failing("local");
    let rig = rig(remote.clone(), local.clone(), true);

    let (session, path) = seed_segment(&rig, "seg-race.wav", &[400i16; 3200]).await;

    let first = tokio::spawn(Arc::clone(&rig.coordinator).process(path.clone()));
    remote.wait_for_entry().await;

    // A second round for the same path is a no-op while the first
    // still owns it
    Arc::clone(&rig.coordinator).process(path.clone()).await;
    assert_eq!(remote.calls(), 1);
    assert!(!rig.store.transcript_exists(&path).await);

    remote.release();
    first.await?;

    let record = rig.store.session(session).await.unwrap();
    assert_eq!(record.segments[0].status, SegmentStatus::Success);
    assert_eq!(
        record.segments[0].transcript_text(),
        Some("gated transcript")
    );
    assert_eq!(remote.calls(), 1);
    assert!(rig.ledger.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn test_missing_or_empty_audio_resolves_without_backends() -> Result<()> {
    let remote = ScriptedBackend::ok("remote", "unused");
    let local = ScriptedBackend::ok("local", "unused");
    let rig = rig(remote.clone(), local.clone(), true);

    // File deleted between capture and processing
    let (_, vanished) = seed_segment(&rig, "seg-vanished.wav", &[500i16; 3200]).await;
    std::fs::remove_file(&vanished)?;
    Arc::clone(&rig.coordinator).process(vanished.clone()).await;

    // File finalized with zero frames, nothing but a WAV header
    let empty = rig.temp.path().join("seg-empty.wav");
    write_empty_wav(&empty);
    register_pending(&rig.store, &empty).await;
    Arc::clone(&rig.coordinator).process(empty.clone()).await;

    for path in [&vanished, &empty] {
        assert!(rig.store.transcript_exists(path).await);
    }
    assert_eq!(remote.calls(), 0);
    assert_eq!(local.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_ledger_restart_resumes_pending_work() -> Result<()> {
    let temp = TempDir::new()?;
    let retry = test_retry_config(temp.path());
    let store = Arc::new(MemoryStore::new());

    // First process life: two segments parked with attempts, one of
    // which loses its audio file before the restart
    let kept = temp.path().join("kept.wav");
    let gone = temp.path().join("gone.wav");
    write_wav(&kept, &[900i16; 3200]);
    write_wav(&gone, &[800i16; 3200]);
    register_pending(&store, &kept).await;
    register_pending(&store, &gone).await;

    {
        let ledger = RetryLedger::load(retry.ledger_path.clone())?;
        ledger.record(&kept, 2).await?;
        ledger.record(&gone, 4).await?;
    }
    std::fs::remove_file(&gone)?;

    // Second life: reload keeps the survivor with its attempt count
    // and drops the entry whose audio vanished
    let ledger = Arc::new(RetryLedger::load(retry.ledger_path.clone())?);
    assert_eq!(ledger.len().await, 1);
    assert_eq!(ledger.attempts(&kept).await, Some(2));
    assert_eq!(ledger.attempts(&gone).await, None);

    let remote = ScriptedBackend::ok("remote", "recovered transcript");
    let local = ScriptedBackend::failing("local");
    let segments = Arc::new(SegmentStore::new(temp.path().join("segments"), 0)?);
    let connectivity = ConnectivityMonitor::new(true);
    let coordinator = Arc::new(TranscriptionCoordinator::new(
        remote.clone(),
        local.clone(),
        Arc::clone(&store) as Arc<dyn TranscriptStore>,
        Arc::clone(&segments),
        Arc::clone(&ledger),
        connectivity.clone(),
        &retry,
    ));

    // The startup drain picks the survivor up immediately
    let drain_task = Arc::clone(&coordinator).spawn_drain_task();
    eventually!(
        "carried-over segment to resolve",
        store.transcript_exists(&kept).await
    );

    assert_eq!(remote.calls(), 1);
    assert_eq!(remote.seen(), vec![kept.clone()]);
    assert!(ledger.is_empty().await);
    assert!(!store.transcript_exists(&gone).await);

    drain_task.abort();
    Ok(())
}

#[tokio::test]
async fn test_restart_with_spent_budget_goes_straight_to_local() -> Result<()> {
    let remote = ScriptedBackend::ok("remote", "must not be used");
    let local = ScriptedBackend::ok("local", "recognizer transcript");
    let rig = rig(remote.clone(), local.clone(), true);

    // A previous run already burned the whole remote budget
    let (session, path) = seed_segment(&rig, "seg-spent.wav", &[600i16; 3200]).await;
    rig.ledger.record(&path, 5).await?;

    Arc::clone(&rig.coordinator).process(path.clone()).await;

    assert_eq!(remote.calls(), 0, "spent budget must not touch the remote");
    assert_eq!(local.calls(), 1);

    let record = rig.store.session(session).await.unwrap();
    assert_eq!(record.segments[0].status, SegmentStatus::Fallback);
    assert_eq!(
        record.segments[0].transcript_text(),
        Some("recognizer transcript")
    );
    assert!(rig.ledger.is_empty().await);
    Ok(())
}
