//! Scenario: Scheduler timers and debounced manual triggers
//!
//! # Invariants under test
//!
//! 1. Triggers arriving inside one debounce window go out as one batch, with
//!    duplicates coalesced.
//! 2. A triggered ID unknown to the local store is removed as never-existed.
//! 3. A pass with an initial delay of zero runs right after start and its
//!    summary is broadcast to subscribers.
//! 4. Shutdown returns promptly even when every timer is hours away.
//! 5. The snapshot reflects pending triggers and the last summary per pass.

use std::sync::Arc;
use std::time::Duration;

use mps_catalog::LocalProduct;
use mps_config::{EngineSettings, PassSchedule};
use mps_runtime::{Engine, EngineConfig, PassKind, Scheduler};
use mps_testkit::{at, product, FakeMarketplace, InMemoryCatalog, InMemoryWatermarkStore};
use tokio::time::{sleep, timeout};

const HOUR: u64 = 3600;

fn quiet() -> EngineSettings {
    EngineSettings {
        sync: PassSchedule::new(HOUR, HOUR),
        tickets: PassSchedule::new(HOUR, HOUR),
        audit: PassSchedule::new(HOUR, HOUR),
        trigger_debounce_ms: 100,
        ..EngineSettings::default()
    }
}

async fn engine(rows: Vec<LocalProduct>) -> (Arc<FakeMarketplace>, Arc<Engine>) {
    let remote = Arc::new(FakeMarketplace::new());
    let engine = Engine::load(
        Arc::new(InMemoryCatalog::new(rows)),
        remote.clone(),
        Arc::new(InMemoryWatermarkStore::default()),
        EngineConfig::default(),
    )
    .await
    .unwrap();
    (remote, Arc::new(engine))
}

#[tokio::test]
async fn triggers_in_one_window_coalesce() {
    let (remote, engine) = engine(vec![product("a", at(1)), product("b", at(2))]).await;
    let scheduler = Scheduler::start(Arc::clone(&engine), &quiet());

    assert!(engine.triggers().enqueue("a"));
    assert!(engine.triggers().enqueue("b"));
    assert!(!engine.triggers().enqueue("a"));

    sleep(Duration::from_millis(500)).await;
    scheduler.shutdown().await;

    let calls = remote.upsert_calls();
    assert_eq!(calls.len(), 1);
    let ids: Vec<&str> = calls[0].iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(engine.triggers().is_empty());

    let snap = engine.snapshot();
    let trigger = snap
        .last_passes
        .iter()
        .find(|s| s.kind == PassKind::Trigger)
        .unwrap();
    assert_eq!(trigger.retried, 2);
}

#[tokio::test]
async fn unknown_triggered_id_is_removed() {
    let (remote, engine) = engine(vec![]).await;
    engine.triggers().enqueue("ghost");

    let s = engine.run_trigger_pass().await.unwrap();
    assert_eq!(s.removal_reasons.get("never_existed"), Some(&1));
    assert_eq!(remote.removed_ids(), vec!["ghost".to_string()]);
}

#[tokio::test]
async fn empty_inbox_skips() {
    let (remote, engine) = engine(vec![]).await;
    let s = engine.run_trigger_pass().await.unwrap();
    assert!(s.is_skipped());
    assert_eq!(remote.submission_count(), 0);
}

#[tokio::test]
async fn zero_delay_pass_runs_and_broadcasts() {
    let (remote, engine) = engine(vec![product("a", at(1))]).await;
    let mut rx = engine.subscribe();

    let settings = EngineSettings {
        sync: PassSchedule::new(0, HOUR),
        ..quiet()
    };
    let scheduler = Scheduler::start(Arc::clone(&engine), &settings);

    let summary = timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.kind, PassKind::Sync);
    assert_eq!(summary.upserted, 1);
    assert!(summary.watermark_advanced);
    assert!(summary.finished_at.is_some());

    scheduler.shutdown().await;
    assert_eq!(remote.upserted_ids(), vec!["a".to_string()]);
    assert_eq!(engine.quiesce().await, at(1));
}

#[tokio::test]
async fn shutdown_is_prompt() {
    let (_remote, engine) = engine(vec![]).await;
    let scheduler = Scheduler::start(Arc::clone(&engine), &quiet());
    timeout(Duration::from_secs(2), scheduler.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn snapshot_tracks_pending_and_last_passes() {
    let (_remote, engine) = engine(vec![product("a", at(1))]).await;
    engine.triggers().enqueue("a");
    assert_eq!(engine.snapshot().pending_triggers, 1);

    engine.run_sync_pass().await.unwrap();
    engine.run_sync_pass().await.unwrap();
    engine.run_ticket_pass().await.unwrap();

    let snap = engine.snapshot();
    let kinds: Vec<PassKind> = snap.last_passes.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, vec![PassKind::Sync, PassKind::Tickets]);
    // Latest sync saw nothing new.
    assert_eq!(snap.last_passes[0].changed, 0);
    assert_eq!(snap.watermark, at(1));
    assert_eq!(snap.open_tickets.len(), 1);
}
