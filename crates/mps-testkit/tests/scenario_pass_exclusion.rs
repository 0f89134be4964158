//! Scenario: One pass at a time
//!
//! # Invariants under test
//!
//! 1. While a sync pass is parked inside a marketplace submission, a ticket
//!    pass started concurrently makes no remote call and does not finish.
//! 2. Once released, the ticket pass sees the ticket the sync pass
//!    registered, so the two never interleave.
//! 3. An audit started during a sync pass does not read the catalog until
//!    the sync pass is done, and then skips on the ticket it left open.
//! 4. `snapshot()` answers while a pass holds the lock and reports the state
//!    of the last finished pass.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mps_runtime::{Engine, EngineConfig, PassKind};
use mps_testkit::{at, product, FakeMarketplace, InMemoryCatalog, InMemoryWatermarkStore};

async fn setup() -> (Arc<InMemoryCatalog>, Arc<FakeMarketplace>, Engine) {
    let catalog = Arc::new(InMemoryCatalog::new(vec![product("a", at(1))]));
    let remote = Arc::new(FakeMarketplace::new());
    remote.auto_finish(true);
    let engine = Engine::load(
        catalog.clone(),
        remote.clone(),
        Arc::new(InMemoryWatermarkStore::default()),
        EngineConfig::default(),
    )
    .await
    .unwrap();
    (catalog, remote, engine)
}

#[tokio::test]
async fn ticket_pass_waits_for_running_sync_pass() {
    let (_catalog, remote, engine) = setup().await;
    let gate = remote.hold_next_upsert();

    let sync = engine.run_sync_pass();
    let tickets = async {
        gate.entered().await;
        let pass = engine.run_ticket_pass();
        tokio::pin!(pass);

        let early = tokio::time::timeout(Duration::from_millis(200), &mut pass).await;
        assert!(early.is_err(), "ticket pass ran while the sync pass held the lock");
        assert_eq!(remote.receipt_calls(), 0);

        let snap = engine.snapshot();
        assert_eq!(snap.watermark, DateTime::<Utc>::UNIX_EPOCH);
        assert!(snap.open_tickets.is_empty());
        assert!(snap.last_passes.is_empty());

        gate.release();
        pass.await
    };

    let (sync, tickets) = tokio::join!(sync, tickets);
    let sync = sync.unwrap();
    let tickets = tickets.unwrap();

    assert_eq!(sync.upserted, 1);
    assert!(sync.watermark_advanced);
    assert_eq!(tickets.resolved, 1);
    assert_eq!(remote.receipt_calls(), 1);

    let snap = engine.snapshot();
    assert_eq!(snap.watermark, at(1));
    assert!(snap.open_tickets.is_empty());
    let kinds: Vec<PassKind> = snap.last_passes.iter().map(|p| p.kind).collect();
    assert_eq!(kinds, vec![PassKind::Sync, PassKind::Tickets]);
}

#[tokio::test]
async fn audit_waits_for_running_sync_pass() {
    let (catalog, remote, engine) = setup().await;
    let gate = remote.hold_next_upsert();

    let sync = engine.run_sync_pass();
    let audit = async {
        gate.entered().await;
        let reads_during_sync = catalog.reads();
        let pass = engine.run_audit_pass();
        tokio::pin!(pass);

        let early = tokio::time::timeout(Duration::from_millis(200), &mut pass).await;
        assert!(early.is_err(), "audit ran while the sync pass held the lock");
        assert_eq!(catalog.reads(), reads_during_sync);

        gate.release();
        pass.await
    };

    let (sync, audit) = tokio::join!(sync, audit);
    assert_eq!(sync.unwrap().upserted, 1);

    let audit = audit.unwrap();
    assert_eq!(audit.skipped.as_deref(), Some("tickets outstanding"));
    // Only the sync pass's changed_since read ever happened.
    assert_eq!(catalog.reads(), 1);
}
