//! Scenario: Ticket lifecycle through the registry
//!
//! # Invariants under test
//!
//! 1. A ticket older than the deadline is abandoned exactly once and hands
//!    back all of its product IDs.
//! 2. A resolved ticket whose items all succeeded yields zero retry IDs.
//! 3. A resolved ticket with N failing items yields exactly those N IDs.
//! 4. A removal ticket treats per-item 404 as success.
//! 5. The registry never holds a resolved or abandoned ticket.
//!
//! All tests are pure in-process; no DB or network required.

use chrono::{DateTime, Duration, TimeZone, Utc};
use mps_reconcile::{Ticket, TicketKind, TicketRegistry, TicketState};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn ids(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// 1. Abandonment
// ---------------------------------------------------------------------------

#[test]
fn expired_ticket_is_abandoned_exactly_once() {
    let mut reg = TicketRegistry::new();
    reg.register(Ticket::open("tk-1", TicketKind::Upsert, ids(&["a", "b"]), t0()));

    let deadline = Duration::minutes(60);

    // Still inside the deadline: nothing happens.
    assert!(reg.sweep_expired(t0() + Duration::minutes(59), deadline).is_empty());

    let swept = reg.sweep_expired(t0() + Duration::minutes(61), deadline);
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].state, TicketState::Abandoned);
    assert_eq!(swept[0].product_ids, ids(&["a", "b"]));

    // Later sweeps never see it again.
    assert!(reg.sweep_expired(t0() + Duration::minutes(120), deadline).is_empty());
    assert!(reg.is_empty());
}

// ---------------------------------------------------------------------------
// 2-4. Resolution
// ---------------------------------------------------------------------------

#[test]
fn resolved_all_success_has_no_retries() {
    let mut reg = TicketRegistry::new();
    reg.register(Ticket::open("tk", TicketKind::Upsert, ids(&["a", "b"]), t0()));

    let items = [("a", 200u16), ("b", 201u16)];
    let t = reg.resolve("tk").unwrap();
    let retry = t.kind.failing_ids(items.iter().map(|(i, s)| (*i, *s)));
    assert!(retry.is_empty());
    assert!(reg.is_empty());
}

#[test]
fn resolved_with_failures_retries_exactly_failing_ids() {
    let mut reg = TicketRegistry::new();
    reg.register(Ticket::open(
        "tk",
        TicketKind::Upsert,
        ids(&["a", "b", "c", "d"]),
        t0(),
    ));

    let items = [("a", 200u16), ("b", 400u16), ("c", 201u16), ("d", 500u16)];
    let t = reg.resolve("tk").unwrap();
    let retry = t.kind.failing_ids(items.iter().map(|(i, s)| (*i, *s)));
    assert_eq!(retry, ids(&["b", "d"]));
}

#[test]
fn removal_ticket_accepts_not_found() {
    let items = [("a", 404u16), ("b", 200u16)];
    let retry = TicketKind::Removal.failing_ids(items.iter().map(|(i, s)| (*i, *s)));
    assert!(retry.is_empty());
}

// ---------------------------------------------------------------------------
// 5. Registry only stores Open tickets
// ---------------------------------------------------------------------------

#[test]
fn registry_only_contains_open_tickets() {
    let mut reg = TicketRegistry::new();
    reg.register(Ticket::open("a", TicketKind::Upsert, ids(&["1"]), t0()));
    reg.register(Ticket::open("b", TicketKind::Removal, ids(&["2"]), t0()));
    reg.register(Ticket::open("c", TicketKind::Upsert, ids(&["3"]), t0()));

    reg.resolve("a");
    reg.abandon("b");
    reg.record_poll("c");

    assert!(reg.iter().all(|t| t.state == TicketState::Open));
    assert_eq!(reg.ids(), ids(&["c"]));
    assert_eq!(reg.get("c").unwrap().poll_count, 1);
}
