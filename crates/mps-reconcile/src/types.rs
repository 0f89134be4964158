use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use mps_catalog::{RemoteProduct, RemovalCandidate, RemovalReason};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ticket kind / receipt classification
// ---------------------------------------------------------------------------

/// Which batch endpoint issued a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Upsert,
    Removal,
}

impl TicketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketKind::Upsert => "upsert",
            TicketKind::Removal => "removal",
        }
    }

    /// Per-item receipt status counts as done.
    ///
    /// 404 on a removal means the item is already absent remotely.
    pub fn accepts(&self, status: u16) -> bool {
        match status {
            200 | 201 => true,
            404 => *self == TicketKind::Removal,
            _ => false,
        }
    }

    /// IDs of receipt items whose status is not accepted for this kind.
    /// Order follows the receipt; duplicates are collapsed.
    pub fn failing_ids<'a, I>(&self, items: I) -> Vec<String>
    where
        I: IntoIterator<Item = (&'a str, u16)>,
    {
        let mut out: Vec<String> = Vec::new();
        for (id, status) in items {
            if !self.accepts(status) && !out.iter().any(|x| x == id) {
                out.push(id.to_string());
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Ticket state machine
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// Accepted by the marketplace, not finished yet.
    Open,
    /// Receipt reported `finished=true`. **Terminal.**
    Resolved,
    /// Deadline passed without a finished receipt. **Terminal.**
    Abandoned,
}

impl TicketState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketState::Open)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TicketEvent {
    /// A receipt was fetched and was not finished.
    Polled,
    Finished,
    DeadlineExceeded,
}

/// An event arrived for a ticket that already left `Open`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TicketTransitionError {
    pub ticket_id: String,
    pub from: TicketState,
    pub event: TicketEvent,
}

impl std::fmt::Display for TicketTransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal ticket transition: ticket={} {:?} + {:?}",
            self.ticket_id, self.from, self.event
        )
    }
}

impl std::error::Error for TicketTransitionError {}

/// Handle to one asynchronous batch write accepted by the marketplace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub kind: TicketKind,
    /// Products covered by the batch, in submission order.
    pub product_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub poll_count: u32,
    pub state: TicketState,
}

impl Ticket {
    pub fn open(
        id: impl Into<String>,
        kind: TicketKind,
        product_ids: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            product_ids,
            created_at,
            poll_count: 0,
            state: TicketState::Open,
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.created_at
    }

    /// Strictly older than `deadline`.
    pub fn is_expired(&self, now: DateTime<Utc>, deadline: Duration) -> bool {
        self.age(now) > deadline
    }

    pub fn apply(&mut self, event: TicketEvent) -> Result<(), TicketTransitionError> {
        if self.state.is_terminal() {
            return Err(TicketTransitionError {
                ticket_id: self.id.clone(),
                from: self.state,
                event,
            });
        }
        match event {
            TicketEvent::Polled => self.poll_count = self.poll_count.saturating_add(1),
            TicketEvent::Finished => self.state = TicketState::Resolved,
            TicketEvent::DeadlineExceeded => self.state = TicketState::Abandoned,
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// What one pass wants to send to the marketplace.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncBatch {
    pub upserts: Vec<RemoteProduct>,
    pub removals: Vec<RemovalCandidate>,
}

impl SyncBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }

    pub fn upsert_ids(&self) -> Vec<String> {
        self.upserts.iter().map(|p| p.id.clone()).collect()
    }

    pub fn removal_ids(&self) -> Vec<String> {
        self.removals.iter().map(|r| r.id.clone()).collect()
    }

    /// Removal counts keyed by reason, for diagnostics.
    pub fn removal_counts(&self) -> BTreeMap<RemovalReason, usize> {
        let mut out = BTreeMap::new();
        for r in &self.removals {
            *out.entry(r.reason).or_insert(0) += 1;
        }
        out
    }
}

/// Result of a full-catalog audit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AuditReport {
    /// Eligible local rows with no equal-and-active marketplace counterpart.
    pub updates: Vec<RemoteProduct>,
    /// Active marketplace rows that should not be listed.
    pub removals: Vec<RemovalCandidate>,
    pub local_total: usize,
    pub local_eligible: usize,
    pub remote_active: usize,
    pub remote_inactive: usize,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.updates.is_empty() && self.removals.is_empty()
    }

    pub fn count_removals(&self, reason: RemovalReason) -> usize {
        self.removals.iter().filter(|r| r.reason == reason).count()
    }

    pub fn into_batch(self) -> SyncBatch {
        SyncBatch {
            upserts: self.updates,
            removals: self.removals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn accepted_codes_depend_on_kind() {
        assert!(TicketKind::Upsert.accepts(200));
        assert!(TicketKind::Upsert.accepts(201));
        assert!(!TicketKind::Upsert.accepts(404));
        assert!(TicketKind::Removal.accepts(404));
        assert!(!TicketKind::Removal.accepts(400));
        assert!(!TicketKind::Removal.accepts(500));
    }

    #[test]
    fn failing_ids_collects_only_rejections() {
        let items = [("a", 200), ("b", 422), ("c", 404), ("b", 500), ("d", 201)];
        assert_eq!(
            TicketKind::Upsert.failing_ids(items.iter().map(|(i, s)| (*i, *s))),
            vec!["b".to_string(), "c".to_string()]
        );
        assert_eq!(
            TicketKind::Removal.failing_ids(items.iter().map(|(i, s)| (*i, *s))),
            vec!["b".to_string()]
        );
    }

    #[test]
    fn poll_increments_and_terminal_rejects_events() {
        let mut t = Ticket::open("tk", TicketKind::Upsert, vec!["a".into()], t0());
        t.apply(TicketEvent::Polled).unwrap();
        t.apply(TicketEvent::Polled).unwrap();
        assert_eq!(t.poll_count, 2);

        t.apply(TicketEvent::Finished).unwrap();
        assert_eq!(t.state, TicketState::Resolved);

        let err = t.apply(TicketEvent::DeadlineExceeded).unwrap_err();
        assert_eq!(err.from, TicketState::Resolved);
        assert!(err.to_string().contains("illegal ticket transition"));
    }

    #[test]
    fn expiry_is_strict() {
        let t = Ticket::open("tk", TicketKind::Removal, vec![], t0());
        let deadline = Duration::minutes(60);
        assert!(!t.is_expired(t0() + Duration::minutes(60), deadline));
        assert!(t.is_expired(t0() + Duration::minutes(61), deadline));
    }
}
