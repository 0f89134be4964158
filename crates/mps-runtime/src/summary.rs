use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Sync,
    Tickets,
    Audit,
    /// Debounced flush of manually triggered IDs.
    Trigger,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Sync => "sync",
            PassKind::Tickets => "tickets",
            PassKind::Audit => "audit",
            PassKind::Trigger => "trigger",
        }
    }
}

/// Outcome of one pass, logged once and broadcast to subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub pass_id: Uuid,
    pub kind: PassKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Rows returned by the store (changed rows, or the full catalog for audits).
    pub changed: usize,
    /// Products carried by accepted upsert submissions.
    pub upserted: usize,
    /// Products carried by accepted removal submissions.
    pub removed: usize,
    /// IDs resubmitted from the retry queue.
    pub retried: usize,
    pub abandoned: usize,
    pub resolved: usize,
    /// Receipt items outside the accepted status set.
    pub failed_items: usize,
    /// IDs taken off the retry queue after repeated rejections.
    pub dropped: usize,
    /// Submissions the marketplace refused outright.
    pub failed_submissions: usize,
    pub watermark_advanced: bool,
    /// Removal counts keyed by reason.
    pub removal_reasons: BTreeMap<String, usize>,
    /// Set when the pass decided not to run.
    pub skipped: Option<String>,
}

impl PassSummary {
    pub fn begin(kind: PassKind) -> Self {
        Self {
            pass_id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
            finished_at: None,
            changed: 0,
            upserted: 0,
            removed: 0,
            retried: 0,
            abandoned: 0,
            resolved: 0,
            failed_items: 0,
            dropped: 0,
            failed_submissions: 0,
            watermark_advanced: false,
            removal_reasons: BTreeMap::new(),
            skipped: None,
        }
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skipped = Some(reason.into());
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.is_some()
    }

    /// Stamp the end time and emit the one-line summary.
    pub fn finish(mut self, tz: Tz) -> Self {
        let now = Utc::now();
        self.finished_at = Some(now);
        let elapsed_ms = (now - self.started_at).num_milliseconds();

        info!(
            pass = self.kind.as_str(),
            pass_id = %self.pass_id,
            started = %self.started_at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z"),
            elapsed_ms,
            changed = self.changed,
            upserted = self.upserted,
            removed = self.removed,
            retried = self.retried,
            abandoned = self.abandoned,
            resolved = self.resolved,
            failed_items = self.failed_items,
            dropped = self.dropped,
            failed_submissions = self.failed_submissions,
            watermark_advanced = self.watermark_advanced,
            skipped = self.skipped.as_deref().unwrap_or(""),
            "pass complete"
        );
        self
    }
}
