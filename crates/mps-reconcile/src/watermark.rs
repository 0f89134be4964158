//! Sync watermark
//!
//! # Purpose
//!
//! The watermark is the most recent `updated_at` known to be reflected on the
//! marketplace. The incremental pass reads every row strictly newer than it,
//! computes a *candidate* from the rows it saw, and commits the candidate only
//! after both batch submissions of that pass succeeded.
//!
//! # Invariants
//!
//! - **Non-decreasing**: `advance` never moves the watermark backward.
//! - **Advances only on commit**: computing a candidate has no effect on the
//!   committed value.
//! - **Pure, no IO**: persistence is the caller's job; call `advance` only
//!   after the store accepted the new value.

use chrono::{DateTime, Utc};
use mps_catalog::LocalProduct;

/// Outcome of offering a candidate to the watermark.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatermarkAdvance {
    /// Candidate is strictly newer; the watermark moved (on `advance`).
    Advanced,
    /// Candidate equals the committed value.
    Unchanged,
    /// Candidate is older than the committed value and was refused.
    Regressed {
        committed: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

impl WatermarkAdvance {
    pub fn is_advanced(&self) -> bool {
        matches!(self, WatermarkAdvance::Advanced)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, WatermarkAdvance::Regressed { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncWatermark {
    committed: DateTime<Utc>,
}

impl Default for SyncWatermark {
    fn default() -> Self {
        Self::epoch()
    }
}

impl SyncWatermark {
    pub fn new(committed: DateTime<Utc>) -> Self {
        Self { committed }
    }

    /// Zero timestamp. Forces a full resync on first run.
    pub fn epoch() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn committed(&self) -> DateTime<Utc> {
        self.committed
    }

    /// Max `updated_at` over `rows`, never below the committed value.
    pub fn candidate<'a, I>(&self, rows: I) -> DateTime<Utc>
    where
        I: IntoIterator<Item = &'a LocalProduct>,
    {
        rows.into_iter()
            .map(|p| p.updated_at)
            .fold(self.committed, |acc, ts| acc.max(ts))
    }

    /// Read-only check; `advance` commits.
    pub fn check(&self, candidate: DateTime<Utc>) -> WatermarkAdvance {
        if candidate > self.committed {
            WatermarkAdvance::Advanced
        } else if candidate == self.committed {
            WatermarkAdvance::Unchanged
        } else {
            WatermarkAdvance::Regressed {
                committed: self.committed,
                got: candidate,
            }
        }
    }

    pub fn advance(&mut self, candidate: DateTime<Utc>) -> WatermarkAdvance {
        let result = self.check(candidate);
        if result.is_advanced() {
            self.committed = candidate;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mps_catalog::Dimensions;

    fn at(mins: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap() + Duration::minutes(mins)
    }

    fn row(updated: DateTime<Utc>) -> LocalProduct {
        LocalProduct {
            id: "x".into(),
            name: "x".into(),
            category: String::new(),
            detail: String::new(),
            ean: String::new(),
            price_cents: 1,
            dimensions: Dimensions::default(),
            quantity: 1,
            commercialize: true,
            listed: true,
            images: vec![],
            updated_at: updated,
            deleted_at: None,
        }
    }

    #[test]
    fn default_is_epoch() {
        assert_eq!(SyncWatermark::default().committed(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn candidate_is_max_updated_at() {
        let wm = SyncWatermark::new(at(0));
        let rows = vec![row(at(5)), row(at(9)), row(at(3))];
        assert_eq!(wm.candidate(&rows), at(9));
    }

    #[test]
    fn candidate_of_empty_batch_is_committed() {
        let wm = SyncWatermark::new(at(4));
        assert_eq!(wm.candidate(&Vec::<LocalProduct>::new()), at(4));
    }

    #[test]
    fn candidate_does_not_move_committed() {
        let wm = SyncWatermark::new(at(0));
        let _ = wm.candidate(&vec![row(at(10))]);
        assert_eq!(wm.committed(), at(0));
    }

    #[test]
    fn advance_is_monotonic() {
        let mut wm = SyncWatermark::new(at(10));
        assert!(wm.advance(at(12)).is_advanced());
        assert_eq!(wm.advance(at(12)), WatermarkAdvance::Unchanged);

        let r = wm.advance(at(11));
        assert!(r.is_rejected());
        assert_eq!(wm.committed(), at(12));
    }
}
