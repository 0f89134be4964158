use std::collections::BTreeMap;

use mps_catalog::{LocalProduct, RemoteListing, RemovalCandidate, RemovalReason, Translator};

use crate::AuditReport;

/// Full-catalog comparison between the local store and the marketplace listing.
///
/// - An eligible local row (listed, not soft-deleted) needs an update unless
///   the marketplace has an *active* listing that matches it field-wise.
/// - An active marketplace listing needs removal when the local row is
///   missing (`NeverExisted`), soft-deleted (`Deleted`) or unlisted (`Unlisted`).
/// - Inactive listings are already gone and never produce a removal.
///
/// Output is ordered by product ID.
pub fn audit(
    translator: &Translator,
    local: &[LocalProduct],
    remote: &[RemoteListing],
) -> AuditReport {
    let mut report = AuditReport {
        local_total: local.len(),
        ..AuditReport::default()
    };

    let mut remote_by_id: BTreeMap<&str, &RemoteListing> = BTreeMap::new();
    for r in remote {
        if r.active {
            report.remote_active += 1;
        } else {
            report.remote_inactive += 1;
        }
        // A duplicated listing counts as active if any copy is.
        match remote_by_id.get(r.id.as_str()) {
            Some(prev) if prev.active && !r.active => {}
            _ => {
                remote_by_id.insert(r.id.as_str(), r);
            }
        }
    }

    let mut local_by_id: BTreeMap<&str, &LocalProduct> = BTreeMap::new();
    for p in local {
        local_by_id.insert(p.id.as_str(), p);
    }

    // 1) Local rows the marketplace does not reflect.
    for p in local_by_id.values() {
        if !p.is_eligible_for_listing() {
            continue;
        }
        report.local_eligible += 1;

        let wanted = translator.to_remote(p);
        let in_sync = remote_by_id
            .get(p.id.as_str())
            .map(|r| r.active && r.matches(&wanted))
            .unwrap_or(false);
        if !in_sync {
            report.updates.push(wanted);
        }
    }

    // 2) Active listings that should not be there.
    for (id, r) in &remote_by_id {
        if !r.active {
            continue;
        }
        let reason = match local_by_id.get(id) {
            None => Some(RemovalReason::NeverExisted),
            Some(p) => p.removal_reason(),
        };
        if let Some(reason) = reason {
            report.removals.push(RemovalCandidate::new(*id, reason));
        }
    }

    report
}
