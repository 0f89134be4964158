use std::collections::{BTreeMap, BTreeSet};

use mps_catalog::{LocalProduct, RemovalCandidate, RemovalReason, Translator};

use crate::SyncBatch;

/// Split changed rows into an upsert batch and a removal batch.
///
/// - listed and not soft-deleted -> translated upsert
/// - soft-deleted -> removal (`Deleted`)
/// - unlisted -> removal (`Unlisted`)
///
/// Output is ordered by product ID; a duplicated ID keeps its last row.
pub fn partition(translator: &Translator, rows: &[LocalProduct]) -> SyncBatch {
    let mut by_id: BTreeMap<&str, &LocalProduct> = BTreeMap::new();
    for p in rows {
        by_id.insert(p.id.as_str(), p);
    }

    let mut batch = SyncBatch::default();
    for p in by_id.values() {
        match p.removal_reason() {
            None => batch.upserts.push(translator.to_remote(p)),
            Some(reason) => batch
                .removals
                .push(RemovalCandidate::new(translator.to_removal_id(p), reason)),
        }
    }
    batch
}

/// Partition for an explicit ID retry.
///
/// IDs the store no longer returns are removed as `NeverExisted`.
pub fn partition_for_retry(
    translator: &Translator,
    requested: &[String],
    found: &[LocalProduct],
) -> SyncBatch {
    let mut batch = partition(translator, found);

    let known: BTreeSet<&str> = found.iter().map(|p| p.id.as_str()).collect();
    let missing: BTreeSet<&str> = requested
        .iter()
        .map(|s| s.as_str())
        .filter(|id| !known.contains(id))
        .collect();

    for id in missing {
        batch
            .removals
            .push(RemovalCandidate::new(id, RemovalReason::NeverExisted));
    }
    batch.removals.sort();
    batch
}
