//! Reconciliation engine.
//!
//! Every pass takes the single state lock for its whole duration. Inside a
//! pass, upsert and removal submissions (and the two audit fetches) run
//! concurrently and are joined before any state is committed.
//!
//! Readers never take the lock: each pass publishes a copy of the state on a
//! `watch` channel when it releases it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures_util::future::join_all;
use mps_catalog::{CatalogReader, Translator, TranslatorConfig, WatermarkStore};
use mps_config::SyncConfig;
use mps_reconcile::{
    audit, partition, partition_for_retry, SyncBatch, SyncWatermark, Ticket, TicketKind,
    TicketRegistry, WatermarkAdvance,
};
use mps_remote::{MarketplaceApi, RemoteError, TicketAck};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::summary::{PassKind, PassSummary};
use crate::trigger::TriggerInbox;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub translator: TranslatorConfig,
    /// Open tickets strictly older than this are abandoned and resubmitted.
    pub ticket_deadline: chrono::Duration,
    /// Resubmit audit drift instead of only reporting it.
    pub audit_corrective: bool,
    pub display_tz: Tz,
    /// Receipt rejections after which an ID is dropped from the retry queue
    /// and left to the audit.
    pub max_item_rejections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            translator: TranslatorConfig::default(),
            ticket_deadline: chrono::Duration::minutes(60),
            audit_corrective: true,
            display_tz: chrono_tz::America::Sao_Paulo,
            max_item_rejections: 3,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(cfg: &SyncConfig) -> Result<Self> {
        Ok(Self {
            translator: cfg.storefront.clone(),
            ticket_deadline: chrono::Duration::from_std(cfg.engine.ticket_deadline())
                .context("engine.ticket_deadline_secs out of range")?,
            audit_corrective: cfg.engine.audit_corrective,
            display_tz: cfg.display.tz()?,
            max_item_rejections: cfg.engine.max_item_rejections,
        })
    }
}

/// Everything the passes mutate. Guarded by one lock.
#[derive(Debug, Default)]
struct EngineState {
    watermark: SyncWatermark,
    tickets: TicketRegistry,
    retry: BTreeSet<String>,
    /// Consecutive receipt rejections per product ID.
    rejections: BTreeMap<String, u32>,
    last: BTreeMap<PassKind, PassSummary>,
}

impl EngineState {
    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            watermark: self.watermark.committed(),
            open_tickets: self.tickets.iter().cloned().collect(),
            queued_retries: self.retry.iter().cloned().collect(),
            pending_triggers: 0,
            last_passes: self.last.values().cloned().collect(),
        }
    }

    /// Count one rejection for `id`. Returns the new count and whether it hit
    /// `limit`; the count resets when it does.
    fn reject(&mut self, id: &str, limit: u32) -> (u32, bool) {
        let n = self.rejections.entry(id.to_string()).or_insert(0);
        *n += 1;
        let count = *n;
        if count >= limit {
            self.rejections.remove(id);
            (count, true)
        } else {
            (count, false)
        }
    }
}

/// Read-only view for status endpoints and the CLI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub watermark: DateTime<Utc>,
    pub open_tickets: Vec<Ticket>,
    pub queued_retries: Vec<String>,
    pub pending_triggers: usize,
    pub last_passes: Vec<PassSummary>,
}

#[derive(Debug, Default)]
struct SubmitOutcome {
    upserted: usize,
    removed: usize,
    failed_submissions: usize,
    /// IDs from refused submissions, in batch order.
    failed_ids: Vec<String>,
}

impl SubmitOutcome {
    fn all_ok(&self) -> bool {
        self.failed_submissions == 0
    }

    fn apply_to(&self, summary: &mut PassSummary) {
        summary.upserted += self.upserted;
        summary.removed += self.removed;
        summary.failed_submissions += self.failed_submissions;
    }
}

pub struct Engine {
    catalog: Arc<dyn CatalogReader>,
    remote: Arc<dyn MarketplaceApi>,
    watermarks: Arc<dyn WatermarkStore>,
    translator: Translator,
    cfg: EngineConfig,
    state: Mutex<EngineState>,
    triggers: TriggerInbox,
    events: broadcast::Sender<PassSummary>,
    status: watch::Sender<EngineSnapshot>,
}

impl Engine {
    /// Build an engine whose watermark starts at the stored value.
    pub async fn load(
        catalog: Arc<dyn CatalogReader>,
        remote: Arc<dyn MarketplaceApi>,
        watermarks: Arc<dyn WatermarkStore>,
        cfg: EngineConfig,
    ) -> Result<Self> {
        let committed = watermarks
            .load()
            .await
            .context("failed to load sync watermark")?;
        info!(
            watermark = %committed.with_timezone(&cfg.display_tz),
            "engine loaded"
        );
        Ok(Self::with_watermark(
            catalog, remote, watermarks, cfg, committed,
        ))
    }

    pub fn with_watermark(
        catalog: Arc<dyn CatalogReader>,
        remote: Arc<dyn MarketplaceApi>,
        watermarks: Arc<dyn WatermarkStore>,
        cfg: EngineConfig,
        committed: DateTime<Utc>,
    ) -> Self {
        let (events, _rx) = broadcast::channel(256);
        let state = EngineState {
            watermark: SyncWatermark::new(committed),
            ..EngineState::default()
        };
        let (status, _rx) = watch::channel(state.snapshot());
        Self {
            catalog,
            remote,
            watermarks,
            translator: Translator::new(cfg.translator.clone()),
            cfg,
            state: Mutex::new(state),
            triggers: TriggerInbox::new(),
            events,
            status,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn triggers(&self) -> &TriggerInbox {
        &self.triggers
    }

    /// Pass summaries as they complete. Lagging receivers drop old entries.
    pub fn subscribe(&self) -> broadcast::Receiver<PassSummary> {
        self.events.subscribe()
    }

    /// State as of the last finished pass. Does not wait for a running one.
    pub fn snapshot(&self) -> EngineSnapshot {
        let mut snap = self.status.borrow().clone();
        snap.pending_triggers = self.triggers.len();
        snap
    }

    /// Wait for any running pass and return the final committed watermark.
    /// Called once during shutdown, after the scheduler stopped.
    pub async fn quiesce(&self) -> DateTime<Utc> {
        let st = self.state.lock().await;
        let wm = st.watermark.committed();
        info!(
            open_tickets = st.tickets.len(),
            queued_retries = st.retry.len(),
            watermark = %wm,
            "engine quiesced"
        );
        wm
    }

    pub async fn run_pass(&self, kind: PassKind) -> Result<PassSummary> {
        self.run_at(kind, Utc::now()).await
    }

    async fn run_at(&self, kind: PassKind, now: DateTime<Utc>) -> Result<PassSummary> {
        let summary = PassSummary::begin(kind);
        let span = info_span!("pass", kind = kind.as_str(), pass_id = %summary.pass_id);
        self.run_locked(summary, now).instrument(span).await
    }

    /// Hold the lock for the whole pass, then publish whatever state the pass
    /// left behind, including after an error.
    async fn run_locked(&self, summary: PassSummary, now: DateTime<Utc>) -> Result<PassSummary> {
        let kind = summary.kind;
        let mut st = self.state.lock().await;
        let out = match kind {
            PassKind::Sync => self.sync_inner(&mut st, summary).await,
            PassKind::Tickets => self.tickets_inner(&mut st, summary, now).await,
            PassKind::Audit => self.audit_inner(&mut st, summary).await,
            PassKind::Trigger => self.trigger_inner(&mut st, summary).await,
        };
        self.status.send_replace(st.snapshot());
        out
    }

    // -----------------------------------------------------------------------
    // Incremental sync
    // -----------------------------------------------------------------------

    /// Submit everything changed since the committed watermark; advance the
    /// watermark only if both submissions were accepted.
    pub async fn run_sync_pass(&self) -> Result<PassSummary> {
        self.run_at(PassKind::Sync, Utc::now()).await
    }

    async fn sync_inner(
        &self,
        st: &mut EngineState,
        mut summary: PassSummary,
    ) -> Result<PassSummary> {
        let since = st.watermark.committed();

        let rows = self
            .catalog
            .changed_since(since)
            .await
            .context("changed_since failed")?;
        summary.changed = rows.len();

        if rows.is_empty() {
            debug!(since = %since, "no local changes");
            return Ok(self.record(st, summary));
        }

        let batch = partition(&self.translator, &rows);
        summary.removal_reasons = reason_counts(&batch);
        let candidate = st.watermark.candidate(&rows);

        let outcome = self.submit(st, &batch).await;
        outcome.apply_to(&mut summary);

        if !outcome.all_ok() {
            warn!(
                failed_submissions = outcome.failed_submissions,
                watermark = %since,
                "watermark held; changed rows will be reconsidered next pass"
            );
            return Ok(self.record(st, summary));
        }

        match st.watermark.check(candidate) {
            WatermarkAdvance::Advanced => {
                self.watermarks
                    .commit(candidate)
                    .await
                    .context("watermark commit failed")?;
                st.watermark.advance(candidate);
                summary.watermark_advanced = true;
            }
            WatermarkAdvance::Unchanged => {}
            WatermarkAdvance::Regressed { committed, got } => {
                warn!(%committed, %got, "watermark candidate older than committed value; ignored");
            }
        }

        Ok(self.record(st, summary))
    }

    // -----------------------------------------------------------------------
    // Ticket resolution
    // -----------------------------------------------------------------------

    pub async fn run_ticket_pass(&self) -> Result<PassSummary> {
        self.run_ticket_pass_at(Utc::now()).await
    }

    /// Ticket pass with an explicit clock reading for deadline checks.
    pub async fn run_ticket_pass_at(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        self.run_at(PassKind::Tickets, now).await
    }

    async fn tickets_inner(
        &self,
        st: &mut EngineState,
        mut summary: PassSummary,
        now: DateTime<Utc>,
    ) -> Result<PassSummary> {
        // 1) Deadline sweep.
        let expired = st.tickets.sweep_expired(now, self.cfg.ticket_deadline);
        for t in &expired {
            warn!(
                ticket = %t.id,
                kind = t.kind.as_str(),
                polls = t.poll_count,
                products = t.product_ids.len(),
                age_secs = t.age(now).num_seconds(),
                "ticket deadline exceeded; abandoning and resubmitting"
            );
        }
        summary.abandoned = expired.len();
        for t in expired {
            st.retry.extend(t.product_ids);
        }

        // 2) Poll the rest.
        let open: Vec<(String, TicketKind)> =
            st.tickets.iter().map(|t| (t.id.clone(), t.kind)).collect();
        let receipts = join_all(open.iter().map(|(id, _)| self.remote.fetch_receipt(id))).await;

        for ((id, kind), receipt) in open.into_iter().zip(receipts) {
            match receipt {
                Err(e) => {
                    warn!(ticket = %id, error = %e, "receipt fetch failed; ticket stays open");
                }
                Ok(r) if !r.finished => {
                    let polls = st.tickets.record_poll(&id).unwrap_or_default();
                    debug!(ticket = %id, polls, "ticket not finished");
                }
                Ok(r) => {
                    let failing = kind.failing_ids(r.statuses());
                    if let Some(t) = st.tickets.resolve(&id) {
                        for pid in t.product_ids.iter().filter(|p| !failing.contains(*p)) {
                            st.rejections.remove(pid);
                        }
                    }
                    summary.resolved += 1;
                    if failing.is_empty() {
                        debug!(ticket = %id, items = r.results.len(), "ticket resolved");
                    } else {
                        for item in r.results.iter().filter(|i| !kind.accepts(i.status)) {
                            warn!(
                                ticket = %id,
                                product_id = %item.product_id,
                                status = item.status,
                                message = %item.message,
                                "receipt item rejected"
                            );
                        }
                        summary.failed_items += failing.len();
                        for pid in failing {
                            let (count, exhausted) = st.reject(&pid, self.cfg.max_item_rejections);
                            if exhausted {
                                warn!(
                                    product_id = %pid,
                                    rejections = count,
                                    "item keeps being rejected; dropped from retry queue until the next audit"
                                );
                                summary.dropped += 1;
                            } else {
                                st.retry.insert(pid);
                            }
                        }
                    }
                }
            }
        }

        // 3) Resubmit everything queued.
        self.flush_retry(st, &mut summary).await?;

        Ok(self.record(st, summary))
    }

    // -----------------------------------------------------------------------
    // Consistency audit
    // -----------------------------------------------------------------------

    /// Full-catalog diff. Skipped while any ticket is open. Never touches the
    /// watermark.
    pub async fn run_audit_pass(&self) -> Result<PassSummary> {
        self.run_at(PassKind::Audit, Utc::now()).await
    }

    async fn audit_inner(
        &self,
        st: &mut EngineState,
        mut summary: PassSummary,
    ) -> Result<PassSummary> {
        if !st.tickets.is_empty() {
            info!(open_tickets = st.tickets.len(), "audit skipped; tickets outstanding");
            let summary = summary.skip("tickets outstanding");
            return Ok(self.record(st, summary));
        }

        let (local, remote) = tokio::join!(
            self.catalog.all_records(),
            self.remote.fetch_remote_catalog()
        );
        let local = local.context("local catalog fetch failed")?;
        let remote = remote.context("remote catalog fetch failed")?;
        summary.changed = local.len();

        let report = audit(&self.translator, &local, &remote);
        info!(
            local_total = report.local_total,
            local_eligible = report.local_eligible,
            remote_active = report.remote_active,
            remote_inactive = report.remote_inactive,
            updates = report.updates.len(),
            removals = report.removals.len(),
            "audit diff"
        );

        if report.is_clean() {
            return Ok(self.record(st, summary));
        }

        let batch = report.into_batch();
        summary.removal_reasons = reason_counts(&batch);
        for (reason, count) in &summary.removal_reasons {
            info!(reason = %reason, count, "audit removal reason");
        }

        if !self.cfg.audit_corrective {
            warn!(
                updates = batch.upserts.len(),
                removals = batch.removals.len(),
                "catalog drift detected; diagnostic mode, nothing submitted"
            );
            return Ok(self.record(st, summary));
        }

        let outcome = self.submit(st, &batch).await;
        outcome.apply_to(&mut summary);
        // Audit drift is rediscovered next audit; refused submissions are not queued.
        Ok(self.record(st, summary))
    }

    // -----------------------------------------------------------------------
    // Manual triggers
    // -----------------------------------------------------------------------

    /// Move every triggered ID into the retry queue and resubmit the queue.
    pub async fn run_trigger_pass(&self) -> Result<PassSummary> {
        self.run_at(PassKind::Trigger, Utc::now()).await
    }

    async fn trigger_inner(
        &self,
        st: &mut EngineState,
        mut summary: PassSummary,
    ) -> Result<PassSummary> {
        let ids = self.triggers.drain();
        if ids.is_empty() {
            let summary = summary.skip("no pending triggers");
            return Ok(self.record(st, summary));
        }
        debug!(count = ids.len(), "draining trigger inbox");
        st.retry.extend(ids);
        self.flush_retry(st, &mut summary).await?;
        Ok(self.record(st, summary))
    }

    // -----------------------------------------------------------------------
    // Shared submission path
    // -----------------------------------------------------------------------

    /// Resubmit the retry queue by ID, bypassing the watermark. IDs whose
    /// submission is refused stay queued; a store error keeps the whole queue.
    /// Anything requeued during the submission itself (a reused ticket ID)
    /// is kept as well.
    async fn flush_retry(&self, st: &mut EngineState, summary: &mut PassSummary) -> Result<()> {
        if st.retry.is_empty() {
            return Ok(());
        }
        let ids: Vec<String> = st.retry.iter().cloned().collect();
        let found = self
            .catalog
            .by_ids(&ids)
            .await
            .context("by_ids failed; retry queue kept")?;

        let batch = partition_for_retry(&self.translator, &ids, &found);
        for (reason, n) in reason_counts(&batch) {
            *summary.removal_reasons.entry(reason).or_insert(0) += n;
        }

        let outcome = self.submit(st, &batch).await;
        outcome.apply_to(summary);
        summary.retried += ids.len() - outcome.failed_ids.len();

        let refused: BTreeSet<String> = outcome.failed_ids.into_iter().collect();
        let submitted: BTreeSet<&String> = ids.iter().collect();
        st.retry.retain(|id| refused.contains(id) || !submitted.contains(id));
        if !refused.is_empty() {
            warn!(queued = refused.len(), "retry submission refused; IDs stay queued");
        }
        Ok(())
    }

    async fn submit(&self, st: &mut EngineState, batch: &SyncBatch) -> SubmitOutcome {
        let upsert_ids = batch.upsert_ids();
        let removal_ids = batch.removal_ids();

        let (upserts, removals) = tokio::join!(
            self.remote.submit_upserts(&batch.upserts),
            self.remote.submit_removals(&removal_ids)
        );

        let now = Utc::now();
        let mut out = SubmitOutcome::default();
        register_submission(st, &mut out, TicketKind::Upsert, upsert_ids, upserts, now);
        register_submission(st, &mut out, TicketKind::Removal, removal_ids, removals, now);
        out
    }

    fn record(&self, st: &mut EngineState, summary: PassSummary) -> PassSummary {
        let summary = summary.finish(self.cfg.display_tz);
        st.last.insert(summary.kind, summary.clone());
        // No subscribers is fine.
        let _ = self.events.send(summary.clone());
        summary
    }
}

fn register_submission(
    st: &mut EngineState,
    out: &mut SubmitOutcome,
    kind: TicketKind,
    ids: Vec<String>,
    result: Result<Option<TicketAck>, RemoteError>,
    now: DateTime<Utc>,
) {
    match result {
        Ok(None) => {}
        Ok(Some(ack)) => {
            debug!(ticket = %ack.id, kind = kind.as_str(), products = ids.len(), "ticket issued");
            match kind {
                TicketKind::Upsert => out.upserted += ids.len(),
                TicketKind::Removal => out.removed += ids.len(),
            }
            if let Some(prev) = st.tickets.register(Ticket::open(ack.id, kind, ids, now)) {
                warn!(ticket = %prev.id, "ticket id reused while open; previous products requeued");
                st.retry.extend(prev.product_ids);
            }
        }
        Err(e) => {
            warn!(
                kind = kind.as_str(),
                products = ids.len(),
                status = e.status(),
                error = %e,
                "batch submission failed"
            );
            out.failed_submissions += 1;
            out.failed_ids.extend(ids);
        }
    }
}

fn reason_counts(batch: &SyncBatch) -> BTreeMap<String, usize> {
    batch
        .removal_counts()
        .into_iter()
        .map(|(reason, n)| (reason.as_str().to_string(), n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reject_counts_up_to_limit_then_resets() {
        let mut st = EngineState::default();
        assert_eq!(st.reject("a", 3), (1, false));
        assert_eq!(st.reject("a", 3), (2, false));
        assert_eq!(st.reject("b", 3), (1, false));
        assert_eq!(st.reject("a", 3), (3, true));
        assert!(!st.rejections.contains_key("a"));
        assert_eq!(st.reject("a", 3), (1, false));
    }
}
