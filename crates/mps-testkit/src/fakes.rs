use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use mps_catalog::{CatalogReader, LocalProduct, RemoteListing, RemoteProduct, WatermarkStore};
use mps_remote::{MarketplaceApi, Receipt, ReceiptItem, RemoteError, TicketAck};
use tokio::sync::Notify;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Local catalog held in memory, keyed by product ID.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    rows: Mutex<BTreeMap<String, LocalProduct>>,
    failing: AtomicBool,
    reads: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new(rows: impl IntoIterator<Item = LocalProduct>) -> Self {
        let c = Self::default();
        for p in rows {
            c.put(p);
        }
        c
    }

    /// Insert or replace a row.
    pub fn put(&self, p: LocalProduct) {
        lock(&self.rows).insert(p.id.clone(), p);
    }

    /// Hard-delete a row, as if it never existed.
    pub fn purge(&self, id: &str) {
        lock(&self.rows).remove(id);
    }

    /// Make every read fail until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn guard(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("catalog store unavailable");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl CatalogReader for InMemoryCatalog {
    async fn changed_since(&self, watermark: DateTime<Utc>) -> Result<Vec<LocalProduct>> {
        self.guard()?;
        let mut out: Vec<LocalProduct> = lock(&self.rows)
            .values()
            .filter(|p| p.updated_at > watermark)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn all_records(&self) -> Result<Vec<LocalProduct>> {
        self.guard()?;
        Ok(lock(&self.rows).values().cloned().collect())
    }

    async fn by_ids(&self, ids: &[String]) -> Result<Vec<LocalProduct>> {
        self.guard()?;
        let rows = lock(&self.rows);
        Ok(ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }
}

// ---------------------------------------------------------------------------
// Watermark store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct InMemoryWatermarkStore {
    value: Mutex<DateTime<Utc>>,
    commits: Mutex<Vec<DateTime<Utc>>>,
    failing: AtomicBool,
}

impl Default for InMemoryWatermarkStore {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl InMemoryWatermarkStore {
    pub fn new(initial: DateTime<Utc>) -> Self {
        Self {
            value: Mutex::new(initial),
            commits: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> DateTime<Utc> {
        *lock(&self.value)
    }

    /// Every value successfully committed, in order.
    pub fn commits(&self) -> Vec<DateTime<Utc>> {
        lock(&self.commits).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn load(&self) -> Result<DateTime<Utc>> {
        Ok(self.current())
    }

    async fn commit(&self, watermark: DateTime<Utc>) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("watermark store unavailable");
        }
        *lock(&self.value) = watermark;
        lock(&self.commits).push(watermark);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Marketplace
// ---------------------------------------------------------------------------

/// A batch the fake accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedTicket {
    pub id: String,
    pub removal: bool,
    pub product_ids: Vec<String>,
}

/// Parks one upsert submission until released.
#[derive(Clone, Debug, Default)]
pub struct SubmissionGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl SubmissionGate {
    /// Resolves once the held submission has reached the marketplace.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Scriptable marketplace.
///
/// Accepted batches get sequential ticket IDs (`T-1`, `T-2`, ...). Receipts
/// for tickets without a scripted answer report `finished=false`, unless
/// auto-finish is on, in which case every item comes back 200 apart from
/// the products marked with `reject_always`.
#[derive(Debug, Default)]
pub struct FakeMarketplace {
    listings: Mutex<Vec<RemoteListing>>,
    upsert_calls: Mutex<Vec<Vec<RemoteProduct>>>,
    removal_calls: Mutex<Vec<Vec<String>>>,
    tickets: Mutex<Vec<SubmittedTicket>>,
    scripted: Mutex<BTreeMap<String, Receipt>>,
    broken_receipts: Mutex<BTreeSet<String>>,
    always_rejected: Mutex<BTreeMap<String, u16>>,
    fixed_ticket: Mutex<Option<String>>,
    upsert_gate: Mutex<Option<SubmissionGate>>,
    receipt_calls: AtomicUsize,
    next_ticket: AtomicUsize,
    fail_upserts: AtomicBool,
    fail_removals: AtomicBool,
    fail_catalog: AtomicBool,
    auto_finish: AtomicBool,
}

impl FakeMarketplace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listings(listings: Vec<RemoteListing>) -> Self {
        let m = Self::default();
        *lock(&m.listings) = listings;
        m
    }

    pub fn set_listings(&self, listings: Vec<RemoteListing>) {
        *lock(&self.listings) = listings;
    }

    pub fn fail_upserts(&self, on: bool) {
        self.fail_upserts.store(on, Ordering::SeqCst);
    }

    pub fn fail_removals(&self, on: bool) {
        self.fail_removals.store(on, Ordering::SeqCst);
    }

    pub fn fail_catalog(&self, on: bool) {
        self.fail_catalog.store(on, Ordering::SeqCst);
    }

    pub fn auto_finish(&self, on: bool) {
        self.auto_finish.store(on, Ordering::SeqCst);
    }

    /// Script a finished receipt for `ticket`: every product 200 except the
    /// listed overrides.
    pub fn finish_ticket(&self, ticket: &str, overrides: &[(&str, u16)]) {
        let ids = self
            .ticket(ticket)
            .map(|t| t.product_ids)
            .unwrap_or_default();
        let mut results: Vec<ReceiptItem> = ids
            .iter()
            .map(|id| {
                let status = overrides
                    .iter()
                    .find(|(o, _)| *o == id.as_str())
                    .map(|(_, s)| *s)
                    .unwrap_or(200);
                item(id, status)
            })
            .collect();
        for (id, status) in overrides {
            if !ids.iter().any(|x| x.as_str() == *id) {
                results.push(item(id, *status));
            }
        }
        lock(&self.scripted).insert(ticket.to_string(), receipt(true, results));
    }

    /// Auto-finished receipts report `status` for `product_id`, every time.
    pub fn reject_always(&self, product_id: &str, status: u16) {
        lock(&self.always_rejected).insert(product_id.to_string(), status);
    }

    /// Answer every accepted batch with the same ticket ID.
    pub fn reuse_ticket_id(&self, id: &str) {
        *lock(&self.fixed_ticket) = Some(id.to_string());
    }

    /// Hold the next upsert submission until the returned gate is released.
    pub fn hold_next_upsert(&self) -> SubmissionGate {
        let gate = SubmissionGate::default();
        *lock(&self.upsert_gate) = Some(gate.clone());
        gate
    }

    /// Make receipt fetches for `ticket` fail with a transport error.
    pub fn break_receipt(&self, ticket: &str) {
        lock(&self.broken_receipts).insert(ticket.to_string());
    }

    pub fn upsert_calls(&self) -> Vec<Vec<RemoteProduct>> {
        lock(&self.upsert_calls).clone()
    }

    pub fn removal_calls(&self) -> Vec<Vec<String>> {
        lock(&self.removal_calls).clone()
    }

    /// Upserted IDs across all calls, in call order.
    pub fn upserted_ids(&self) -> Vec<String> {
        lock(&self.upsert_calls)
            .iter()
            .flat_map(|c| c.iter().map(|p| p.id.clone()))
            .collect()
    }

    pub fn removed_ids(&self) -> Vec<String> {
        lock(&self.removal_calls).iter().flatten().cloned().collect()
    }

    /// Total number of submission requests, accepted or refused.
    pub fn submission_count(&self) -> usize {
        lock(&self.upsert_calls).len() + lock(&self.removal_calls).len()
    }

    pub fn receipt_calls(&self) -> usize {
        self.receipt_calls.load(Ordering::SeqCst)
    }

    pub fn tickets(&self) -> Vec<SubmittedTicket> {
        lock(&self.tickets).clone()
    }

    /// Latest batch issued under `id`.
    pub fn ticket(&self, id: &str) -> Option<SubmittedTicket> {
        lock(&self.tickets).iter().rev().find(|t| t.id == id).cloned()
    }

    fn issue(&self, removal: bool, product_ids: Vec<String>) -> TicketAck {
        let n = self.next_ticket.fetch_add(1, Ordering::SeqCst) + 1;
        let id = lock(&self.fixed_ticket)
            .clone()
            .unwrap_or_else(|| format!("T-{n}"));
        lock(&self.tickets).push(SubmittedTicket {
            id: id.clone(),
            removal,
            product_ids,
        });
        TicketAck {
            id,
            results: Vec::new(),
        }
    }
}

fn item(id: &str, status: u16) -> ReceiptItem {
    ReceiptItem {
        product_id: id.to_string(),
        status,
        message: if status < 300 { "ok" } else { "rejected" }.to_string(),
        warning_messages: Vec::new(),
    }
}

fn receipt(finished: bool, results: Vec<ReceiptItem>) -> Receipt {
    Receipt {
        finished,
        quantity: results.len() as u32,
        request_timestamp: None,
        results,
    }
}

fn refused(status: u16) -> RemoteError {
    RemoteError::Http {
        status,
        body: r#"{"error":"service unavailable"}"#.to_string(),
    }
}

#[async_trait::async_trait]
impl MarketplaceApi for FakeMarketplace {
    async fn submit_upserts(
        &self,
        products: &[RemoteProduct],
    ) -> Result<Option<TicketAck>, RemoteError> {
        if products.is_empty() {
            return Ok(None);
        }
        let gate = lock(&self.upsert_gate).take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        lock(&self.upsert_calls).push(products.to_vec());
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(refused(503));
        }
        let ids = products.iter().map(|p| p.id.clone()).collect();
        Ok(Some(self.issue(false, ids)))
    }

    async fn submit_removals(&self, ids: &[String]) -> Result<Option<TicketAck>, RemoteError> {
        if ids.is_empty() {
            return Ok(None);
        }
        lock(&self.removal_calls).push(ids.to_vec());
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(refused(503));
        }
        Ok(Some(self.issue(true, ids.to_vec())))
    }

    async fn fetch_receipt(&self, ticket_id: &str) -> Result<Receipt, RemoteError> {
        self.receipt_calls.fetch_add(1, Ordering::SeqCst);
        if lock(&self.broken_receipts).contains(ticket_id) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        if let Some(r) = lock(&self.scripted).get(ticket_id) {
            return Ok(r.clone());
        }
        let Some(t) = self.ticket(ticket_id) else {
            return Err(RemoteError::Http {
                status: 404,
                body: "unknown ticket".to_string(),
            });
        };
        if self.auto_finish.load(Ordering::SeqCst) {
            let rejected = lock(&self.always_rejected);
            let results = t
                .product_ids
                .iter()
                .map(|id| item(id, rejected.get(id).copied().unwrap_or(200)))
                .collect();
            Ok(receipt(true, results))
        } else {
            Ok(receipt(false, Vec::new()))
        }
    }

    async fn fetch_remote_catalog(&self) -> Result<Vec<RemoteListing>, RemoteError> {
        if self.fail_catalog.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("timed out".to_string()));
        }
        Ok(lock(&self.listings).clone())
    }
}
