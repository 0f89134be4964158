//! Storage boundary consumed by the reconciliation engine.
//!
//! Implementations live elsewhere (Postgres in `mps-db`, in-memory fakes in
//! `mps-testkit`). Any error returned here aborts the calling pass; the engine
//! never commits a watermark after a read failure.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::LocalProduct;

/// Name of the persisted sync watermark parameter.
pub const WATERMARK_PARAM: &str = "marketplace-last-product-updated-time";

#[async_trait::async_trait]
pub trait CatalogReader: Send + Sync {
    /// Every row with `updated_at` strictly greater than `watermark`,
    /// including unlisted and soft-deleted rows.
    async fn changed_since(&self, watermark: DateTime<Utc>) -> Result<Vec<LocalProduct>>;

    /// Full catalog snapshot.
    async fn all_records(&self) -> Result<Vec<LocalProduct>>;

    /// Rows for the given IDs. IDs with no row are silently absent from the result.
    async fn by_ids(&self, ids: &[String]) -> Result<Vec<LocalProduct>>;
}

#[async_trait::async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Stored watermark, or the Unix epoch when none has been committed yet.
    async fn load(&self) -> Result<DateTime<Utc>>;

    async fn commit(&self, watermark: DateTime<Utc>) -> Result<()>;
}
