//! mps-db
//!
//! Postgres access for the sync engine: the product projection
//! (`catalog`) and named runtime parameters (`params`). [`PgCatalog`] wraps a
//! pool and implements both storage traits from `mps-catalog`.

mod catalog;
mod params;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mps_catalog::{CatalogReader, LocalProduct, WatermarkStore, WATERMARK_PARAM};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub use catalog::{
    fetch_all_products, fetch_changed_since, fetch_products_by_ids, upsert_product,
};
pub use params::{load_param_ts, load_param_ts_or_epoch, upsert_param_ts};

pub const ENV_DB_URL: &str = "MPS_DATABASE_URL";

/// Connect to Postgres using MPS_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_products_table: bool,
    pub has_params_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_products_table: table_exists(pool, "products").await?,
        has_params_table: table_exists(pool, "sync_params").await?,
    })
}

async fn table_exists(pool: &PgPool, name: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = $1
        )
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("status table-exists query failed: {name}"))?;
    Ok(exists)
}

// ---------------------------------------------------------------------------
// Trait adapter
// ---------------------------------------------------------------------------

/// Postgres-backed catalog reader and watermark store.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    pool: PgPool,
    watermark_param: String,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            watermark_param: WATERMARK_PARAM.to_string(),
        }
    }

    /// Use a different parameter name (one store shared by several marketplaces).
    pub fn with_watermark_param(mut self, name: impl Into<String>) -> Self {
        self.watermark_param = name.into();
        self
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait::async_trait]
impl CatalogReader for PgCatalog {
    async fn changed_since(&self, watermark: DateTime<Utc>) -> Result<Vec<LocalProduct>> {
        fetch_changed_since(&self.pool, watermark).await
    }

    async fn all_records(&self) -> Result<Vec<LocalProduct>> {
        fetch_all_products(&self.pool).await
    }

    async fn by_ids(&self, ids: &[String]) -> Result<Vec<LocalProduct>> {
        fetch_products_by_ids(&self.pool, ids).await
    }
}

#[async_trait::async_trait]
impl WatermarkStore for PgCatalog {
    async fn load(&self) -> Result<DateTime<Utc>> {
        load_param_ts_or_epoch(&self.pool, &self.watermark_param).await
    }

    async fn commit(&self, watermark: DateTime<Utc>) -> Result<()> {
        upsert_param_ts(&self.pool, &self.watermark_param, watermark).await
    }
}
