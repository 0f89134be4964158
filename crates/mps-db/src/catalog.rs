use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mps_catalog::{Dimensions, LocalProduct};
use sqlx::{postgres::PgRow, PgPool, Row};

const PRODUCT_COLUMNS: &str = r#"
    id, name, category, detail, ean, price_cents,
    length_cm, height_cm, width_cm, weight_g,
    quantity, commercialize, listed, images,
    updated_at, deleted_at
"#;

/// Rows with `updated_at > watermark`, oldest first. No flag filtering.
pub async fn fetch_changed_since(
    pool: &PgPool,
    watermark: DateTime<Utc>,
) -> Result<Vec<LocalProduct>> {
    let sql = format!(
        "select {PRODUCT_COLUMNS} from products where updated_at > $1 order by updated_at asc, id asc"
    );
    let rows = sqlx::query(&sql)
        .bind(watermark)
        .fetch_all(pool)
        .await
        .context("fetch_changed_since query failed")?;

    rows.iter().map(product_from_row).collect()
}

pub async fn fetch_all_products(pool: &PgPool) -> Result<Vec<LocalProduct>> {
    let sql = format!("select {PRODUCT_COLUMNS} from products order by id asc");
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("fetch_all_products query failed")?;

    rows.iter().map(product_from_row).collect()
}

pub async fn fetch_products_by_ids(pool: &PgPool, ids: &[String]) -> Result<Vec<LocalProduct>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!("select {PRODUCT_COLUMNS} from products where id = any($1) order by id asc");
    let rows = sqlx::query(&sql)
        .bind(ids)
        .fetch_all(pool)
        .await
        .context("fetch_products_by_ids query failed")?;

    rows.iter().map(product_from_row).collect()
}

/// Insert or replace one product row. Used by seeding tools and tests; the
/// storefront owns this table in production.
pub async fn upsert_product(pool: &PgPool, p: &LocalProduct) -> Result<()> {
    sqlx::query(
        r#"
        insert into products (
          id, name, category, detail, ean, price_cents,
          length_cm, height_cm, width_cm, weight_g,
          quantity, commercialize, listed, images,
          updated_at, deleted_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
        )
        on conflict (id) do update set
          name = excluded.name,
          category = excluded.category,
          detail = excluded.detail,
          ean = excluded.ean,
          price_cents = excluded.price_cents,
          length_cm = excluded.length_cm,
          height_cm = excluded.height_cm,
          width_cm = excluded.width_cm,
          weight_g = excluded.weight_g,
          quantity = excluded.quantity,
          commercialize = excluded.commercialize,
          listed = excluded.listed,
          images = excluded.images,
          updated_at = excluded.updated_at,
          deleted_at = excluded.deleted_at
        "#,
    )
    .bind(&p.id)
    .bind(&p.name)
    .bind(&p.category)
    .bind(&p.detail)
    .bind(&p.ean)
    .bind(p.price_cents)
    .bind(p.dimensions.length_cm)
    .bind(p.dimensions.height_cm)
    .bind(p.dimensions.width_cm)
    .bind(p.dimensions.weight_g)
    .bind(p.quantity)
    .bind(p.commercialize)
    .bind(p.listed)
    .bind(&p.images)
    .bind(p.updated_at)
    .bind(p.deleted_at)
    .execute(pool)
    .await
    .with_context(|| format!("upsert_product failed id={}", p.id))?;

    Ok(())
}

fn product_from_row(r: &PgRow) -> Result<LocalProduct> {
    Ok(LocalProduct {
        id: r.try_get::<String, _>("id").context("products.id")?,
        name: r.try_get::<String, _>("name").context("products.name")?,
        category: r
            .try_get::<String, _>("category")
            .context("products.category")?,
        detail: r.try_get::<String, _>("detail").context("products.detail")?,
        ean: r.try_get::<String, _>("ean").context("products.ean")?,
        price_cents: r
            .try_get::<i64, _>("price_cents")
            .context("products.price_cents")?,
        dimensions: Dimensions {
            length_cm: r.try_get::<i32, _>("length_cm").context("products.length_cm")?,
            height_cm: r.try_get::<i32, _>("height_cm").context("products.height_cm")?,
            width_cm: r.try_get::<i32, _>("width_cm").context("products.width_cm")?,
            weight_g: r.try_get::<i32, _>("weight_g").context("products.weight_g")?,
        },
        quantity: r.try_get::<i32, _>("quantity").context("products.quantity")?,
        commercialize: r
            .try_get::<bool, _>("commercialize")
            .context("products.commercialize")?,
        listed: r.try_get::<bool, _>("listed").context("products.listed")?,
        images: r
            .try_get::<Vec<String>, _>("images")
            .context("products.images")?,
        updated_at: r
            .try_get::<DateTime<Utc>, _>("updated_at")
            .context("products.updated_at")?,
        deleted_at: r
            .try_get::<Option<DateTime<Utc>>, _>("deleted_at")
            .context("products.deleted_at")?,
    })
}
