use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

/// Stored timestamp for `name`, if any.
pub async fn load_param_ts(pool: &PgPool, name: &str) -> Result<Option<DateTime<Utc>>> {
    let row: Option<(DateTime<Utc>,)> =
        sqlx::query_as::<_, (DateTime<Utc>,)>("select value_ts from sync_params where name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await
            .with_context(|| format!("load_param_ts failed name={name}"))?;
    Ok(row.map(|(ts,)| ts))
}

/// Get-or-default: a missing parameter reads as the Unix epoch.
pub async fn load_param_ts_or_epoch(pool: &PgPool, name: &str) -> Result<DateTime<Utc>> {
    let v = load_param_ts(pool, name).await?;
    if v.is_none() {
        debug!(param = name, "parameter absent, defaulting to epoch");
    }
    Ok(v.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
}

pub async fn upsert_param_ts(pool: &PgPool, name: &str, value: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        insert into sync_params (name, value_ts, updated_at)
        values ($1, $2, now())
        on conflict (name) do update set
          value_ts = excluded.value_ts,
          updated_at = now()
        "#,
    )
    .bind(name)
    .bind(value)
    .execute(pool)
    .await
    .with_context(|| format!("upsert_param_ts failed name={name}"))?;
    Ok(())
}
