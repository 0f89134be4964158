//! Command handlers for the `mps` CLI.
//!
//! Shared loading helpers live here; pass execution lives in `pass`.

pub mod pass;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use mps_catalog::WatermarkStore;
use mps_config::{ConfigConsumer, LoadedConfig, SyncConfig, UnusedKeyPolicy};
use mps_db::PgCatalog;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

pub fn load_config(paths: &[String]) -> Result<(LoadedConfig, SyncConfig)> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = mps_config::load_layered_yaml(&path_refs)?;
    let cfg = loaded.settings()?;
    Ok((loaded, cfg))
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

pub fn config_hash(paths: &[String]) -> Result<()> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = mps_config::load_layered_yaml(&path_refs)?;
    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

/// Typed validation plus an unused-key report for each binary.
pub fn config_check(paths: &[String]) -> Result<()> {
    let (loaded, cfg) = load_config(paths)?;
    println!("config_hash={}", loaded.config_hash);
    println!("marketplace_base_url={}", cfg.marketplace.base_url);
    println!("display_timezone={}", cfg.display.timezone);

    let mut clean = true;
    for consumer in [ConfigConsumer::Daemon, ConfigConsumer::Cli] {
        let report =
            mps_config::report_unused_keys(consumer, &loaded.config_json, UnusedKeyPolicy::Warn)?;
        println!(
            "unused_keys consumer={} count={}",
            report.consumer,
            report.unused_leaf_pointers.len()
        );
        for leaf in &report.unused_leaf_pointers {
            println!("  {leaf}");
        }
        // The daemon reads a superset of the CLI; only its report is binding.
        if consumer == ConfigConsumer::Daemon {
            clean = report.is_clean();
        }
    }

    if !clean {
        bail!("config check failed: keys no binary reads");
    }
    println!("config_ok=true");
    Ok(())
}

// ---------------------------------------------------------------------------
// watermark
// ---------------------------------------------------------------------------

pub async fn watermark_show(config_paths: &[String]) -> Result<()> {
    let (_, cfg) = load_config(config_paths)?;
    let tz = cfg.display.tz()?;

    let pool = mps_db::connect_from_env().await?;
    let store = PgCatalog::new(pool);
    let wm = store.load().await?;
    println!("watermark_utc={}", wm.to_rfc3339());
    println!("watermark_local={}", wm.with_timezone(&tz).to_rfc3339());
    store.close().await;
    Ok(())
}

pub async fn watermark_set(at: &str, yes: bool) -> Result<()> {
    let target = parse_watermark(at)?;

    let pool = mps_db::connect_from_env().await?;
    let store = PgCatalog::new(pool);
    let current = store.load().await?;

    if target > current && !yes {
        bail!(
            "REFUSING WATERMARK ADVANCE: {} -> {} would skip rows changed in between. \
            Re-run with: `mps watermark set --at {} --yes`",
            current.to_rfc3339(),
            target.to_rfc3339(),
            at
        );
    }

    store.commit(target).await?;
    println!(
        "watermark_set=true previous={} current={}",
        current.to_rfc3339(),
        target.to_rfc3339()
    );
    store.close().await;
    Ok(())
}

pub fn parse_watermark(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("epoch") {
        return Ok(DateTime::<Utc>::UNIX_EPOCH);
    }
    let dt = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid --at '{s}': expected RFC 3339 or 'epoch'"))?;
    Ok(dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parse_watermark_accepts_epoch_and_offsets() {
        assert_eq!(parse_watermark("epoch").unwrap(), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(
            parse_watermark("2024-06-01T09:00:00-03:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
        );
        assert!(parse_watermark("yesterday").is_err());
    }
}
