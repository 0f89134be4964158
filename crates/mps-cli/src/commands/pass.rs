//! One-shot passes against the live store and marketplace.
//!
//! Tickets live in engine memory, so a fresh process starts with none. With
//! `--settle-secs` the command keeps running ticket passes until everything it
//! submitted is resolved, or the time runs out.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use mps_config::SecretsScope;
use mps_db::PgCatalog;
use mps_remote::{ClientConfig, HttpMarketplaceClient};
use mps_runtime::{Engine, EngineConfig, PassKind, PassSummary};
use tokio::time::{sleep, Instant};

use super::load_config;

const SETTLE_POLL: Duration = Duration::from_secs(5);

async fn build_engine(config_paths: &[String]) -> Result<(Engine, PgCatalog)> {
    let (loaded, cfg) = load_config(config_paths)?;
    let secrets = mps_config::resolve_secrets(&loaded.config_json, SecretsScope::Marketplace)?;
    let (user, password) = secrets.require_marketplace()?;

    let pool = mps_db::connect_from_env().await?;
    let store = PgCatalog::new(pool);

    let client = HttpMarketplaceClient::new(ClientConfig {
        base_url: cfg.marketplace.base_url.clone(),
        user,
        password,
        timeout: cfg.marketplace.timeout(),
        capacity_warn: cfg.marketplace.capacity_warn,
    })
    .context("marketplace client init failed")?;

    let engine = Engine::load(
        Arc::new(store.clone()),
        Arc::new(client),
        Arc::new(store.clone()),
        EngineConfig::from_settings(&cfg)?,
    )
    .await?;
    Ok((engine, store))
}

pub async fn run_once(config_paths: &[String], kind: PassKind, settle_secs: u64) -> Result<()> {
    let (engine, store) = build_engine(config_paths).await?;
    let summary = engine.run_pass(kind).await?;
    print_summary(&summary);
    settle(&engine, settle_secs).await?;
    store.close().await;
    Ok(())
}

pub async fn run_trigger(
    config_paths: &[String],
    ids: Vec<String>,
    settle_secs: u64,
) -> Result<()> {
    let (engine, store) = build_engine(config_paths).await?;
    for id in ids {
        engine.triggers().enqueue(id);
    }
    let summary = engine.run_trigger_pass().await?;
    print_summary(&summary);
    settle(&engine, settle_secs).await?;
    store.close().await;
    Ok(())
}

async fn settle(engine: &Engine, settle_secs: u64) -> Result<()> {
    if settle_secs == 0 {
        return Ok(());
    }
    let deadline = Instant::now() + Duration::from_secs(settle_secs);
    loop {
        let snap = engine.snapshot();
        if snap.open_tickets.is_empty() && snap.queued_retries.is_empty() {
            println!("settled=true");
            return Ok(());
        }
        if Instant::now() >= deadline {
            println!(
                "settled=false open_tickets={} queued_retries={}",
                snap.open_tickets.len(),
                snap.queued_retries.len()
            );
            return Ok(());
        }
        sleep(SETTLE_POLL).await;
        let summary = engine.run_ticket_pass().await?;
        print_summary(&summary);
    }
}

fn print_summary(s: &PassSummary) {
    println!(
        "pass={} pass_id={} changed={} upserted={} removed={} retried={} abandoned={} \
        resolved={} failed_items={} dropped={} failed_submissions={} watermark_advanced={}",
        s.kind.as_str(),
        s.pass_id,
        s.changed,
        s.upserted,
        s.removed,
        s.retried,
        s.abandoned,
        s.resolved,
        s.failed_items,
        s.dropped,
        s.failed_submissions,
        s.watermark_advanced
    );
    if let Some(reason) = &s.skipped {
        println!("skipped={reason}");
    }
    for (reason, n) in &s.removal_reasons {
        println!("removal_reason {reason}={n}");
    }
}
