//! mps-daemon entry point.
//!
//! Boot order: env, tracing, config, secrets, store, marketplace client,
//! engine, scheduler, HTTP. On ctrl-c the SSE streams are ended and the
//! timers stopped before the server drains; after that the engine lock is
//! taken one last time and the pool closes.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use mps_config::{ConfigConsumer, SecretsScope, UnusedKeyPolicy};
use mps_daemon::{auth::TriggerCredentials, routes, state};
use mps_db::PgCatalog;
use mps_remote::{ClientConfig, HttpMarketplaceClient};
use mps_runtime::{Engine, EngineConfig, Scheduler};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const DEFAULT_CONFIG_PATH: &str = "config/default.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths_from_env();
    let loaded = mps_config::load_layered_yaml(&paths).context("config load failed")?;
    let unused = mps_config::report_unused_keys(
        ConfigConsumer::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config has keys nothing reads");
    }
    let cfg = loaded.settings()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let secrets = mps_config::resolve_secrets(&loaded.config_json, SecretsScope::Daemon)?;
    let (mp_user, mp_password) = secrets.require_marketplace()?;
    let (trigger_user, trigger_password) = secrets.require_trigger()?;

    let pool = mps_db::connect_from_env().await?;
    mps_db::migrate(&pool).await?;
    let store = Arc::new(PgCatalog::new(pool.clone()));

    let client = HttpMarketplaceClient::new(ClientConfig {
        base_url: cfg.marketplace.base_url.clone(),
        user: mp_user,
        password: mp_password,
        timeout: cfg.marketplace.timeout(),
        capacity_warn: cfg.marketplace.capacity_warn,
    })
    .context("marketplace client init failed")?;

    let engine = Arc::new(
        Engine::load(
            store.clone(),
            Arc::new(client),
            store,
            EngineConfig::from_settings(&cfg)?,
        )
        .await?,
    );
    let scheduler = Scheduler::start(Arc::clone(&engine), &cfg.engine);

    let shared = Arc::new(state::AppState::new(
        Arc::clone(&engine),
        TriggerCredentials::new(trigger_user, trigger_password),
    ));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_pass_forwarder(&engine, shared.bus.clone());

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(a) => a,
        None => cfg
            .daemon
            .bind_addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid daemon.bind_addr '{}'", cfg.daemon.bind_addr))?,
    };
    info!("mps-daemon listening on http://{}", addr);

    let stopping = {
        let shared = Arc::clone(&shared);
        async move {
            shutdown_signal().await;
            shared.begin_shutdown();
            scheduler.shutdown().await;
        }
    };

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(stopping)
        .await
        .context("server crashed")?;

    let watermark = engine.quiesce().await;
    pool.close().await;
    info!(%watermark, "mps-daemon stopped");

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// `MPS_CONFIG` holds a path list (platform separator), merged in order.
fn config_paths_from_env() -> Vec<PathBuf> {
    match std::env::var_os("MPS_CONFIG") {
        Some(v) if !v.is_empty() => std::env::split_paths(&v).collect(),
        _ => vec![PathBuf::from(DEFAULT_CONFIG_PATH)],
    }
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("MPS_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl_c handler failed; shutting down");
    }
    info!("shutdown signal received");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
