//! Shared runtime state for mps-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The engine itself is
//! owned elsewhere and shared by `Arc`; this module only holds handles.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mps_reconcile::Ticket;
use mps_runtime::{Engine, EngineSnapshot, PassSummary};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::auth::TriggerCredentials;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    Pass(PassSummary),
    Status(StatusSnapshot),
    LogLine { level: String, msg: String },
}

impl BusMsg {
    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::Heartbeat { .. } => "heartbeat",
            BusMsg::Pass(_) => "pass",
            BusMsg::Status(_) => "status",
            BusMsg::LogLine { .. } => "log",
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// StatusSnapshot
// ---------------------------------------------------------------------------

/// Returned by GET /v1/status and carried inside SSE `status` events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub daemon_uptime_secs: u64,
    pub watermark: DateTime<Utc>,
    /// Watermark rendered in the configured display timezone.
    pub watermark_local: String,
    pub open_tickets: Vec<Ticket>,
    pub queued_retries: Vec<String>,
    pub pending_triggers: usize,
    pub last_passes: Vec<PassSummary>,
}

impl StatusSnapshot {
    pub fn from_engine(snap: EngineSnapshot, engine: &Engine) -> Self {
        let tz = engine.config().display_tz;
        Self {
            daemon_uptime_secs: uptime_secs(),
            watermark: snap.watermark,
            watermark_local: snap.watermark.with_timezone(&tz).to_rfc3339(),
            open_tickets: snap.open_tickets,
            queued_retries: snap.queued_retries,
            pending_triggers: snap.pending_triggers,
            last_passes: snap.last_passes,
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    pub engine: Arc<Engine>,
    pub trigger_auth: TriggerCredentials,
    /// Flips to true once on shutdown; long-lived responses end on it.
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, trigger_auth: TriggerCredentials) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let (shutdown, _rx) = watch::channel(false);
        Self {
            bus,
            build: BuildInfo {
                service: "mps-daemon".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            engine,
            trigger_auth,
            shutdown,
        }
    }

    /// End every open SSE stream so the server can drain.
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once `begin_shutdown` has been called, even if that happened
    /// before this future was created.
    pub fn shutdown_requested(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.shutdown.subscribe();
        async move {
            let _ = rx.wait_for(|stop| *stop).await;
        }
    }

    pub async fn status(&self) -> StatusSnapshot {
        let snap = self.engine.snapshot();
        StatusSnapshot::from_engine(snap, &self.engine)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Relay every pass summary the engine broadcasts onto the SSE bus.
///
/// Ends when the engine is dropped.
pub fn spawn_pass_forwarder(
    engine: &Engine,
    bus: broadcast::Sender<BusMsg>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = engine.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(summary) => {
                    let _ = bus.send(BusMsg::Pass(summary));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "pass forwarder lagged; summaries dropped");
                    let _ = bus.send(BusMsg::LogLine {
                        level: "WARN".to_string(),
                        msg: format!("{skipped} pass summaries dropped"),
                    });
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
