//! Timer-driven pass scheduling.
//!
//! One task per periodic pass plus one debouncer for the trigger inbox. The
//! engine lock serializes actual execution; the timers only decide when to
//! ask. Shutdown flips a watch channel, then joins every task, which waits
//! out a pass already in flight.

use std::sync::Arc;
use std::time::Duration;

use mps_config::{EngineSettings, PassSchedule};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::summary::PassKind;

pub struct Scheduler {
    stop: watch::Sender<bool>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn start(engine: Arc<Engine>, settings: &EngineSettings) -> Self {
        let (stop, stop_rx) = watch::channel(false);

        let handles = vec![
            (
                PassKind::Sync.as_str(),
                spawn_periodic(Arc::clone(&engine), PassKind::Sync, settings.sync, stop_rx.clone()),
            ),
            (
                PassKind::Tickets.as_str(),
                spawn_periodic(
                    Arc::clone(&engine),
                    PassKind::Tickets,
                    settings.tickets,
                    stop_rx.clone(),
                ),
            ),
            (
                PassKind::Audit.as_str(),
                spawn_periodic(
                    Arc::clone(&engine),
                    PassKind::Audit,
                    settings.audit,
                    stop_rx.clone(),
                ),
            ),
            (
                PassKind::Trigger.as_str(),
                spawn_debouncer(engine, settings.trigger_debounce(), stop_rx),
            ),
        ];

        info!(
            sync_period_secs = settings.sync.period_secs,
            tickets_period_secs = settings.tickets.period_secs,
            audit_period_secs = settings.audit.period_secs,
            debounce_ms = settings.trigger_debounce_ms,
            "scheduler started"
        );

        Self { stop, handles }
    }

    /// Stop every timer and wait for in-flight passes to return.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "scheduler task panicked");
            }
        }
        info!("scheduler stopped");
    }
}

fn spawn_periodic(
    engine: Arc<Engine>,
    kind: PassKind,
    schedule: PassSchedule,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = Instant::now() + schedule.initial_delay();
        let mut ticker = interval_at(start, schedule.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stop.changed() => break,
            }
            if *stop.borrow() {
                break;
            }
            if let Err(e) = engine.run_pass(kind).await {
                error!(pass = kind.as_str(), error = %format!("{e:#}"), "pass aborted");
            }
        }
        debug!(pass = kind.as_str(), "timer stopped");
    })
}

/// Wait for a trigger, hold the window open for `debounce`, then flush every
/// ID that arrived meanwhile in one pass.
fn spawn_debouncer(
    engine: Arc<Engine>,
    debounce: Duration,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = engine.triggers().notified() => {}
                _ = stop.changed() => break,
            }
            tokio::select! {
                _ = sleep(debounce) => {}
                _ = stop.changed() => break,
            }
            if engine.triggers().is_empty() {
                continue;
            }
            if let Err(e) = engine.run_pass(PassKind::Trigger).await {
                error!(pass = "trigger", error = %format!("{e:#}"), "pass aborted");
            }
        }
        debug!("trigger debouncer stopped");
    })
}
