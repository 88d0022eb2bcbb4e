//! Maintenance: periodic background work for the engine.
//!
//! Each timer runs as its own Tokio task:
//!
//! - **gc**: purge idle sessions and release due scheduled requests.
//! - **health**: append a sample to the health log, write `health.json`,
//!   and take a backup every N health ticks.
//! - **learning**: hook for route-performance analysis (logs only).
//! - **drain**: take one batch from the pending queue.
//!
//! Exits when the shutdown signal is received or the watch channel closes.

pub mod backup;
pub mod health;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::Engine;

/// Timer settings and output paths for the maintenance loop.
#[derive(Debug, Clone)]
pub struct MaintenanceSchedule {
    /// Session GC and scheduled release.
    pub gc_interval: Duration,
    /// Health sampling.
    pub health_interval: Duration,
    /// Backup every N health ticks; zero disables.
    pub backup_every_health_ticks: u64,
    /// Learning hook.
    pub learning_interval: Duration,
    /// Queue drain.
    pub drain_interval: Duration,
    /// `health.json` location.
    pub health_json: PathBuf,
    /// Backups root.
    pub backups_dir: PathBuf,
}

impl MaintenanceSchedule {
    /// Build from configuration and resolved paths.
    pub fn from_config(config: &Config, health_json: PathBuf, backups_dir: PathBuf) -> Self {
        let m = &config.maintenance;
        Self {
            gc_interval: Duration::from_secs(m.gc_interval_secs.max(1)),
            health_interval: Duration::from_secs(m.health_interval_secs.max(1)),
            backup_every_health_ticks: m.backup_every_health_ticks,
            learning_interval: Duration::from_secs(m.learning_interval_secs.max(1)),
            drain_interval: Duration::from_millis(config.dispatch.drain_interval_ms.max(1)),
            health_json,
            backups_dir,
        }
    }
}

fn interval(period: Duration) -> tokio::time::Interval {
    let now = tokio::time::Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run the maintenance tasks until shutdown.
///
/// Each timer runs in its own task, so a long drain batch never delays
/// session GC, health sampling or scheduled release.
pub async fn run_maintenance(
    engine: Arc<Engine>,
    schedule: MaintenanceSchedule,
    shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        gc_secs = schedule.gc_interval.as_secs(),
        health_secs = schedule.health_interval.as_secs(),
        drain_ms = u64::try_from(schedule.drain_interval.as_millis()).unwrap_or(u64::MAX),
        "maintenance started"
    );

    let schedule = Arc::new(schedule);
    let mut tasks = JoinSet::new();

    let gc_engine = Arc::clone(&engine);
    tasks.spawn(periodic("gc", schedule.gc_interval, shutdown_rx.clone(), move |_| {
        let engine = Arc::clone(&gc_engine);
        async move { gc_tick(&engine).await }
    }));

    let health_engine = Arc::clone(&engine);
    let health_schedule = Arc::clone(&schedule);
    tasks.spawn(periodic("health", schedule.health_interval, shutdown_rx.clone(), move |tick| {
        let engine = Arc::clone(&health_engine);
        let schedule = Arc::clone(&health_schedule);
        async move { health_tick(&engine, &schedule, tick).await }
    }));

    let learning_engine = Arc::clone(&engine);
    tasks.spawn(periodic("learning", schedule.learning_interval, shutdown_rx.clone(), move |_| {
        let engine = Arc::clone(&learning_engine);
        async move { learning_tick(&engine).await }
    }));

    tasks.spawn(periodic("drain", schedule.drain_interval, shutdown_rx, move |_| {
        let engine = Arc::clone(&engine);
        async move {
            engine.drain_tick().await;
        }
    }));

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "maintenance task ended abnormally");
        }
    }

    info!("maintenance stopped");
}

/// Call `tick` every `period` until shutdown. `tick` receives the 1-based
/// tick count.
async fn periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut tick: F,
) where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = ()>,
{
    if *shutdown_rx.borrow() {
        return;
    }

    let mut timer = interval(period);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = timer.tick() => {
                ticks = ticks.saturating_add(1);
                tick(ticks).await;
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    debug!(task = name, ticks, "maintenance task stopped");
}

/// Purge idle sessions and release due scheduled requests.
pub async fn gc_tick(engine: &Arc<Engine>) {
    let now = Utc::now();
    let purged = engine.sessions().purge_expired(now).await;
    debug!(purged, "session gc");

    if let Err(e) = engine.release_due_scheduled(now).await {
        error!(error = %e, "failed to release scheduled requests");
        engine.enter_degraded(&e);
    }
}

/// Record a health sample; back up when `tick` is a multiple of the backup
/// period.
pub async fn health_tick(engine: &Engine, schedule: &MaintenanceSchedule, tick: u64) {
    let sample = engine.health_sample(Utc::now()).await;

    if let Err(e) = engine.store().append_health(&sample).await {
        warn!(error = %e, "failed to append health sample");
    }
    if let Err(e) = health::write_health_file(&sample, &schedule.health_json).await {
        warn!(error = %e, "failed to write health.json");
    }

    let every = schedule.backup_every_health_ticks;
    if every > 0 && tick.is_multiple_of(every) {
        if let Err(e) = backup::create_backup(engine.store().as_ref(), &schedule.backups_dir).await {
            error!(error = %e, "backup failed");
        }
    }
}

/// Route-performance analysis hook. Summarizes recent results; no model is
/// updated.
pub async fn learning_tick(engine: &Engine) {
    let recent = engine.store().recent_transmissions(100).await;
    let delivered = recent.iter().filter(|r| r.success).count();
    info!(
        sampled = recent.len(),
        delivered,
        "learning hook ran"
    );
}
