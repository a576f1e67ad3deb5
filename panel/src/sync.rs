use crate::controller::AutomationController;
use crate::events::{EventHub, PanelEvent};
use background_service::BadgeNotifier;
use backend_client::Backend;
use config_store::ConfigStore;
use scrapedeck_core::{CoreError, ErrorRecovery, OperationKind, PanelSettings, ScrapedResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct SyncShared {
    backend: Arc<dyn Backend>,
    controller: Arc<AutomationController>,
    config_store: ConfigStore,
    badge: BadgeNotifier,
    events: EventHub,
    results: RwLock<Vec<ScrapedResult>>,
    results_loaded: AtomicBool,
    activity_interval: Duration,
    health_interval: Duration,
}

struct RunningLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Polls the activity feed every `activity_interval` and, in a separate
/// `health_interval` slot, backend health, results and automation status.
///
/// Ticks never overlap: a tick still running when the timer fires again
/// makes the loop skip that firing.
pub struct ActivitySyncLoop {
    shared: Arc<SyncShared>,
    running: Mutex<Option<RunningLoop>>,
}

impl ActivitySyncLoop {
    pub fn new(
        backend: Arc<dyn Backend>,
        controller: Arc<AutomationController>,
        config_store: ConfigStore,
        badge: BadgeNotifier,
        events: EventHub,
        settings: &PanelSettings,
    ) -> Self {
        Self {
            shared: Arc::new(SyncShared {
                backend,
                controller,
                config_store,
                badge,
                events,
                results: RwLock::new(Vec::new()),
                results_loaded: AtomicBool::new(false),
                activity_interval: settings.activity_interval(),
                health_interval: settings.health_interval(),
            }),
            running: Mutex::new(None),
        }
    }

    /// Start polling. Returns false if the loop is already running.
    pub fn start(&self) -> bool {
        let mut running = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                return false;
            }
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(self.shared.clone(), shutdown_rx));
        *running = Some(RunningLoop { shutdown, handle });
        info!(
            "Activity sync started (activity every {:?}, health every {:?})",
            self.shared.activity_interval, self.shared.health_interval
        );
        true
    }

    /// Cancel the timers and wait for the loop task to finish. An in-flight
    /// tick is abandoned, so nothing is rendered after this returns.
    pub async fn stop(&self) {
        let current = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(current) = current else {
            return;
        };

        let _ = current.shutdown.send(true);
        if let Err(e) = current.handle.await {
            if !e.is_cancelled() {
                warn!("Activity sync task ended abnormally: {}", e);
            }
        }
        info!("Activity sync stopped");
    }

    pub fn is_running(&self) -> bool {
        match self.running.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|r| !r.handle.is_finished()),
            Err(poisoned) => poisoned
                .into_inner()
                .as_ref()
                .is_some_and(|r| !r.handle.is_finished()),
        }
    }

    pub async fn sync_activity_once(&self) -> Result<bool, CoreError> {
        self.shared.sync_activity().await
    }

    /// Fetch results, replace the cache wholesale and relay the unseen count.
    pub async fn sync_results(&self) -> Result<usize, CoreError> {
        self.shared.sync_results().await
    }

    pub async fn check_health(&self) -> bool {
        self.shared.check_health().await
    }

    pub async fn results(&self) -> Vec<ScrapedResult> {
        self.shared.results.read().await.clone()
    }

    /// Record the cached result count as seen by the operator. Returns false
    /// without touching the stored count if results were never loaded.
    pub async fn mark_results_seen(&self) -> Result<bool, CoreError> {
        if !self.shared.results_loaded.load(Ordering::Acquire) {
            return Ok(false);
        }
        let count = self.shared.results.read().await.len();
        self.shared.config_store.set_last_result_count(count).await?;
        Ok(true)
    }
}

async fn run_loop(shared: Arc<SyncShared>, mut shutdown: watch::Receiver<bool>) {
    let mut activity = interval(shared.activity_interval);
    activity.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut health = interval(shared.health_interval);
    health.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = activity.tick() => {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = shared.sync_activity() => {}
                }
            }
            _ = health.tick() => {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = shared.health_tick() => {}
                }
            }
        }
    }
    debug!("Activity sync loop exited");
}

impl SyncShared {
    async fn sync_activity(&self) -> Result<bool, CoreError> {
        match self.backend.get_activity_log().await {
            Ok(events) => Ok(self.events.replace_activity(events).await),
            Err(e) => {
                ErrorRecovery::observe(&e, OperationKind::Polling);
                Err(e)
            }
        }
    }

    async fn sync_results(&self) -> Result<usize, CoreError> {
        let results = match self.backend.get_results().await {
            Ok(results) => results,
            Err(e) => {
                ErrorRecovery::observe(&e, OperationKind::Polling);
                return Err(e);
            }
        };

        let count = results.len();
        *self.results.write().await = results.clone();
        self.results_loaded.store(true, Ordering::Release);
        self.events.publish(PanelEvent::ResultsUpdated(results));

        let seen = self.config_store.last_result_count().await;
        let unseen = u32::try_from(count.saturating_sub(seen)).unwrap_or(u32::MAX);
        self.badge.set_count(unseen).await;
        Ok(count)
    }

    async fn check_health(&self) -> bool {
        let online = match self.backend.get_status().await {
            Ok(_) => true,
            Err(e) => {
                ErrorRecovery::observe(&e, OperationKind::Polling);
                false
            }
        };
        self.events.set_backend_online(online).await;
        online
    }

    async fn health_tick(&self) {
        if !self.check_health().await {
            return;
        }
        let _ = self.sync_results().await;
        let _ = self.controller.refresh_status().await;
    }
}
