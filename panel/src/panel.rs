use crate::controller::AutomationController;
use crate::events::{EventHub, PanelEvent};
use crate::sync::ActivitySyncLoop;
use background_service::BadgeNotifier;
use backend_client::Backend;
use config_store::ConfigStore;
use scrapedeck_core::{
    normalize_base_url, ActivityView, AutomationState, Configuration, CoreError, ErrorExt,
    PanelSettings, ScrapeRunResult, ScrapedResult, Severity,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Operator intents, one per control on the panel.
#[derive(Debug, Clone)]
pub enum PanelAction {
    TriggerScrape,
    ToggleAutomation(bool),
    SaveConfiguration(Box<Configuration>),
    ClearSession,
    RefreshResults,
    ClearActivityLog,
    SetBackendUrl(String),
    SetContractAddressRequired(bool),
}

/// The control panel as a UI sees it: intents in, `PanelEvent`s out.
pub struct Panel {
    backend: Arc<dyn Backend>,
    config_store: ConfigStore,
    events: EventHub,
    controller: Arc<AutomationController>,
    sync: Arc<ActivitySyncLoop>,
    badge: BadgeNotifier,
    result_refresh_delay: Duration,
    pending_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl Panel {
    pub fn new(
        settings: &PanelSettings,
        backend: Arc<dyn Backend>,
        config_store: ConfigStore,
        badge: BadgeNotifier,
    ) -> Self {
        let events = EventHub::new(settings.activity_window);
        let controller = Arc::new(AutomationController::new(
            backend.clone(),
            config_store.clone(),
            events.clone(),
        ));
        let sync = Arc::new(ActivitySyncLoop::new(
            backend.clone(),
            controller.clone(),
            config_store.clone(),
            badge.clone(),
            events.clone(),
            settings,
        ));

        Self {
            backend,
            config_store,
            events,
            controller,
            sync,
            badge,
            result_refresh_delay: settings.result_refresh_delay(),
            pending_refresh: Mutex::new(None),
        }
    }

    /// Open the panel: restore the saved configuration, reconcile with the
    /// backend, mark results as seen and start syncing.
    pub async fn open(&self) -> Option<Configuration> {
        let saved = self.config_store.load().await;
        if let Some(config) = &saved {
            if let Err(e) = self.backend.set_base_url(&config.backend_url) {
                warn!("Saved backend URL rejected: {}", e);
                self.events
                    .local_activity(Severity::Warning, "Failed to load saved configuration")
                    .await;
            }
        }

        if self.sync.check_health().await {
            let _ = self.controller.refresh_status().await;
            let _ = self.sync.sync_results().await;
        }

        match self.sync.mark_results_seen().await {
            Ok(true) => {}
            Ok(false) => debug!("Results not loaded, keeping the stored seen count"),
            Err(e) => debug!("Could not record seen results: {}", e),
        }
        self.badge.clear_on_open().await;
        self.sync.start();

        info!("Panel opened against {}", self.backend.base_url());
        saved
    }

    /// Stop syncing and drop any scheduled refresh.
    pub async fn close(&self) {
        if let Some(pending) = self.take_pending_refresh() {
            pending.abort();
        }
        self.sync.stop().await;
    }

    pub async fn update(&self, action: PanelAction) -> Result<(), CoreError> {
        match action {
            PanelAction::TriggerScrape => self.trigger_scrape().await.map(|_| ()),
            PanelAction::ToggleAutomation(enabled) => {
                self.toggle_automation(enabled).await.map(|_| ())
            }
            PanelAction::SaveConfiguration(config) => {
                self.save_configuration(&config).await.map(|_| ())
            }
            PanelAction::ClearSession => self.controller.clear_session().await,
            PanelAction::RefreshResults => self.refresh_results().await.map(|_| ()),
            PanelAction::ClearActivityLog => {
                self.events.clear_activity().await;
                Ok(())
            }
            PanelAction::SetBackendUrl(url) => self.set_backend_url(&url).await.map(|_| ()),
            PanelAction::SetContractAddressRequired(required) => {
                self.set_contract_address_required(required).await
            }
        }
    }

    /// Manual scrape; a non-failing run schedules a results refresh.
    pub async fn trigger_scrape(&self) -> Result<ScrapeRunResult, CoreError> {
        let result = self.controller.trigger_scrape().await?;
        if result.ok {
            self.schedule_results_refresh();
        }
        Ok(result)
    }

    pub async fn toggle_automation(&self, enabled: bool) -> Result<AutomationState, CoreError> {
        self.controller.toggle(enabled).await
    }

    pub async fn save_configuration(
        &self,
        config: &Configuration,
    ) -> Result<Configuration, CoreError> {
        self.controller.save_configuration(config).await
    }

    pub async fn clear_session(&self) -> Result<(), CoreError> {
        self.controller.clear_session().await
    }

    /// Operator-requested results load. Unlike the polled one, a failure is
    /// reported in the activity log.
    pub async fn refresh_results(&self) -> Result<usize, CoreError> {
        match self.sync.sync_results().await {
            Ok(count) => Ok(count),
            Err(e) => {
                self.events
                    .local_activity(
                        Severity::Error,
                        format!("Failed to load results: {}", e.user_friendly_message()),
                    )
                    .await;
                Err(e)
            }
        }
    }

    /// Configuration the backend currently holds, if any
    pub async fn fetch_server_config(&self) -> Result<Option<Configuration>, CoreError> {
        self.backend.get_config().await
    }

    /// Repoint the client and re-check backend status. Returns whether the new
    /// endpoint is online.
    pub async fn set_backend_url(&self, url: &str) -> Result<bool, CoreError> {
        let normalized = normalize_base_url(url)?;
        self.backend.set_base_url(&normalized)?;
        Ok(self.sync.check_health().await)
    }

    pub async fn set_contract_address_required(&self, required: bool) -> Result<(), CoreError> {
        self.config_store.set_contract_address_required(required).await?;
        self.events
            .local_activity(
                Severity::Info,
                format!(
                    "Contract address requirement: {}",
                    if required { "enabled" } else { "disabled" }
                ),
            )
            .await;
        Ok(())
    }

    pub async fn contract_address_required(&self) -> bool {
        self.config_store.contract_address_required().await
    }

    pub async fn check_backend_status(&self) -> bool {
        self.sync.check_health().await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    pub async fn activity(&self) -> ActivityView {
        self.events.activity().await
    }

    pub async fn results(&self) -> Vec<ScrapedResult> {
        self.sync.results().await
    }

    pub async fn automation_state(&self) -> AutomationState {
        self.controller.state().await
    }

    pub fn is_loading(&self) -> bool {
        self.controller.is_loading()
    }

    pub fn result_refresh_delay(&self) -> Duration {
        self.result_refresh_delay
    }

    pub fn controller(&self) -> &Arc<AutomationController> {
        &self.controller
    }

    pub fn sync_loop(&self) -> &Arc<ActivitySyncLoop> {
        &self.sync
    }

    fn schedule_results_refresh(&self) {
        let sync = self.sync.clone();
        let delay = self.result_refresh_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = sync.sync_results().await {
                debug!("Post-scrape results refresh failed: {}", e);
            }
        });

        let previous = match self.pending_refresh.lock() {
            Ok(mut guard) => guard.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    fn take_pending_refresh(&self) -> Option<JoinHandle<()>> {
        match self.pending_refresh.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
