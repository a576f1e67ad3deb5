use crate::events::{EventHub, PanelEvent};
use backend_client::Backend;
use config_store::ConfigStore;
use scrapedeck_core::{
    AutomationState, Configuration, CoreError, CredentialChangeReport, ErrorExt, ErrorRecovery,
    OperationKind, RecoveryStrategy, ScrapeRun, ScrapeRunResult, Severity,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Holds the single in-flight slot for mutating intents until dropped.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, operation: &str) -> Result<Self, CoreError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                debug!("Rejecting {}: another operation is in flight", operation);
                CoreError::busy(operation)
            })?;
        Ok(Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owns the automation state machine and the manual scrape lifecycle.
///
/// `toggle`, `trigger_scrape`, `save_configuration` and `clear_session` share
/// one in-flight slot. A second intent while one is outstanding fails with
/// `CoreError::Busy` before any network call.
pub struct AutomationController {
    backend: Arc<dyn Backend>,
    config_store: ConfigStore,
    events: EventHub,
    state: RwLock<AutomationState>,
    in_flight: AtomicBool,
    last_scrape: RwLock<Option<ScrapeRun>>,
}

impl AutomationController {
    pub fn new(backend: Arc<dyn Backend>, config_store: ConfigStore, events: EventHub) -> Self {
        Self {
            backend,
            config_store,
            events,
            state: RwLock::new(AutomationState::Stopped),
            in_flight: AtomicBool::new(false),
            last_scrape: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> AutomationState {
        *self.state.read().await
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn last_scrape(&self) -> Option<ScrapeRun> {
        self.last_scrape.read().await.clone()
    }

    async fn set_state(&self, next: AutomationState) {
        let changed = {
            let mut state = self.state.write().await;
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            self.events.publish(PanelEvent::AutomationStateChanged(next));
        }
    }

    /// Move to `next` only if nobody else moved the state away from `expected`.
    async fn transition_from(&self, expected: AutomationState, next: AutomationState) -> bool {
        {
            let mut state = self.state.write().await;
            if *state != expected {
                return false;
            }
            *state = next;
        }
        if expected != next {
            self.events.publish(PanelEvent::AutomationStateChanged(next));
        }
        true
    }

    /// Ask the backend to start or stop the schedule.
    ///
    /// The request is sent even when the local state already matches, since
    /// the local view may be stale. On failure the state rolls back to where
    /// it was, unless a status refresh already settled it.
    pub async fn toggle(&self, enabled: bool) -> Result<AutomationState, CoreError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, "toggle automation")?;

        let current = self.state().await;
        if current.is_transitional() {
            return Err(CoreError::busy("toggle automation"));
        }
        let target = AutomationState::settled(enabled);
        if current == target {
            debug!("Automation shown as {}, confirming with the backend", current);
        }

        let pending = if enabled {
            AutomationState::Starting
        } else {
            AutomationState::Stopping
        };
        let verb = if enabled { "Starting" } else { "Stopping" };
        self.set_state(pending).await;
        self.events
            .local_activity(Severity::Info, format!("{} automation...", verb))
            .await;

        match self.backend.set_automation(enabled).await {
            Ok(_) => {
                self.transition_from(pending, target).await;
                info!("Automation {}", target);
                self.events
                    .local_activity(
                        Severity::Success,
                        format!(
                            "Automation {} successfully",
                            if enabled { "started" } else { "stopped" }
                        ),
                    )
                    .await;
                Ok(self.state().await)
            }
            Err(e) => {
                if !self.transition_from(pending, current).await {
                    debug!("Automation state settled by a status refresh, not rolling back");
                }
                self.surface(
                    &e,
                    OperationKind::Mutating,
                    format!("Failed to toggle automation: {}", e.user_friendly_message()),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Overwrite the local state with the server's view.
    ///
    /// While a toggle is pending, a matching server answer settles it early
    /// and a contradicting one is left for the toggle to resolve.
    pub async fn refresh_status(&self) -> Result<AutomationState, CoreError> {
        let running = match self.backend.get_automation_status().await {
            Ok(running) => running,
            Err(e) => {
                ErrorRecovery::observe(&e, OperationKind::Polling);
                return Err(e);
            }
        };

        let (next, changed) = {
            let mut state = self.state.write().await;
            let next = match (*state, running) {
                (AutomationState::Starting, true) => AutomationState::Running,
                (AutomationState::Stopping, false) => AutomationState::Stopped,
                (pending, _) if pending.is_transitional() => pending,
                (_, running) => AutomationState::settled(running),
            };
            let changed = *state != next;
            *state = next;
            (next, changed)
        };

        if changed {
            debug!("Automation state reconciled to {}", next);
            self.events.publish(PanelEvent::AutomationStateChanged(next));
        }
        Ok(next)
    }

    /// Fire one manual scrape. The backend's answer is normalized and never
    /// turned into an error; only transport and HTTP failures are.
    pub async fn trigger_scrape(&self) -> Result<ScrapeRunResult, CoreError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, "manual scrape")?;

        let mut run = ScrapeRun::pending();
        *self.last_scrape.write().await = Some(run.clone());
        self.events
            .local_activity(Severity::Info, "Starting manual scrape...")
            .await;

        let outcome = self.backend.trigger_scrape().await;
        let result = match &outcome {
            Ok(result) => {
                run.complete(result);
                result.clone()
            }
            Err(e) => {
                run.fail(e.user_friendly_message());
                ScrapeRunResult::failed(e.user_friendly_message())
            }
        };
        *self.last_scrape.write().await = Some(run);

        if let Err(e) = &outcome {
            self.surface(e, OperationKind::Mutating, result.message.clone()).await;
        } else if !result.ok {
            self.events
                .local_activity(Severity::Error, result.message.clone())
                .await;
        } else if result.ambiguous {
            self.events
                .local_activity(
                    Severity::Warning,
                    "Manual scrape completed (no detailed response)",
                )
                .await;
        } else {
            self.events
                .local_activity(Severity::Success, "Manual scrape completed successfully")
                .await;
            self.events
                .local_activity(Severity::Info, result.message.clone())
                .await;
        }

        self.events.publish(PanelEvent::ScrapeFinished(result));
        outcome
    }

    /// Validate credentials (advisory), push to the backend, then persist locally.
    ///
    /// Nothing is persisted unless the backend accepted the configuration.
    pub async fn save_configuration(
        &self,
        config: &Configuration,
    ) -> Result<Configuration, CoreError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, "save configuration")?;

        let normalized = match config.normalized() {
            Ok(normalized) => normalized,
            Err(e) => {
                let e = CoreError::from(e);
                self.report_save_failure(&e).await;
                return Err(e);
            }
        };

        let previous_url = self.backend.base_url();
        self.backend.set_base_url(&normalized.backend_url)?;

        self.events
            .local_activity(Severity::Info, "Validating credentials...")
            .await;
        let report = match self.backend.validate_credentials(&normalized).await {
            Ok(report) => {
                self.report_credential_changes(&report).await;
                report
            }
            Err(e) => {
                let advisory = CoreError::ValidationFailure {
                    reason: e.user_friendly_message(),
                };
                self.surface(
                    &advisory,
                    OperationKind::Advisory,
                    format!("Credential validation failed: {}", e.user_friendly_message()),
                )
                .await;
                CredentialChangeReport::default()
            }
        };

        self.events
            .local_activity(Severity::Info, "Saving configuration...")
            .await;
        if let Err(e) = self.backend.save_config(&normalized).await {
            if let Err(restore) = self.backend.set_base_url(&previous_url) {
                warn!("Could not restore backend endpoint: {}", restore);
            }
            self.report_save_failure(&e).await;
            return Err(e);
        }

        let saved = match self.config_store.save(&normalized).await {
            Ok(saved) => saved,
            Err(e) => {
                self.report_save_failure(&e).await;
                return Err(e);
            }
        };

        self.events
            .local_activity(Severity::Success, "Configuration saved successfully")
            .await;
        self.events
            .local_activity(
                Severity::Info,
                format!(
                    "Contract address requirement: {}",
                    if saved.contract_address_required {
                        "enabled"
                    } else {
                        "disabled"
                    }
                ),
            )
            .await;
        self.events.publish(PanelEvent::ConfigurationSaved(report));
        Ok(saved)
    }

    async fn report_credential_changes(&self, report: &CredentialChangeReport) {
        if !report.has_changes() {
            debug!("Credentials unchanged");
            return;
        }
        if report.twitter_changed {
            self.events
                .local_activity(
                    Severity::Info,
                    "Twitter credentials changed - clearing browser session",
                )
                .await;
        }
        if report.telegram_changed {
            self.events
                .local_activity(Severity::Info, "Telegram credentials updated")
                .await;
        }
        if report.session_cleared {
            self.events
                .local_activity(Severity::Success, "Browser session cleared successfully")
                .await;
        }
    }

    async fn report_save_failure(&self, error: &CoreError) {
        self.surface(
            error,
            OperationKind::Mutating,
            format!("Failed to save configuration: {}", error.user_friendly_message()),
        )
        .await;
    }

    /// Log `error` at its strategy's level and, if the strategy makes it
    /// user-visible, add `message` to the activity log.
    async fn surface(&self, error: &CoreError, kind: OperationKind, message: String) {
        let strategy = ErrorRecovery::observe(error, kind);
        if !strategy.is_user_visible() {
            return;
        }
        let severity = match strategy {
            RecoveryStrategy::ContinueWithWarning => Severity::Warning,
            _ => Severity::Error,
        };
        self.events.local_activity(severity, message).await;
    }

    /// Drop the backend's stored browser session
    pub async fn clear_session(&self) -> Result<(), CoreError> {
        let _guard = InFlightGuard::acquire(&self.in_flight, "clear session")?;

        self.events
            .local_activity(Severity::Info, "Clearing browser session...")
            .await;
        match self.backend.clear_session().await {
            Ok(_) => {
                self.events
                    .local_activity(Severity::Success, "Browser session cleared successfully")
                    .await;
                Ok(())
            }
            Err(e) => {
                self.surface(
                    &e,
                    OperationKind::Mutating,
                    format!("Failed to clear session: {}", e.user_friendly_message()),
                )
                .await;
                Err(e)
            }
        }
    }
}
