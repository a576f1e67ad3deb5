#[cfg(test)]
mod tests {
    use crate::{Panel, PanelAction, PanelEvent};
    use async_trait::async_trait;
    use background_service::{BackgroundService, BadgeNotifier, RecordingBadge};
    use backend_client::{normalize_scrape_response, AckResponse, Backend, StatusResponse};
    use config_store::{ConfigStore, MemoryStore};
    use scrapedeck_core::{
        normalize_base_url, ActivityEvent, ActivityView, AutomationState, BackendError,
        Configuration, CoreError, CredentialChangeReport, PanelSettings, ScrapeRunResult,
        ScrapeStatus, ScrapedResult, Severity, AMBIGUOUS_SCRAPE_MESSAGE,
    };
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Calls {
        status: AtomicUsize,
        set_automation: AtomicUsize,
        automation_status: AtomicUsize,
        trigger_scrape: AtomicUsize,
        results: AtomicUsize,
        activity: AtomicUsize,
        save_config: AtomicUsize,
        validate: AtomicUsize,
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    struct FakeBackend {
        base_url: Mutex<String>,
        calls: Calls,
        online: AtomicBool,
        server_running: AtomicBool,
        fail_set_automation: AtomicBool,
        fail_save_config: AtomicBool,
        fail_validate: AtomicBool,
        fail_activity: AtomicBool,
        scrape_response: Mutex<Value>,
        activity: Mutex<Vec<ActivityEvent>>,
        results: Mutex<Vec<ScrapedResult>>,
        report: Mutex<CredentialChangeReport>,
        gate: Mutex<Option<Arc<Notify>>>,
        activity_delay: Mutex<Option<Duration>>,
        activity_active: AtomicUsize,
        activity_max: AtomicUsize,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                base_url: Mutex::new("http://localhost:5000".to_string()),
                calls: Calls::default(),
                online: AtomicBool::new(true),
                server_running: AtomicBool::new(false),
                fail_set_automation: AtomicBool::new(false),
                fail_save_config: AtomicBool::new(false),
                fail_validate: AtomicBool::new(false),
                fail_activity: AtomicBool::new(false),
                scrape_response: Mutex::new(json!({"success": true, "message": "ok"})),
                activity: Mutex::new(Vec::new()),
                results: Mutex::new(Vec::new()),
                report: Mutex::new(CredentialChangeReport::default()),
                gate: Mutex::new(None),
                activity_delay: Mutex::new(None),
                activity_active: AtomicUsize::new(0),
                activity_max: AtomicUsize::new(0),
            }
        }

        /// Hold `set_automation` and `trigger_scrape` until the gate is notified
        fn install_gate(&self) -> Arc<Notify> {
            let gate = Arc::new(Notify::new());
            *self.gate.lock().unwrap() = Some(gate.clone());
            gate
        }

        async fn pass_gate(&self) {
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }
        }

        fn unreachable(endpoint: &str) -> CoreError {
            CoreError::Backend(BackendError::Unreachable {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            })
        }

        fn set_results(&self, n: usize) {
            *self.results.lock().unwrap() = (0..n)
                .map(|i| ScrapedResult {
                    username: format!("user{}", i),
                    text: "new mint".to_string(),
                    ..Default::default()
                })
                .collect();
        }
    }

    #[async_trait]
    impl Backend for FakeBackend {
        fn base_url(&self) -> String {
            self.base_url.lock().unwrap().clone()
        }

        fn set_base_url(&self, base_url: &str) -> Result<(), CoreError> {
            *self.base_url.lock().unwrap() = normalize_base_url(base_url)?;
            Ok(())
        }

        async fn get_status(&self) -> Result<StatusResponse, CoreError> {
            self.calls.status.fetch_add(1, Ordering::SeqCst);
            if self.online.load(Ordering::SeqCst) {
                Ok(StatusResponse::default())
            } else {
                Err(Self::unreachable("/status"))
            }
        }

        async fn get_config(&self) -> Result<Option<Configuration>, CoreError> {
            Ok(None)
        }

        async fn save_config(&self, _config: &Configuration) -> Result<AckResponse, CoreError> {
            self.calls.save_config.fetch_add(1, Ordering::SeqCst);
            if self.fail_save_config.load(Ordering::SeqCst) {
                return Err(CoreError::Backend(BackendError::HttpError {
                    status: 500,
                    endpoint: "/api/config".to_string(),
                    detail: Some("disk full".to_string()),
                }));
            }
            Ok(AckResponse {
                success: Some(true),
                ..Default::default()
            })
        }

        async fn trigger_scrape(&self) -> Result<ScrapeRunResult, CoreError> {
            self.calls.trigger_scrape.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await;
            let response = self.scrape_response.lock().unwrap().clone();
            Ok(normalize_scrape_response(&response))
        }

        async fn get_automation_status(&self) -> Result<bool, CoreError> {
            self.calls.automation_status.fetch_add(1, Ordering::SeqCst);
            Ok(self.server_running.load(Ordering::SeqCst))
        }

        async fn set_automation(&self, enabled: bool) -> Result<AckResponse, CoreError> {
            self.calls.set_automation.fetch_add(1, Ordering::SeqCst);
            self.pass_gate().await;
            if self.fail_set_automation.load(Ordering::SeqCst) {
                return Err(Self::unreachable("/api/automation"));
            }
            self.server_running.store(enabled, Ordering::SeqCst);
            Ok(AckResponse {
                success: Some(true),
                ..Default::default()
            })
        }

        async fn get_results(&self) -> Result<Vec<ScrapedResult>, CoreError> {
            self.calls.results.fetch_add(1, Ordering::SeqCst);
            Ok(self.results.lock().unwrap().clone())
        }

        async fn validate_credentials(
            &self,
            _config: &Configuration,
        ) -> Result<CredentialChangeReport, CoreError> {
            self.calls.validate.fetch_add(1, Ordering::SeqCst);
            if self.fail_validate.load(Ordering::SeqCst) {
                return Err(Self::unreachable("/api/credentials/validate"));
            }
            Ok(*self.report.lock().unwrap())
        }

        async fn clear_session(&self) -> Result<AckResponse, CoreError> {
            Ok(AckResponse::default())
        }

        async fn get_activity_log(&self) -> Result<Vec<ActivityEvent>, CoreError> {
            self.calls.activity.fetch_add(1, Ordering::SeqCst);
            let active = self.activity_active.fetch_add(1, Ordering::SeqCst) + 1;
            self.activity_max.fetch_max(active, Ordering::SeqCst);

            let delay = *self.activity_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.activity_active.fetch_sub(1, Ordering::SeqCst);

            if self.fail_activity.load(Ordering::SeqCst) {
                return Err(Self::unreachable("/api/activity/log"));
            }
            Ok(self.activity.lock().unwrap().clone())
        }
    }

    struct Harness {
        backend: Arc<FakeBackend>,
        store: ConfigStore,
        badge: Arc<RecordingBadge>,
        notifier: BadgeNotifier,
        panel: Panel,
    }

    fn harness() -> Harness {
        let backend = Arc::new(FakeBackend::new());
        let store = ConfigStore::new(Arc::new(MemoryStore::new()));
        let badge = Arc::new(RecordingBadge::new());
        let service = BackgroundService::new(badge.clone(), Duration::from_secs(1)).unwrap();
        let (channel, _handle) = service.spawn();
        let notifier = BadgeNotifier::new(channel);
        let panel = Panel::new(
            &PanelSettings::default(),
            backend.clone(),
            store.clone(),
            notifier.clone(),
        );
        Harness {
            backend,
            store,
            badge,
            notifier,
            panel,
        }
    }

    fn config(url: &str) -> Configuration {
        let mut config = Configuration::default();
        config.twitter.username = "watcher".to_string();
        config.twitter.password = "hunter2".to_string();
        config.telegram.bot_token = "123:abc".to_string();
        config.keywords.required = vec![" pump ".to_string(), "".to_string()];
        config.backend_url = url.to_string();
        config
    }

    async fn wait_for(counter: &AtomicUsize, target: usize) {
        while count(counter) < target {
            tokio::task::yield_now().await;
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<PanelEvent>) -> Vec<PanelEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn messages(view: &ActivityView) -> Vec<String> {
        view.events().iter().map(|e| e.message.clone()).collect()
    }

    #[tokio::test]
    async fn test_rapid_toggle_makes_one_request() {
        let h = harness();
        let gate = h.backend.install_gate();

        let controller = h.panel.controller().clone();
        let first = tokio::spawn(async move { controller.toggle(true).await });
        wait_for(&h.backend.calls.set_automation, 1).await;

        assert_eq!(h.panel.automation_state().await, AutomationState::Starting);
        let second = h.panel.toggle_automation(true).await;
        assert!(matches!(second, Err(CoreError::Busy { .. })));
        let reverse = h.panel.toggle_automation(false).await;
        assert!(matches!(reverse, Err(CoreError::Busy { .. })));

        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), AutomationState::Running);
        assert_eq!(count(&h.backend.calls.set_automation), 1);
    }

    #[tokio::test]
    async fn test_toggle_reaches_server_when_local_state_is_stale() {
        let h = harness();
        h.backend.server_running.store(true, Ordering::SeqCst);
        assert_eq!(h.panel.automation_state().await, AutomationState::Stopped);

        let state = h.panel.toggle_automation(false).await.unwrap();
        assert_eq!(state, AutomationState::Stopped);
        assert_eq!(count(&h.backend.calls.set_automation), 1);
        assert!(!h.backend.server_running.load(Ordering::SeqCst));

        let entries = messages(&h.panel.activity().await);
        assert!(entries.contains(&"Automation stopped successfully".to_string()));
    }

    #[tokio::test]
    async fn test_scrape_is_single_flight() {
        let h = harness();
        let gate = h.backend.install_gate();

        let controller = h.panel.controller().clone();
        let first = tokio::spawn(async move { controller.trigger_scrape().await });
        wait_for(&h.backend.calls.trigger_scrape, 1).await;
        assert!(h.panel.is_loading());

        let second = h.panel.trigger_scrape().await;
        assert!(matches!(second, Err(CoreError::Busy { .. })));
        // Mutating intents share the slot
        let toggle = h.panel.toggle_automation(true).await;
        assert!(matches!(toggle, Err(CoreError::Busy { .. })));
        assert_eq!(count(&h.backend.calls.set_automation), 0);

        gate.notify_one();
        assert!(first.await.unwrap().unwrap().ok);
        assert_eq!(count(&h.backend.calls.trigger_scrape), 1);
        assert!(!h.panel.is_loading());

        let run = h.panel.controller().last_scrape().await.unwrap();
        assert_eq!(run.status, ScrapeStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_offline_toggle_rolls_back() {
        let h = harness();
        h.backend.fail_set_automation.store(true, Ordering::SeqCst);
        let mut rx = h.panel.subscribe();

        let result = h.panel.toggle_automation(true).await;
        assert!(matches!(
            result,
            Err(CoreError::Backend(BackendError::Unreachable { .. }))
        ));

        let state = h.panel.automation_state().await;
        assert_eq!(state, AutomationState::Stopped);
        assert!(!state.is_checked());

        let transitions: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter_map(|event| match event {
                PanelEvent::AutomationStateChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            transitions,
            vec![AutomationState::Starting, AutomationState::Stopped]
        );

        let activity = h.panel.activity().await;
        let last = activity.events().last().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.starts_with("Failed to toggle automation"));
    }

    #[tokio::test]
    async fn test_refresh_settles_pending_toggle() {
        let h = harness();
        let gate = h.backend.install_gate();
        h.backend.fail_set_automation.store(true, Ordering::SeqCst);

        let controller = h.panel.controller().clone();
        let toggle = tokio::spawn(async move { controller.toggle(true).await });
        wait_for(&h.backend.calls.set_automation, 1).await;

        // Contradicting answer leaves the toggle to decide
        let state = h.panel.controller().refresh_status().await.unwrap();
        assert_eq!(state, AutomationState::Starting);

        h.backend.server_running.store(true, Ordering::SeqCst);
        let state = h.panel.controller().refresh_status().await.unwrap();
        assert_eq!(state, AutomationState::Running);

        // The server already confirmed, so the failed request does not roll back
        gate.notify_one();
        assert!(toggle.await.unwrap().is_err());
        assert_eq!(h.panel.automation_state().await, AutomationState::Running);
    }

    #[tokio::test]
    async fn test_scrape_response_shapes() {
        let h = harness();
        let cases = [
            (json!({"success": true, "message": "ok"}), true, false),
            (json!({"message": "ok"}), true, false),
            (json!({"error": "bad"}), false, false),
            (json!({}), true, true),
        ];

        for (response, ok, ambiguous) in cases {
            *h.backend.scrape_response.lock().unwrap() = response.clone();
            let result = h.panel.trigger_scrape().await.unwrap();
            assert_eq!(result.ok, ok, "response {}", response);
            assert_eq!(result.ambiguous, ambiguous, "response {}", response);
        }

        let run = h.panel.controller().last_scrape().await.unwrap();
        assert_eq!(run.status, ScrapeStatus::Succeeded);
        assert_eq!(run.message.as_deref(), Some(AMBIGUOUS_SCRAPE_MESSAGE));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_stored_config() {
        let h = harness();
        let first = h
            .panel
            .save_configuration(&config("http://localhost:5000/"))
            .await
            .unwrap();
        assert_eq!(first.keywords.required, vec!["pump"]);

        h.backend.fail_save_config.store(true, Ordering::SeqCst);
        let mut rx = h.panel.subscribe();
        let result = h
            .panel
            .save_configuration(&config("http://10.0.0.5:8000"))
            .await;
        assert!(matches!(
            result,
            Err(CoreError::Backend(BackendError::HttpError { status: 500, .. }))
        ));

        assert_eq!(h.store.load().await.unwrap(), first);
        assert_eq!(h.backend.base_url(), "http://localhost:5000");
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, PanelEvent::ConfigurationSaved(_))));

        let activity = h.panel.activity().await;
        let last = activity.events().last().unwrap();
        assert_eq!(last.severity, Severity::Error);
        assert!(last.message.starts_with("Failed to save configuration"));
    }

    #[tokio::test]
    async fn test_credential_validation_is_advisory() {
        let h = harness();
        h.backend.fail_validate.store(true, Ordering::SeqCst);

        let saved = h
            .panel
            .save_configuration(&config("http://localhost:5000"))
            .await
            .unwrap();
        assert_eq!(h.store.load().await.unwrap(), saved);
        assert_eq!(count(&h.backend.calls.save_config), 1);

        let activity = h.panel.activity().await;
        assert!(activity
            .events()
            .iter()
            .any(|e| e.severity == Severity::Warning
                && e.message.starts_with("Credential validation failed")));
    }

    #[tokio::test]
    async fn test_credential_changes_are_reported() {
        let h = harness();
        *h.backend.report.lock().unwrap() = CredentialChangeReport {
            twitter_changed: true,
            telegram_changed: false,
            session_cleared: true,
        };
        let mut rx = h.panel.subscribe();

        h.panel
            .update(PanelAction::SaveConfiguration(Box::new(config(
                "http://localhost:5000",
            ))))
            .await
            .unwrap();

        let logged = messages(&h.panel.activity().await);
        let has = |message: &str| logged.iter().any(|m| m == message);
        assert!(has("Twitter credentials changed - clearing browser session"));
        assert!(has("Browser session cleared successfully"));
        assert!(!has("Telegram credentials updated"));

        assert!(drain(&mut rx).iter().any(|e| matches!(
            e,
            PanelEvent::ConfigurationSaved(report) if report.twitter_changed
        )));
    }

    #[tokio::test]
    async fn test_empty_activity_shows_placeholder() {
        let h = harness();
        *h.backend.activity.lock().unwrap() = vec![ActivityEvent {
            timestamp: "10:00:00".to_string(),
            message: "Scrape started".to_string(),
            severity: Severity::Info,
        }];
        let sync = h.panel.sync_loop();

        assert!(sync.sync_activity_once().await.unwrap());
        assert_eq!(messages(&h.panel.activity().await), vec!["Scrape started"]);
        // Same list again is not re-rendered
        assert!(!sync.sync_activity_once().await.unwrap());

        h.backend.activity.lock().unwrap().clear();
        sync.sync_activity_once().await.unwrap();
        let view = h.panel.activity().await;
        assert_eq!(view, ActivityView::Empty);
        assert_eq!(view.placeholder(), Some("No recent activity"));
    }

    #[tokio::test]
    async fn test_activity_failure_keeps_last_view() {
        let h = harness();
        *h.backend.activity.lock().unwrap() = vec![ActivityEvent {
            timestamp: "10:00:00".to_string(),
            message: "Found 3 posts".to_string(),
            severity: Severity::Success,
        }];
        let sync = h.panel.sync_loop();
        sync.sync_activity_once().await.unwrap();

        h.backend.fail_activity.store(true, Ordering::SeqCst);
        assert!(sync.sync_activity_once().await.is_err());
        assert_eq!(messages(&h.panel.activity().await), vec!["Found 3 posts"]);
    }

    #[tokio::test]
    async fn test_clear_activity_until_next_sync() {
        let h = harness();
        h.panel.update(PanelAction::ClearActivityLog).await.unwrap();
        let view = h.panel.activity().await;
        assert_eq!(view.placeholder(), Some("Activity log cleared"));

        h.panel.sync_loop().sync_activity_once().await.unwrap();
        assert_eq!(h.panel.activity().await, ActivityView::Empty);
    }

    #[tokio::test]
    async fn test_open_marks_results_seen_and_clears_badge() {
        let h = harness();
        h.backend.set_results(5);
        h.store.set_last_result_count(2).await.unwrap();

        assert_eq!(h.panel.sync_loop().sync_results().await.unwrap(), 5);
        assert_eq!(h.notifier.state().await.count, 3);
        assert_eq!(h.badge.snapshot().text, "3");

        h.panel.open().await;
        h.panel.close().await;
        assert_eq!(h.notifier.state().await.count, 0);
        assert_eq!(h.badge.snapshot().text, "");
        assert_eq!(h.store.last_result_count().await, 5);
        assert_eq!(h.panel.results().await.len(), 5);

        h.backend.set_results(7);
        h.panel.refresh_results().await.unwrap();
        assert_eq!(h.badge.snapshot().text, "2");
    }

    #[tokio::test]
    async fn test_offline_open_keeps_seen_count() {
        let h = harness();
        h.backend.set_results(5);
        h.backend.online.store(false, Ordering::SeqCst);
        h.store.set_last_result_count(5).await.unwrap();

        h.panel.open().await;
        h.panel.close().await;
        assert_eq!(h.store.last_result_count().await, 5);
        assert!(!h.panel.sync_loop().mark_results_seen().await.unwrap());

        h.backend.online.store(true, Ordering::SeqCst);
        assert_eq!(h.panel.refresh_results().await.unwrap(), 5);
        assert_eq!(h.notifier.state().await.count, 0);
        assert_eq!(h.badge.snapshot().text, "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_loop_stops_cleanly() {
        let h = harness();
        let sync = h.panel.sync_loop();

        assert!(sync.start());
        assert!(!sync.start());
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(count(&h.backend.calls.activity), 3);
        assert_eq!(count(&h.backend.calls.status), 1);
        assert_eq!(count(&h.backend.calls.results), 1);
        assert_eq!(count(&h.backend.calls.automation_status), 1);

        sync.stop().await;
        assert!(!sync.is_running());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count(&h.backend.calls.activity), 3);

        // Restartable
        assert!(sync.start());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count(&h.backend.calls.activity), 4);
        sync.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticks_do_not_overlap() {
        let h = harness();
        *h.backend.activity_delay.lock().unwrap() = Some(Duration::from_secs(5));
        let sync = h.panel.sync_loop();

        sync.start();
        tokio::time::sleep(Duration::from_secs(20)).await;
        sync.stop().await;

        let calls = count(&h.backend.calls.activity);
        assert!((2..=5).contains(&calls), "calls = {}", calls);
        assert_eq!(h.backend.activity_max.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_slot_skips_when_offline() {
        let h = harness();
        h.backend.online.store(false, Ordering::SeqCst);
        let mut rx = h.panel.subscribe();
        let sync = h.panel.sync_loop();

        sync.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        sync.stop().await;

        assert_eq!(count(&h.backend.calls.status), 1);
        assert_eq!(count(&h.backend.calls.results), 0);
        assert!(drain(&mut rx)
            .contains(&PanelEvent::BackendStatusChanged { online: false }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_scrape_refreshes_results_later() {
        let h = harness();
        h.backend.set_results(1);

        h.panel.trigger_scrape().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(count(&h.backend.calls.results), 0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count(&h.backend.calls.results), 1);
        assert_eq!(h.panel.results().await.len(), 1);

        *h.backend.scrape_response.lock().unwrap() = json!({"error": "login required"});
        let result = h.panel.trigger_scrape().await.unwrap();
        assert_eq!(result.message, "Manual scrape failed: login required");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count(&h.backend.calls.results), 1);
    }

    #[tokio::test]
    async fn test_backend_url_change_rechecks_status() {
        let h = harness();
        let result = h.panel.set_backend_url("not a url").await;
        assert!(matches!(result, Err(CoreError::Config(_))));
        assert_eq!(count(&h.backend.calls.status), 0);

        assert!(h
            .panel
            .set_backend_url("http://192.168.1.20:5000/")
            .await
            .unwrap());
        assert_eq!(h.backend.base_url(), "http://192.168.1.20:5000");
        assert_eq!(count(&h.backend.calls.status), 1);
    }

    #[test]
    fn test_contract_address_flag_is_logged() {
        tokio_test::block_on(async {
            let h = harness();
            assert!(h.panel.contract_address_required().await);
            h.panel
                .update(PanelAction::SetContractAddressRequired(false))
                .await
                .unwrap();
            assert!(!h.panel.contract_address_required().await);
            assert_eq!(
                messages(&h.panel.activity().await),
                vec!["Contract address requirement: disabled"]
            );
        });
    }
}
