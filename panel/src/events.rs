use scrapedeck_core::{
    ActivityEvent, ActivityView, AutomationState, CredentialChangeReport, ScrapeRunResult,
    ScrapedResult, Severity,
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

const EVENT_CAPACITY: usize = 64;

/// Everything a UI needs to re-render. Payloads are snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    ActivityChanged(ActivityView),
    AutomationStateChanged(AutomationState),
    ResultsUpdated(Vec<ScrapedResult>),
    BackendStatusChanged { online: bool },
    ScrapeFinished(ScrapeRunResult),
    ConfigurationSaved(CredentialChangeReport),
}

/// Shared event stream plus the displayed activity window.
#[derive(Clone)]
pub struct EventHub {
    tx: broadcast::Sender<PanelEvent>,
    activity: Arc<RwLock<ActivityView>>,
    online: Arc<RwLock<Option<bool>>>,
    window: usize,
}

impl EventHub {
    pub fn new(window: usize) -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            tx,
            activity: Arc::new(RwLock::new(ActivityView::Empty)),
            online: Arc::new(RwLock::new(None)),
            window,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: PanelEvent) {
        // No subscribers is fine
        if self.tx.send(event).is_err() {
            debug!("Panel event dropped, nobody is listening");
        }
    }

    /// Append a client-side entry. The next server sync may supersede it.
    pub async fn local_activity(&self, severity: Severity, message: impl Into<String>) {
        let event = ActivityEvent::local(severity, message);
        debug!("Activity [{:?}] {}", event.severity, event.message);

        let snapshot = {
            let mut view = self.activity.write().await;
            view.push(event, self.window);
            view.clone()
        };
        self.publish(PanelEvent::ActivityChanged(snapshot));
    }

    /// Replace the window with the server's list. Returns whether anything changed.
    pub async fn replace_activity(&self, events: Vec<ActivityEvent>) -> bool {
        let next = ActivityView::from_server(events, self.window);
        {
            let mut view = self.activity.write().await;
            if *view == next {
                return false;
            }
            *view = next.clone();
        }
        self.publish(PanelEvent::ActivityChanged(next));
        true
    }

    pub async fn clear_activity(&self) {
        *self.activity.write().await = ActivityView::Cleared;
        self.publish(PanelEvent::ActivityChanged(ActivityView::Cleared));
    }

    pub async fn activity(&self) -> ActivityView {
        self.activity.read().await.clone()
    }

    pub async fn set_backend_online(&self, online: bool) {
        let changed = {
            let mut current = self.online.write().await;
            let changed = *current != Some(online);
            *current = Some(online);
            changed
        };
        if changed {
            self.publish(PanelEvent::BackendStatusChanged { online });
        }
    }

    /// `None` until the first check completes
    pub async fn backend_online(&self) -> Option<bool> {
        *self.online.read().await
    }
}
