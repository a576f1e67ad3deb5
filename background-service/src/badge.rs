use crate::HostChannel;
use scrapedeck_core::{BadgeRenderer, BadgeState, HostMessage};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

/// Turns an unseen-result count into a host badge, via the background context.
#[derive(Clone)]
pub struct BadgeNotifier {
    channel: HostChannel,
    state: Arc<AsyncMutex<BadgeState>>,
}

impl BadgeNotifier {
    pub fn new(channel: HostChannel) -> Self {
        Self {
            channel,
            state: Arc::new(AsyncMutex::new(BadgeState::default())),
        }
    }

    /// 0 clears the indicator, anything else shows the number.
    pub async fn set_count(&self, count: u32) {
        let mut state = self.state.lock().await;
        state.count = count;
        if let Err(e) = self
            .channel
            .send(HostMessage::UpdateBadge { count })
            .await
        {
            debug!("Could not update badge: {}", e);
        }
    }

    /// The panel became visible. Everything counts as seen, whatever the
    /// previous count was.
    pub async fn clear_on_open(&self) {
        let mut state = self.state.lock().await;
        state.count = 0;
        if let Err(e) = self.channel.send(HostMessage::ClearBadge).await {
            debug!("Could not clear badge: {}", e);
        }
    }

    pub async fn state(&self) -> BadgeState {
        *self.state.lock().await
    }
}

/// Desktop adapter: the badge is a log line.
#[derive(Debug, Default)]
pub struct TerminalBadge;

impl BadgeRenderer for TerminalBadge {
    fn set_text(&self, text: &str) {
        if text.is_empty() {
            info!("Badge cleared");
        } else {
            info!("Badge: {} new result(s)", text);
        }
    }

    fn set_background_color(&self, color: &str) {
        debug!("Badge color {}", color);
    }
}

/// Keeps the last rendered badge in memory, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct RecordingBadge {
    inner: Mutex<RecordedBadge>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedBadge {
    pub text: String,
    pub color: Option<String>,
    pub renders: usize,
}

impl RecordingBadge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RecordedBadge {
        match self.inner.lock() {
            Ok(inner) => inner.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn with<F: FnOnce(&mut RecordedBadge)>(&self, apply: F) {
        match self.inner.lock() {
            Ok(mut inner) => apply(&mut inner),
            Err(poisoned) => apply(&mut poisoned.into_inner()),
        }
    }
}

impl BadgeRenderer for RecordingBadge {
    fn set_text(&self, text: &str) {
        self.with(|badge| {
            badge.text = text.to_string();
            badge.renders += 1;
        });
    }

    fn set_background_color(&self, color: &str) {
        self.with(|badge| badge.color = Some(color.to_string()));
    }
}
