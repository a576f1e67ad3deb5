pub mod badge;

pub use badge::{BadgeNotifier, RecordedBadge, RecordingBadge, TerminalBadge};

use backend_client::probe_url;
use reqwest::Client;
use scrapedeck_core::host::{BADGE_ALERT_COLOR, BADGE_DEFAULT_COLOR};
use scrapedeck_core::{BadgeRenderer, CoreError, HostMessage, HostReply};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

const CHANNEL_CAPACITY: usize = 32;

#[derive(Debug)]
struct HostRequest {
    message: HostMessage,
    reply: oneshot::Sender<HostReply>,
}

/// Panel-side end of the cross-context message channel.
#[derive(Debug, Clone)]
pub struct HostChannel {
    tx: mpsc::Sender<HostRequest>,
}

impl HostChannel {
    pub async fn send(&self, message: HostMessage) -> Result<HostReply, CoreError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(HostRequest { message, reply })
            .await
            .map_err(|_| CoreError::HostUnavailable {
                reason: "background context has shut down".to_string(),
            })?;
        response.await.map_err(|_| CoreError::HostUnavailable {
            reason: "background context dropped the request".to_string(),
        })
    }

    /// Ask the background context whether `url` answers with 2xx.
    pub async fn check_backend_status(&self, url: &str) -> bool {
        match self
            .send(HostMessage::CheckBackendStatus {
                url: url.to_string(),
            })
            .await
        {
            Ok(reply) => reply.online.unwrap_or(false),
            Err(e) => {
                debug!("Backend status check unavailable: {}", e);
                false
            }
        }
    }
}

/// The long-lived background context: owns the badge and answers panel messages.
pub struct BackgroundService {
    renderer: Arc<dyn BadgeRenderer>,
    http_client: Client,
}

impl BackgroundService {
    pub fn new(renderer: Arc<dyn BadgeRenderer>, probe_timeout: Duration) -> Result<Self, CoreError> {
        let http_client = Client::builder()
            .timeout(probe_timeout)
            .build()
            .map_err(|e| CoreError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            renderer,
            http_client,
        })
    }

    pub async fn handle(&self, message: HostMessage) -> HostReply {
        match message {
            HostMessage::CheckBackendStatus { url } => {
                let online = probe_url(&self.http_client, &url).await;
                debug!("Backend at {} online: {}", url, online);
                HostReply::online(online)
            }
            HostMessage::UpdateBadge { count } => {
                if count > 0 {
                    self.renderer.set_text(&count.to_string());
                    self.renderer.set_background_color(BADGE_ALERT_COLOR);
                } else {
                    self.renderer.set_text("");
                }
                HostReply::ack()
            }
            HostMessage::ClearBadge => {
                self.renderer.set_text("");
                HostReply::ack()
            }
        }
    }

    /// Start answering messages. The task ends once every `HostChannel` is dropped.
    pub fn spawn(self) -> (HostChannel, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<HostRequest>(CHANNEL_CAPACITY);
        let handle = tokio::spawn(async move {
            info!("Background service started");
            self.renderer.set_background_color(BADGE_DEFAULT_COLOR);

            while let Some(request) = rx.recv().await {
                let reply = self.handle(request.message).await;
                // The sender may have given up waiting
                let _ = request.reply.send(reply);
            }
            info!("Background service stopped");
        });
        (HostChannel { tx }, handle)
    }
}
