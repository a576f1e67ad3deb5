use crate::ConfigError;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Number of activity entries kept on screen
pub const ACTIVITY_WINDOW: usize = 20;

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramCredentials {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

impl fmt::Debug for TelegramCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramCredentials")
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterCredentials")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &redact(&self.password))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "***"
    }
}

/// Keyword filters. `required` drives the search query, `optional` filters posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keywords {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

impl Keywords {
    /// Build keyword lists from comma-separated input fields.
    pub fn from_csv(required: &str, optional: &str) -> Self {
        Self {
            required: normalize_keywords(required.split(',')),
            optional: normalize_keywords(optional.split(',')),
        }
    }

    pub fn normalized(&self) -> Self {
        Self {
            required: normalize_keywords(self.required.iter()),
            optional: normalize_keywords(self.optional.iter()),
        }
    }
}

/// Trim each entry, drop blanks and keep the first occurrence of duplicates.
pub fn normalize_keywords<I, S>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for entry in entries {
        let trimmed = entry.as_ref().trim();
        if trimmed.is_empty() || out.iter().any(|existing| existing == trimmed) {
            continue;
        }
        out.push(trimmed.to_string());
    }
    out
}

fn default_true() -> bool {
    true
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Configuration {
    #[serde(default)]
    pub telegram: TelegramCredentials,
    #[serde(default)]
    pub twitter: TwitterCredentials,
    #[serde(default)]
    pub keywords: Keywords,
    #[serde(default = "default_true", alias = "contactAddressRequired")]
    pub contract_address_required: bool,
    #[serde(default = "default_backend_url", alias = "backend_url")]
    pub backend_url: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            telegram: TelegramCredentials::default(),
            twitter: TwitterCredentials::default(),
            keywords: Keywords::default(),
            contract_address_required: true,
            backend_url: default_backend_url(),
        }
    }
}

impl Configuration {
    /// Returns the configuration with trimmed keyword lists and a checked backend URL.
    pub fn normalized(&self) -> Result<Self, ConfigError> {
        Ok(Self {
            telegram: self.telegram.clone(),
            twitter: self.twitter.clone(),
            keywords: self.keywords.normalized(),
            contract_address_required: self.contract_address_required,
            backend_url: normalize_base_url(&self.backend_url)?,
        })
    }
}

/// Validate an http(s) base URL and strip surrounding whitespace and trailing slashes.
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = || ConfigError::InvalidValue {
        field: "backendUrl".to_string(),
        value: raw.to_string(),
    };

    let parsed = url::Url::parse(trimmed).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid());
    }

    Ok(trimmed.to_string())
}

/// Server-side comparison of new and previously stored credentials
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialChangeReport {
    #[serde(default)]
    pub twitter_changed: bool,
    #[serde(default)]
    pub telegram_changed: bool,
    #[serde(default)]
    pub session_cleared: bool,
}

impl CredentialChangeReport {
    pub fn has_changes(&self) -> bool {
        self.twitter_changed || self.telegram_changed || self.session_cleared
    }
}

/// Local view of the backend's automation schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomationState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl AutomationState {
    pub fn settled(running: bool) -> Self {
        if running {
            AutomationState::Running
        } else {
            AutomationState::Stopped
        }
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self, AutomationState::Starting | AutomationState::Stopping)
    }

    /// Whether a toggle widget bound to this state shows as checked
    pub fn is_checked(&self) -> bool {
        matches!(self, AutomationState::Starting | AutomationState::Running)
    }
}

impl fmt::Display for AutomationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AutomationState::Stopped => "stopped",
            AutomationState::Starting => "starting",
            AutomationState::Running => "running",
            AutomationState::Stopping => "stopping",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScrapeStatus {
    Pending,
    Succeeded,
    Failed,
}

pub const AMBIGUOUS_SCRAPE_MESSAGE: &str = "completed, no details";

/// Normalized outcome of a manual scrape trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRunResult {
    pub ok: bool,
    pub message: String,
    pub error: Option<String>,
    /// The backend answered without any recognizable field
    pub ambiguous: bool,
}

impl ScrapeRunResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
            error: None,
            ambiguous: false,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            ok: false,
            message: format!("Manual scrape failed: {}", error),
            error: Some(error),
            ambiguous: false,
        }
    }

    pub fn ambiguous() -> Self {
        Self {
            ok: true,
            message: AMBIGUOUS_SCRAPE_MESSAGE.to_string(),
            error: None,
            ambiguous: true,
        }
    }
}

/// One manual trigger and its feedback window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRun {
    pub requested_at: DateTime<Utc>,
    pub status: ScrapeStatus,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl ScrapeRun {
    pub fn pending() -> Self {
        Self {
            requested_at: Utc::now(),
            status: ScrapeStatus::Pending,
            message: None,
            error: None,
        }
    }

    pub fn complete(&mut self, result: &ScrapeRunResult) {
        self.status = if result.ok {
            ScrapeStatus::Succeeded
        } else {
            ScrapeStatus::Failed
        };
        self.message = Some(result.message.clone());
        self.error = result.error.clone();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ScrapeStatus::Failed;
        self.error = Some(error.into());
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Warning,
    Error,
    #[default]
    #[serde(other)]
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", alias = "severity", default)]
    pub severity: Severity,
}

impl ActivityEvent {
    /// A client-side entry stamped with the local wall-clock time.
    pub fn local(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
            severity,
        }
    }
}

/// What the activity panel currently shows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ActivityView {
    /// The server reported no events
    #[default]
    Empty,
    /// The operator cleared the log locally
    Cleared,
    Events(Vec<ActivityEvent>),
}

impl ActivityView {
    /// Build a view from a server event list, keeping the newest `window` entries.
    pub fn from_server(mut events: Vec<ActivityEvent>, window: usize) -> Self {
        if events.is_empty() {
            return ActivityView::Empty;
        }
        if events.len() > window {
            events.drain(..events.len() - window);
        }
        ActivityView::Events(events)
    }

    pub fn push(&mut self, event: ActivityEvent, window: usize) {
        match self {
            ActivityView::Events(events) => {
                events.push(event);
                if events.len() > window {
                    events.drain(..events.len() - window);
                }
            }
            _ => *self = ActivityView::Events(vec![event]),
        }
    }

    pub fn placeholder(&self) -> Option<&'static str> {
        match self {
            ActivityView::Empty => Some("No recent activity"),
            ActivityView::Cleared => Some("Activity log cleared"),
            ActivityView::Events(_) => None,
        }
    }

    pub fn events(&self) -> &[ActivityEvent] {
        match self {
            ActivityView::Events(events) => events,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedResult {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub feed_source: Option<String>,
    /// Candidate token-contract addresses found in the post
    #[serde(default)]
    pub mints: Vec<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub reposts: u64,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BadgeState {
    pub count: u32,
}

impl BadgeState {
    pub fn text(&self) -> Option<String> {
        (self.count > 0).then(|| self.count.to_string())
    }
}
