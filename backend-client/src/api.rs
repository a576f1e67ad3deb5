use crate::Backend;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use scrapedeck_core::{
    normalize_base_url, ActivityEvent, BackendError, Configuration, CoreError,
    CredentialChangeReport, PanelSettings, ScrapeRunResult, ScrapedResult,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const STATUS_ENDPOINT: &str = "/status";
pub const CONFIG_ENDPOINT: &str = "/api/config";
pub const SCRAPE_ENDPOINT: &str = "/api/scrape";
pub const AUTOMATION_ENDPOINT: &str = "/api/automation";
pub const AUTOMATION_STATUS_ENDPOINT: &str = "/api/automation/status";
pub const RESULTS_ENDPOINT: &str = "/api/results";
pub const VALIDATE_CREDENTIALS_ENDPOINT: &str = "/api/credentials/validate";
pub const CLEAR_SESSION_ENDPOINT: &str = "/api/credentials/clear-session";
pub const ACTIVITY_LOG_ENDPOINT: &str = "/api/activity/log";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    pub automation_enabled: Option<bool>,
    pub scrape_running: Option<bool>,
}

/// Generic acknowledgement. The backend reports failure either through a
/// non-2xx status or through an `error`/`success: false` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: Option<bool>,
    pub status: Option<String>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl AckResponse {
    pub fn into_result(self) -> Result<AckResponse, CoreError> {
        if let Some(error) = self.error.clone() {
            return Err(CoreError::Rejected { message: error });
        }
        if self.success == Some(false) {
            return Err(CoreError::Rejected {
                message: self
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutomationStatusResponse {
    pub running: Option<bool>,
    pub enabled: Option<bool>,
    pub scrape_running: Option<bool>,
    pub has_config: Option<bool>,
}

impl AutomationStatusResponse {
    pub fn is_running(&self) -> Option<bool> {
        self.running.or(self.enabled)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultsResponse {
    #[serde(default)]
    pub results: Vec<ScrapedResult>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityLogResponse {
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    pub config: Option<Configuration>,
}

/// Collapse the backend's scrape-trigger answers into one result.
///
/// Precedence: an explicit `success`/`status: "success"` flag, then an
/// `error` field, then `success: false`, then a bare `message`. Anything
/// else is an ambiguous success, since the scrape may have run anyway.
pub fn normalize_scrape_response(value: &Value) -> ScrapeRunResult {
    match value {
        Value::String(message) if !message.trim().is_empty() => {
            ScrapeRunResult::succeeded(message.trim())
        }
        Value::Object(map) => {
            let text = |key: &str| -> Option<String> {
                match map.get(key)? {
                    Value::Null => None,
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => Some(s.trim().to_string()),
                    other => Some(other.to_string()),
                }
            };
            let explicit = map.get("success").and_then(Value::as_bool).or_else(|| {
                map.get("status")
                    .and_then(Value::as_str)
                    .filter(|status| status.eq_ignore_ascii_case("success"))
                    .map(|_| true)
            });

            match (explicit, text("error"), text("message")) {
                (Some(true), _, message) => ScrapeRunResult::succeeded(
                    message.unwrap_or_else(|| "Scrape finished successfully".to_string()),
                ),
                (_, Some(error), _) => ScrapeRunResult::failed(error),
                (Some(false), None, message) => ScrapeRunResult::failed(
                    message.unwrap_or_else(|| "Backend reported failure".to_string()),
                ),
                (None, None, Some(message)) => ScrapeRunResult::succeeded(message),
                (None, None, None) => ScrapeRunResult::ambiguous(),
            }
        }
        _ => ScrapeRunResult::ambiguous(),
    }
}

/// Pull `{"error": "..."}` out of a failure body when the backend sent one
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn transport_error(endpoint: &str, e: &reqwest::Error) -> CoreError {
    let reason = if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        "connection failed".to_string()
    } else {
        e.to_string()
    };
    CoreError::Backend(BackendError::Unreachable {
        endpoint: endpoint.to_string(),
        reason,
    })
}

fn malformed(endpoint: &str, details: impl Into<String>) -> CoreError {
    CoreError::Backend(BackendError::MalformedResponse {
        endpoint: endpoint.to_string(),
        details: details.into(),
    })
}

#[derive(Debug)]
pub struct BackendClient {
    http_client: Client,
    base_url: RwLock<String>,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let base_url = normalize_base_url(base_url)?;
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            base_url: RwLock::new(base_url),
        })
    }

    pub fn from_settings(settings: &PanelSettings) -> Result<Self, CoreError> {
        Self::new(&settings.backend_url, settings.request_timeout())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.current_base_url(), endpoint)
    }

    fn current_base_url(&self) -> String {
        match self.base_url.read() {
            Ok(url) => url.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<Response, CoreError> {
        let url = self.url(endpoint);
        let mut request_builder = self
            .http_client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request_builder = request_builder.json(body);
        }

        debug!("Making backend request: {} {}", method, url);
        let response = match request_builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Network error for {} {}: {}", method, endpoint, e);
                return Err(transport_error(endpoint, &e));
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!("Request successful: {} {}", status, endpoint);
            return Ok(response);
        }

        let detail = match response.text().await {
            Ok(body) => error_detail(&body),
            Err(_) => None,
        };
        error!(
            "Request failed with status: {} for {} {}",
            status, method, endpoint
        );
        Err(CoreError::Backend(BackendError::HttpError {
            status: status.as_u16(),
            endpoint: endpoint.to_string(),
            detail,
        }))
    }

    async fn read_body(response: Response, endpoint: &str) -> Result<Vec<u8>, CoreError> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(endpoint, &e))?;
        Ok(bytes.to_vec())
    }

    async fn read_json<T: DeserializeOwned>(
        response: Response,
        endpoint: &str,
    ) -> Result<T, CoreError> {
        let bytes = Self::read_body(response, endpoint).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            error!("Failed to parse response from {}: {}", endpoint, e);
            malformed(endpoint, e.to_string())
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, CoreError> {
        let response = self.send(Method::GET, endpoint, None).await?;
        Self::read_json(response, endpoint).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<T, CoreError> {
        let response = self.send(Method::POST, endpoint, body).await?;
        Self::read_json(response, endpoint).await
    }
}

#[async_trait]
impl Backend for BackendClient {
    fn base_url(&self) -> String {
        self.current_base_url()
    }

    fn set_base_url(&self, base_url: &str) -> Result<(), CoreError> {
        let normalized = normalize_base_url(base_url)?;
        let mut guard = match self.base_url.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *guard != normalized {
            info!("Backend endpoint changed to {}", normalized);
            *guard = normalized;
        }
        Ok(())
    }

    async fn get_status(&self) -> Result<StatusResponse, CoreError> {
        let response = self.send(Method::GET, STATUS_ENDPOINT, None).await?;
        // Any 2xx means online; the body is informational only
        let bytes = Self::read_body(response, STATUS_ENDPOINT).await?;
        Ok(serde_json::from_slice(&bytes).unwrap_or_default())
    }

    async fn get_config(&self) -> Result<Option<Configuration>, CoreError> {
        let response: ConfigResponse = self.get_json(CONFIG_ENDPOINT).await?;
        Ok(response.config)
    }

    async fn save_config(&self, config: &Configuration) -> Result<AckResponse, CoreError> {
        let body = serde_json::to_value(config)?;
        let ack: AckResponse = self.post_json(CONFIG_ENDPOINT, Some(&body)).await?;
        ack.into_result()
    }

    async fn trigger_scrape(&self) -> Result<ScrapeRunResult, CoreError> {
        let response = self.send(Method::POST, SCRAPE_ENDPOINT, None).await?;
        let bytes = Self::read_body(response, SCRAPE_ENDPOINT).await?;
        let value = match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => value,
            Err(e) => {
                debug!("Scrape response is not JSON ({}), treating as no details", e);
                Value::Null
            }
        };
        let result = normalize_scrape_response(&value);
        info!(
            "Manual scrape trigger answered: ok={} ambiguous={}",
            result.ok, result.ambiguous
        );
        Ok(result)
    }

    async fn get_automation_status(&self) -> Result<bool, CoreError> {
        let status: AutomationStatusResponse = self.get_json(AUTOMATION_STATUS_ENDPOINT).await?;
        status.is_running().ok_or_else(|| {
            malformed(
                AUTOMATION_STATUS_ENDPOINT,
                "neither `running` nor `enabled` present",
            )
        })
    }

    async fn set_automation(&self, enabled: bool) -> Result<AckResponse, CoreError> {
        let body = json!({ "enabled": enabled });
        let ack: AckResponse = self.post_json(AUTOMATION_ENDPOINT, Some(&body)).await?;
        ack.into_result()
    }

    async fn get_results(&self) -> Result<Vec<ScrapedResult>, CoreError> {
        let response: ResultsResponse = self.get_json(RESULTS_ENDPOINT).await?;
        debug!("Retrieved {} results", response.results.len());
        Ok(response.results)
    }

    async fn validate_credentials(
        &self,
        config: &Configuration,
    ) -> Result<CredentialChangeReport, CoreError> {
        let body = serde_json::to_value(config)?;
        self.post_json(VALIDATE_CREDENTIALS_ENDPOINT, Some(&body))
            .await
    }

    async fn clear_session(&self) -> Result<AckResponse, CoreError> {
        let ack: AckResponse = self.post_json(CLEAR_SESSION_ENDPOINT, None).await?;
        ack.into_result()
    }

    async fn get_activity_log(&self) -> Result<Vec<ActivityEvent>, CoreError> {
        let response: ActivityLogResponse = self.get_json(ACTIVITY_LOG_ENDPOINT).await?;
        Ok(response.events)
    }
}

/// GET an arbitrary URL and report whether it answered with 2xx.
pub async fn probe_url(client: &Client, url: &str) -> bool {
    match client.get(url).send().await {
        Ok(response) => response.status().is_success(),
        Err(e) => {
            debug!("Status probe to {} failed: {}", url, e);
            false
        }
    }
}
