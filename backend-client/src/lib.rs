pub mod api;


pub use api::{
    normalize_scrape_response, probe_url, AckResponse, AutomationStatusResponse, BackendClient,
    StatusResponse,
};

use async_trait::async_trait;
use scrapedeck_core::{
    ActivityEvent, Configuration, CoreError, CredentialChangeReport, ScrapeRunResult,
    ScrapedResult,
};

/// One method per remote operation. Implementations never retry; every
/// failure maps to `BackendError::{Unreachable, HttpError, MalformedResponse}`
/// (or `CoreError::Rejected` for a 2xx whose payload reports failure).
#[async_trait]
pub trait Backend: Send + Sync {
    fn base_url(&self) -> String;

    fn set_base_url(&self, base_url: &str) -> Result<(), CoreError>;

    async fn get_status(&self) -> Result<StatusResponse, CoreError>;

    async fn get_config(&self) -> Result<Option<Configuration>, CoreError>;

    async fn save_config(&self, config: &Configuration) -> Result<AckResponse, CoreError>;

    async fn trigger_scrape(&self) -> Result<ScrapeRunResult, CoreError>;

    /// Server-side `running` flag
    async fn get_automation_status(&self) -> Result<bool, CoreError>;

    async fn set_automation(&self, enabled: bool) -> Result<AckResponse, CoreError>;

    async fn get_results(&self) -> Result<Vec<ScrapedResult>, CoreError>;

    async fn validate_credentials(
        &self,
        config: &Configuration,
    ) -> Result<CredentialChangeReport, CoreError>;

    async fn clear_session(&self) -> Result<AckResponse, CoreError>;

    async fn get_activity_log(&self) -> Result<Vec<ActivityEvent>, CoreError>;
}
