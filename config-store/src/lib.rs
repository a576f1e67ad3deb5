pub mod stores;


pub use stores::{FileStore, MemoryStore};

use scrapedeck_core::host::keys;
use scrapedeck_core::{Configuration, CoreError, KeyValueStore};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Durable home of the operator's configuration and the two advisory flags.
#[derive(Clone)]
pub struct ConfigStore {
    store: Arc<dyn KeyValueStore>,
}

impl ConfigStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Last saved configuration. Absent, unreadable or corrupt payloads all
    /// come back as `None`.
    pub async fn load(&self) -> Option<Configuration> {
        let value = match self.store.get(keys::CONFIG).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!("No saved configuration");
                return None;
            }
            Err(e) => {
                warn!("Could not read saved configuration: {}", e);
                return None;
            }
        };

        match serde_json::from_value::<Configuration>(value) {
            Ok(config) => match config.normalized() {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Ignoring saved configuration: {}", e);
                    None
                }
            },
            Err(e) => {
                // The error text can quote stored values, so only the category is logged
                warn!("Ignoring corrupt saved configuration ({:?})", e.classify());
                None
            }
        }
    }

    /// Normalize and persist `config` as a single record. Returns what was stored.
    pub async fn save(&self, config: &Configuration) -> Result<Configuration, CoreError> {
        let normalized = config.normalized()?;
        let value = serde_json::to_value(&normalized)?;
        self.store.set(keys::CONFIG, value).await?;
        info!(
            "Saved configuration ({} required, {} optional keywords)",
            normalized.keywords.required.len(),
            normalized.keywords.optional.len()
        );
        Ok(normalized)
    }

    pub async fn contract_address_required(&self) -> bool {
        match self.store.get(keys::CONTRACT_ADDRESS_REQUIRED).await {
            Ok(Some(Value::Bool(required))) => required,
            Ok(_) => true,
            Err(e) => {
                warn!("Could not read contract address flag: {}", e);
                true
            }
        }
    }

    pub async fn set_contract_address_required(&self, required: bool) -> Result<(), CoreError> {
        self.store
            .set(keys::CONTRACT_ADDRESS_REQUIRED, Value::Bool(required))
            .await
    }

    /// Number of results the operator has already seen
    pub async fn last_result_count(&self) -> usize {
        match self.store.get(keys::LAST_RESULT_COUNT).await {
            Ok(Some(value)) => value.as_u64().unwrap_or(0) as usize,
            Ok(None) => 0,
            Err(e) => {
                debug!("Could not read last result count: {}", e);
                0
            }
        }
    }

    pub async fn set_last_result_count(&self, count: usize) -> Result<(), CoreError> {
        self.store
            .set(keys::LAST_RESULT_COUNT, Value::from(count as u64))
            .await
    }
}
