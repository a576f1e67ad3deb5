use crate::{normalize_base_url, ConfigError, ACTIVITY_WINDOW, DEFAULT_BACKEND_URL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Client-side settings, read from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    pub backend_url: String,
    pub request_timeout_secs: u64,
    pub activity_interval_ms: u64,
    pub health_interval_secs: u64,
    pub result_refresh_delay_ms: u64,
    pub activity_window: usize,
    pub storage_path: Option<PathBuf>,
    pub log_filter: String,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_secs: 5,
            activity_interval_ms: 2000,
            health_interval_secs: 30,
            result_refresh_delay_ms: 2000,
            activity_window: ACTIVITY_WINDOW,
            storage_path: None,
            log_filter: "scrapedeck=info,panel=info,backend_client=warn".to_string(),
        }
    }
}

impl PanelSettings {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let settings: PanelSettings = toml::from_str(raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(ConfigError::InvalidFormat {
                details: format!("{}: {}", path.display(), e),
            }),
        }
    }

    /// Read settings from a path the operator named. Unlike `load`, a missing
    /// file is an error.
    pub fn load_required(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_base_url(&self.backend_url)?;

        let positive = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("activity_interval_ms", self.activity_interval_ms),
            ("health_interval_secs", self.health_interval_secs),
            ("activity_window", self.activity_window as u64),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn activity_interval(&self) -> Duration {
        Duration::from_millis(self.activity_interval_ms)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn result_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.result_refresh_delay_ms)
    }

    /// Where the host's key-value storage lives
    pub fn storage_path(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("scrapedeck")
                .join("storage.json")
        })
    }

    pub fn default_settings_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("scrapedeck")
            .join("settings.toml")
    }
}
