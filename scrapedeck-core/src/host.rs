//! The three primitives a host runtime must provide: durable key-value
//! storage, badge rendering and cross-context messages. Each host gets one
//! adapter implementing these.

use crate::CoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Storage keys shared by every host
pub mod keys {
    pub const CONFIG: &str = "config";
    pub const CONTRACT_ADDRESS_REQUIRED: &str = "contractAddressRequired";
    pub const LAST_RESULT_COUNT: &str = "lastResultCount";
}

/// Persistent key-value storage. A `set` replaces the whole value for a key;
/// readers never observe a partial write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CoreError>;
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CoreError>;
    async fn remove(&self, key: &str) -> Result<(), CoreError>;
}

/// Host-visible indicator on the extension action
pub trait BadgeRenderer: Send + Sync {
    fn set_text(&self, text: &str);
    fn set_background_color(&self, color: &str);
}

pub const BADGE_DEFAULT_COLOR: &str = "#667eea";
pub const BADGE_ALERT_COLOR: &str = "#ff4444";

/// Messages the panel context sends to the background context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostMessage {
    CheckBackendStatus { url: String },
    UpdateBadge { count: u32 },
    ClearBadge,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default)]
    pub success: bool,
}

impl HostReply {
    pub fn ack() -> Self {
        Self {
            online: None,
            success: true,
        }
    }

    pub fn online(online: bool) -> Self {
        Self {
            online: Some(online),
            success: true,
        }
    }
}
