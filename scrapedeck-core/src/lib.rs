pub mod error;
pub mod error_recovery;
pub mod error_utils;
pub mod host;
pub mod settings;
pub mod types;

pub use error::*;
pub use error_recovery::*;
pub use error_utils::*;
pub use host::{BadgeRenderer, HostMessage, HostReply, KeyValueStore};
pub use settings::PanelSettings;
pub use types::*;
