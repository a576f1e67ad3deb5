use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation already in progress: {operation}")]
    Busy { operation: String },

    #[error("Credential validation failed: {reason}")]
    ValidationFailure { reason: String },

    #[error("Backend rejected request: {message}")]
    Rejected { message: String },

    #[error("Host runtime unavailable: {reason}")]
    HostUnavailable { reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    pub fn busy(operation: impl Into<String>) -> Self {
        CoreError::Busy {
            operation: operation.into(),
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, CoreError::Busy { .. })
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, CoreError::Backend(BackendError::Unreachable { .. }))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unreachable at {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    #[error("HTTP {status} from {endpoint}")]
    HttpError {
        status: u16,
        endpoint: String,
        detail: Option<String>,
    },

    #[error("Malformed response from {endpoint}: {details}")]
    MalformedResponse { endpoint: String, details: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}
