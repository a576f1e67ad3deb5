use crate::error::*;
use std::fmt::Display;
use tracing::{error, info, warn};

/// Classification and logging shared by every error type in the workspace.
pub trait ErrorExt: Display {
    /// Stable identifier for logs and CLI output
    fn error_code(&self) -> &'static str;

    /// Message fit for the activity log or a terminal
    fn user_friendly_message(&self) -> String;

    /// Whether the failure may clear up on the next user action or poll tick.
    /// Nothing in this workspace retries automatically.
    fn is_retryable(&self) -> bool;

    fn log_error(&self) -> &Self {
        error!("[{}] {}", self.error_code(), self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("[{}] {}", self.error_code(), self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> &'static str {
        match self {
            CoreError::Backend(e) => e.error_code(),
            CoreError::Config(_) => "CONFIG",
            CoreError::Io(_) => "IO",
            CoreError::Serialization(_) => "SERIALIZATION",
            CoreError::Busy { .. } => "BUSY",
            CoreError::ValidationFailure { .. } => "VALIDATION_FAILURE",
            CoreError::Rejected { .. } => "REJECTED",
            CoreError::HostUnavailable { .. } => "HOST_UNAVAILABLE",
            CoreError::Internal { .. } => "INTERNAL",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Backend(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Busy { operation } => {
                format!("Please wait, {} is still in progress.", operation)
            }
            CoreError::ValidationFailure { reason } => {
                format!("Credential check failed: {}", reason)
            }
            CoreError::Rejected { message } => message.clone(),
            CoreError::HostUnavailable { .. } => "The extension host is not responding.".into(),
            CoreError::Io(_) => "Could not access local storage.".into(),
            CoreError::Serialization(e) => format!("Could not read data: {}", e),
            CoreError::Internal { message } => format!("Internal error: {}", message),
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Backend(e) => e.is_retryable(),
            CoreError::Rejected { .. } | CoreError::Io(_) | CoreError::HostUnavailable { .. } => {
                true
            }
            _ => false,
        }
    }
}

impl ErrorExt for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            BackendError::Unreachable { .. } => "BACKEND_UNREACHABLE",
            BackendError::HttpError { .. } => "BACKEND_HTTP_ERROR",
            BackendError::MalformedResponse { .. } => "BACKEND_MALFORMED_RESPONSE",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            BackendError::Unreachable { .. } => {
                "Unable to connect to server. Please check if the API is running.".to_string()
            }
            BackendError::HttpError {
                status,
                detail: Some(detail),
                ..
            } => format!("Server error {}: {}", status, detail),
            BackendError::HttpError { status, .. } => format!("Server error: HTTP {}", status),
            BackendError::MalformedResponse { endpoint, details } => {
                format!("Unexpected response from {}: {}", endpoint, details)
            }
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, BackendError::MalformedResponse { .. })
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => format!("No settings file at {}.", path),
            ConfigError::InvalidValue { field, .. } => format!("'{}' is not valid.", field),
            ConfigError::InvalidFormat { .. } | ConfigError::Parse(_) => {
                "The settings file could not be read.".to_string()
            }
        }
    }

    /// The operator has to change something first
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Final stop for errors that end a CLI command.
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn report_error(error: &CoreError) {
        error.log_error();
        if let CoreError::Backend(inner) = error {
            error!("Backend failure details: {:?}", inner);
        }
        if error.is_retryable() {
            info!("{} may clear up on the next attempt", error.error_code());
        }
    }
}
