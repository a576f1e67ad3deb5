//! Recovery policy for failed operations.
//!
//! Nothing here retries. The backend is only contacted again on the next user
//! intent or poll tick; this module decides what a caller does with a failure
//! in the meantime.

use crate::{BackendError, CoreError, ErrorExt};
use tracing::{debug, warn};

/// The kind of operation that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Read-only background polling (activity log, results, health)
    Polling,
    /// User intent that changes backend or local state
    Mutating,
    /// Best-effort step whose failure must not abort the surrounding intent
    Advisory,
}

/// What a caller should do with a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Keep the last good data on screen and wait for the next tick
    KeepLastGood,
    /// Revert optimistic local state and show the failure to the user
    SurfaceAndRollback,
    /// Show the failure verbatim; it points at a defect, not an outage
    Surface,
    /// Local precondition violated; nothing was sent
    RejectImmediately,
    /// Log a warning and carry on with the rest of the intent
    ContinueWithWarning,
}

impl RecoveryStrategy {
    /// Returns true if the failure should produce a user-visible entry
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, RecoveryStrategy::KeepLastGood)
    }
}

/// Error recovery handler that maps failures to strategies
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Determine the appropriate recovery strategy for a given error
    pub fn determine_strategy(error: &CoreError, kind: OperationKind) -> RecoveryStrategy {
        if error.is_busy() {
            return RecoveryStrategy::RejectImmediately;
        }

        match kind {
            // Stale-but-present beats blank
            OperationKind::Polling => RecoveryStrategy::KeepLastGood,
            OperationKind::Advisory => RecoveryStrategy::ContinueWithWarning,
            OperationKind::Mutating => match error {
                CoreError::Backend(BackendError::MalformedResponse { .. }) => {
                    RecoveryStrategy::Surface
                }
                _ => RecoveryStrategy::SurfaceAndRollback,
            },
        }
    }

    /// Log a failure at the level its strategy calls for and return the strategy
    pub fn observe(error: &CoreError, kind: OperationKind) -> RecoveryStrategy {
        let strategy = Self::determine_strategy(error, kind);
        match strategy {
            RecoveryStrategy::KeepLastGood | RecoveryStrategy::RejectImmediately => {
                debug!("{:?} failure ({}): {}", kind, error.error_code(), error);
            }
            RecoveryStrategy::ContinueWithWarning => {
                error.log_warn();
            }
            RecoveryStrategy::Surface | RecoveryStrategy::SurfaceAndRollback => {
                warn!(
                    "{:?} failure ({}): {}",
                    kind,
                    error.error_code(),
                    error.user_friendly_message()
                );
            }
        }
        strategy
    }
}
