use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to Bridge callers.
///
/// Missing permissions are never errors; they show up as `false` checks.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeError {
    /// The block policy could not be written; the stored policy is unchanged
    #[error("Failed to persist block policy: {0}")]
    Persistence(String),

    /// The monitor could not be started
    #[error("Failed to start monitor: {0}")]
    StartFailed(String),

    /// The monitor could not be stopped
    #[error("Failed to stop monitor: {0}")]
    StopFailed(String),

    /// The background core is not reachable
    #[error("Background service unavailable: {0}")]
    Unavailable(String),
}
