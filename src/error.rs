//! Crate-wide error taxonomy.
//!
//! Every component exposes failures as typed results in one of six kinds:
//! permission-denied, device-unavailable, transport-failure, timeout,
//! not-found, unsupported-environment. Component-local error enums convert
//! into `SosError` at the orchestration boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for SOS operations.
pub type SosResult<T> = Result<T, SosError>;

/// Errors crossing component boundaries.
#[derive(Debug, Error)]
pub enum SosError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported environment: {0}")]
    Unsupported(String),
}

impl SosError {
    /// Classifies the error for user-facing notices.
    pub fn kind(&self) -> FailureKind {
        match self {
            SosError::PermissionDenied(_) => FailureKind::PermissionDenied,
            SosError::DeviceUnavailable(_) => FailureKind::DeviceUnavailable,
            SosError::Transport(_) => FailureKind::Transport,
            SosError::Timeout(_) => FailureKind::Timeout,
            SosError::NotFound(_) => FailureKind::NotFound,
            SosError::Unsupported(_) => FailureKind::Unsupported,
        }
    }
}

/// Failure classification surfaced to the UI as a transient notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PermissionDenied,
    DeviceUnavailable,
    Transport,
    Timeout,
    NotFound,
    Unsupported,
}

impl FailureKind {
    /// Returns a short human-readable label for display.
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::PermissionDenied => "Permission denied",
            FailureKind::DeviceUnavailable => "Device unavailable",
            FailureKind::Transport => "Connection problem",
            FailureKind::Timeout => "Timed out",
            FailureKind::NotFound => "Not found",
            FailureKind::Unsupported => "Not supported here",
        }
    }
}
