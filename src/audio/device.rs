//! Capture device seam.
//!
//! The external media-capture primitive is injected behind `MediaSource`;
//! opening it yields a chunk channel plus a `DeviceGuard` that releases the
//! underlying device exactly once: explicitly on the normal path, or via
//! `Drop` if the capture session is torn down early.

use crate::error::{FailureKind, SosError};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// A binary chunk of captured media.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
}

/// Errors acquiring or operating the capture device.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Media capture not supported in this environment: {0}")]
    Unsupported(String),
}

impl CaptureError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CaptureError::PermissionDenied(_) => FailureKind::PermissionDenied,
            CaptureError::DeviceUnavailable(_) => FailureKind::DeviceUnavailable,
            CaptureError::Unsupported(_) => FailureKind::Unsupported,
        }
    }
}

impl From<CaptureError> for SosError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::PermissionDenied(m) => SosError::PermissionDenied(m),
            CaptureError::DeviceUnavailable(m) => SosError::DeviceUnavailable(m),
            CaptureError::Unsupported(m) => SosError::Unsupported(m),
        }
    }
}

/// Releases the capture device exactly once.
///
/// The release signal is a oneshot consumed on first use; `Drop` is the
/// backstop for abnormal teardown, so no exit path can leak the device.
#[derive(Debug)]
pub struct DeviceGuard {
    release_tx: Option<oneshot::Sender<()>>,
}

impl DeviceGuard {
    pub fn new(release_tx: oneshot::Sender<()>) -> Self {
        Self {
            release_tx: Some(release_tx),
        }
    }

    /// Release the device. Subsequent calls are no-ops.
    pub fn release(&mut self) {
        if let Some(tx) = self.release_tx.take() {
            let _ = tx.send(());
            tracing::debug!("Capture device released");
        }
    }

    pub fn is_released(&self) -> bool {
        self.release_tx.is_none()
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// An open capture session: chunks arrive on `chunks` until the device is
/// released, at which point the source closes the channel.
#[derive(Debug)]
pub struct CaptureHandle {
    pub chunks: mpsc::Receiver<AudioChunk>,
    pub guard: DeviceGuard,
}

/// External media-capture primitive.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Acquire the capture device and begin producing chunks.
    async fn open(&self) -> Result<CaptureHandle, CaptureError>;
}
