//! Audio capture state machine.
//!
//! `Idle → Capturing → Finalizing → Idle`. Recording is best-effort: device
//! acquisition failure is reported as a typed error but never aborts the
//! surrounding activation, and upload failure degrades to a `None` recording
//! reference rather than an error.

use super::device::{CaptureError, CaptureHandle, DeviceGuard, MediaSource};
use crate::config::AudioConfig;
use crate::storage::{AudioArtifact, ObjectStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Capture lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    /// No capture session open.
    #[default]
    Idle,
    /// Device held, chunks buffering.
    Capturing,
    /// Device released, artifact being flushed and uploaded.
    Finalizing,
}

/// An open capture session.
struct CaptureSession {
    guard: DeviceGuard,
    /// Drains the chunk channel into a single buffer; completes when the
    /// source closes the channel after device release.
    collector: JoinHandle<Vec<u8>>,
    file_name: String,
}

/// Owns the microphone for one capture session at a time.
pub struct AudioCapture {
    media: Arc<dyn MediaSource>,
    storage: Arc<dyn ObjectStore>,
    config: AudioConfig,
    state: Mutex<CaptureState>,
    /// Serialises start/stop; held across the awaits of either operation.
    session: tokio::sync::Mutex<Option<CaptureSession>>,
}

impl AudioCapture {
    pub fn new(
        media: Arc<dyn MediaSource>,
        storage: Arc<dyn ObjectStore>,
        config: AudioConfig,
    ) -> Self {
        Self {
            media,
            storage,
            config,
            state: Mutex::new(CaptureState::Idle),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CaptureState {
        *self.state.lock()
    }

    /// Whether a capture session is open.
    pub fn is_capturing(&self) -> bool {
        self.state() == CaptureState::Capturing
    }

    /// Begin capturing.
    ///
    /// A no-op returning `Ok(())` while a session is already open. Device
    /// acquisition failure leaves the state `Idle` and returns the typed
    /// error; callers treat recording as best-effort.
    pub async fn start(&self) -> Result<(), CaptureError> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            tracing::debug!("Capture already in progress, start is a no-op");
            return Ok(());
        }

        let CaptureHandle { mut chunks, guard } = self.media.open().await?;

        let collector = tokio::spawn(async move {
            let mut buffer = Vec::new();
            while let Some(chunk) = chunks.recv().await {
                buffer.extend_from_slice(&chunk.data);
            }
            buffer
        });

        let file_name = format!(
            "{}-{}.{}",
            self.config.artifact_prefix,
            Uuid::new_v4(),
            self.config.artifact_extension
        );

        *session = Some(CaptureSession {
            guard,
            collector,
            file_name,
        });
        *self.state.lock() = CaptureState::Capturing;

        tracing::info!("Audio capture started");
        Ok(())
    }

    /// Stop capturing and finalise the artifact.
    ///
    /// Returns `None` when no session is open, and also on upload failure
    /// (logged and swallowed; the recording is lost but the session
    /// continues). The device is released exactly once on every path.
    pub async fn stop(&self) -> Option<String> {
        let mut session = self.session.lock().await;
        let Some(mut open) = session.take() else {
            tracing::debug!("No capture in progress, stop is a no-op");
            return None;
        };

        *self.state.lock() = CaptureState::Finalizing;

        // Releasing the device makes the source close the chunk channel,
        // which completes the collector with the full buffer.
        open.guard.release();
        let bytes = match open.collector.await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!("Chunk collector failed: {}", e);
                Vec::new()
            }
        };

        let artifact = AudioArtifact::new(open.file_name, bytes);
        tracing::info!(
            "Capture finalised: {} ({} bytes)",
            artifact.file_name,
            artifact.len()
        );

        let result = match self.storage.upload(&artifact).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Recording upload failed, dropping artifact: {}", e);
                None
            }
        };

        *self.state.lock() = CaptureState::Idle;
        result
    }
}
