//! Speech recognition seam.
//!
//! The external continuous-recognition primitive is injected behind
//! `SpeechSource`. A session yields transcript events until it ends (sources
//! commonly stop themselves after silence) or errors; the engine decides
//! whether to restart based on the error's permanence.

use crate::error::FailureKind;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Errors from the speech recogniser.
#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    #[error("Speech recognition unavailable: {0}")]
    Unavailable(String),

    #[error("Speech recognition not supported in this environment")]
    Unsupported,

    #[error("Recognition aborted: {0}")]
    Aborted(String),
}

impl SpeechError {
    pub fn kind(&self) -> FailureKind {
        match self {
            SpeechError::PermissionDenied(_) => FailureKind::PermissionDenied,
            SpeechError::Unavailable(_) => FailureKind::DeviceUnavailable,
            SpeechError::Unsupported => FailureKind::Unsupported,
            SpeechError::Aborted(_) => FailureKind::DeviceUnavailable,
        }
    }

    /// Permanent errors stop the engine outright; anything else is retried
    /// after the configured backoff.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SpeechError::PermissionDenied(_) | SpeechError::Unsupported
        )
    }
}

/// One event from an open recognition session.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    /// A finalised transcript fragment.
    Transcript(String),
    /// The source ended the session on its own (silence timeout etc.).
    Ended,
    /// The session failed.
    Error(SpeechError),
}

/// An open recognition session.
///
/// Events arrive on `events` until `Ended`/`Error`; dropping or firing
/// `stop` tears the session down source-side.
#[derive(Debug)]
pub struct SpeechSession {
    pub events: mpsc::Receiver<SpeechEvent>,
    stop_tx: Option<oneshot::Sender<()>>,
}

impl SpeechSession {
    pub fn new(events: mpsc::Receiver<SpeechEvent>, stop_tx: oneshot::Sender<()>) -> Self {
        Self {
            events,
            stop_tx: Some(stop_tx),
        }
    }

    /// Stop the session. Subsequent calls are no-ops.
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
            tracing::debug!("Speech session stopped");
        }
    }
}

impl Drop for SpeechSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// External continuous speech recogniser.
#[async_trait]
pub trait SpeechSource: Send + Sync {
    /// Open a new recognition session.
    async fn start_session(&self) -> Result<SpeechSession, SpeechError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permanence_classification() {
        assert!(SpeechError::PermissionDenied("mic".into()).is_permanent());
        assert!(SpeechError::Unsupported.is_permanent());
        assert!(!SpeechError::Unavailable("busy".into()).is_permanent());
        assert!(!SpeechError::Aborted("network".into()).is_permanent());
    }

    #[tokio::test]
    async fn test_session_stop_fires_once() {
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let mut session = SpeechSession::new(event_rx, stop_tx);

        session.stop();
        assert!(stop_rx.try_recv().is_ok());
        session.stop();
    }

    #[tokio::test]
    async fn test_session_stops_on_drop() {
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (stop_tx, mut stop_rx) = oneshot::channel();
        drop(SpeechSession::new(event_rx, stop_tx));
        assert!(stop_rx.try_recv().is_ok());
    }
}
