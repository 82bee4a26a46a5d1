//! Transient user-facing notices.
//!
//! Components publish a short classified notice for every user-visible
//! failure; the surrounding UI subscribes and renders them however it likes.
//! History-ledger write failures are deliberately never published here.

use crate::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer size for the notice channel.
const NOTICE_CHANNEL_CAPACITY: usize = 32;

/// A short transient notice shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    /// Failure classification.
    pub kind: FailureKind,
    /// Display message.
    pub message: String,
    /// When the notice was raised.
    pub at: DateTime<Utc>,
}

/// Broadcast hub for notices.
///
/// Cheap to clone; every component holds one. Publishing never blocks and
/// never fails; if nobody is subscribed the notice is dropped.
#[derive(Debug, Clone)]
pub struct NoticeHub {
    tx: broadcast::Sender<Notice>,
}

impl NoticeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future notices.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Publish a notice.
    pub fn publish(&self, kind: FailureKind, message: impl Into<String>) {
        let notice = Notice {
            kind,
            message: message.into(),
            at: Utc::now(),
        };
        tracing::debug!("Notice ({:?}): {}", notice.kind, notice.message);
        let _ = self.tx.send(notice);
    }
}

impl Default for NoticeHub {
    fn default() -> Self {
        Self::new()
    }
}
