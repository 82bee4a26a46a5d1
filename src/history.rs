//! Activation history ledger.
//!
//! Appends one immutable record per activation. Writes are fire-and-forget:
//! a ledger failure is logged and swallowed, because it must never roll back
//! or block an alert that has already been dispatched.

use crate::database::RecordStore;
use crate::error::SosResult;
use crate::location::Location;
use crate::orchestrator::TriggerType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// An immutable record of one SOS activation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Unique identifier (UUID).
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// When the activation happened.
    pub timestamp: DateTime<Utc>,
    /// Location resolved at dispatch time, if any.
    pub location: Option<Location>,
    /// The alert message as given (before link composition).
    pub message: String,
    /// Contacts the alert was dispatched to.
    pub contact_ids: Vec<String>,
    /// What initiated the activation.
    pub trigger: TriggerType,
    /// The matched codeword, for codeword triggers.
    pub codeword_used: Option<String>,
    /// Live-audio reference, when capture started successfully.
    pub audio_url: Option<String>,
}

impl HistoryRecord {
    /// Creates a record with a generated id and the current timestamp.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        location: Option<Location>,
        message: &str,
        contact_ids: Vec<String>,
        trigger: TriggerType,
        codeword_used: Option<String>,
        audio_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
            location,
            message: message.to_string(),
            contact_ids,
            trigger,
            codeword_used,
            audio_url,
        }
    }
}

/// Durable, append-only activation history.
pub struct HistoryLedger {
    store: Arc<dyn RecordStore>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Append a record.
    ///
    /// Failure is logged and swallowed; it is never surfaced as a notice
    /// when the primary notification already went out.
    pub async fn append(&self, record: &HistoryRecord) {
        match self.store.insert_history(record).await {
            Ok(()) => tracing::debug!("History record appended: {}", record.id),
            Err(e) => tracing::error!("History append failed (swallowed): {}", e),
        }
    }

    /// All records for a user, newest first.
    pub async fn list(&self, user_id: &str) -> SosResult<Vec<HistoryRecord>> {
        self.store.history_for(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::Contact;
    use crate::error::SosError;
    use crate::voice::codewords::CodeWord;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct FakeStore {
        fail_insert: bool,
        records: Mutex<Vec<HistoryRecord>>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn contacts_for(&self, _user_id: &str) -> SosResult<Vec<Contact>> {
            Ok(Vec::new())
        }

        async fn codewords_for(&self, _user_id: &str) -> SosResult<Vec<CodeWord>> {
            Ok(Vec::new())
        }

        async fn insert_history(&self, record: &HistoryRecord) -> SosResult<()> {
            if self.fail_insert {
                return Err(SosError::Transport("insert refused".into()));
            }
            self.records.lock().push(record.clone());
            Ok(())
        }

        async fn history_for(&self, user_id: &str) -> SosResult<Vec<HistoryRecord>> {
            let mut records: Vec<_> = self
                .records
                .lock()
                .iter()
                .filter(|r| r.user_id == user_id)
                .cloned()
                .collect();
            records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            Ok(records)
        }
    }

    fn record(user_id: &str, message: &str) -> HistoryRecord {
        HistoryRecord::new(
            user_id,
            None,
            message,
            vec!["c1".to_string()],
            TriggerType::Button,
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_append_and_list() {
        let store = Arc::new(FakeStore {
            fail_insert: false,
            records: Mutex::new(Vec::new()),
        });
        let ledger = HistoryLedger::new(store);

        ledger.append(&record("u1", "first")).await;
        ledger.append(&record("u1", "second")).await;

        let records = ledger.list("u1").await.unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn test_append_failure_is_swallowed() {
        let store = Arc::new(FakeStore {
            fail_insert: true,
            records: Mutex::new(Vec::new()),
        });
        let ledger = HistoryLedger::new(store);

        // Must not panic or propagate
        ledger.append(&record("u1", "lost")).await;
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_user() {
        let store = Arc::new(FakeStore {
            fail_insert: false,
            records: Mutex::new(Vec::new()),
        });
        let ledger = HistoryLedger::new(store);

        ledger.append(&record("u1", "mine")).await;
        ledger.append(&record("u2", "theirs")).await;

        let records = ledger.list("u1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "mine");
    }

    #[test]
    fn test_record_serialisation_roundtrip() {
        let r = record("u1", "help");
        let json = serde_json::to_string(&r).unwrap();
        let back: HistoryRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
