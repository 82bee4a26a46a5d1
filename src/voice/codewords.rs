//! Voice codewords.
//!
//! A codeword binds a spoken phrase to an alert message and a recipient
//! selection. The built-in default ("emergency help") is synthesised at load
//! time, never persisted, and protected from modification, so a user who
//! configured nothing still has a working trigger phrase.

use crate::database::RecordStore;
use crate::error::{SosError, SosResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reserved id of the built-in codeword.
pub const DEFAULT_CODEWORD_ID: &str = "default";

/// A spoken trigger phrase bound to an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeWord {
    /// Unique identifier (UUID, or the reserved default id).
    pub id: String,
    /// The phrase to listen for, matched case-insensitively.
    pub word: String,
    /// Alert message sent when this codeword fires.
    pub message: String,
    /// Recipient selection; empty means all contacts.
    pub contact_ids: Vec<String>,
}

impl CodeWord {
    /// Creates a user codeword with a generated id.
    pub fn new(word: &str, message: &str, contact_ids: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            word: word.to_string(),
            message: message.to_string(),
            contact_ids,
        }
    }
}

/// The built-in codeword, synthesised fresh on every load.
pub fn default_codeword() -> CodeWord {
    CodeWord {
        id: DEFAULT_CODEWORD_ID.to_string(),
        word: "emergency help".to_string(),
        message: "Emergency! I said my codeword and need help.".to_string(),
        contact_ids: Vec::new(),
    }
}

/// Loads the active codeword set: the built-in default first, then the
/// user's own in store order.
pub async fn load_codewords(
    store: &Arc<dyn RecordStore>,
    user_id: &str,
) -> SosResult<Vec<CodeWord>> {
    let mut codewords = vec![default_codeword()];
    codewords.extend(store.codewords_for(user_id).await?);
    tracing::debug!("Loaded {} codeword(s)", codewords.len());
    Ok(codewords)
}

/// Rejects writes against the reserved default codeword.
pub fn guard_default(id: &str) -> SosResult<()> {
    if id == DEFAULT_CODEWORD_ID {
        return Err(SosError::Unsupported(
            "The built-in codeword cannot be modified".to_string(),
        ));
    }
    Ok(())
}

/// Finds the first codeword whose phrase occurs in the transcript.
///
/// Matching is case-insensitive substring containment, in load order, so
/// the built-in default always wins a tie with a user codeword that embeds
/// its phrase.
pub fn match_codeword<'a>(codewords: &'a [CodeWord], transcript: &str) -> Option<&'a CodeWord> {
    let transcript = transcript.to_lowercase();
    codewords
        .iter()
        .find(|cw| !cw.word.is_empty() && transcript.contains(&cw.word.to_lowercase()))
}
