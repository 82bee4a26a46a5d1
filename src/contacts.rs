//! Emergency contact directory.
//!
//! Caches the user's contact list for the duration of a session. The cache
//! is replaced wholesale by `refresh`; a failed refresh leaves the previous
//! cache intact (fail-soft) so an activation can still notify whoever was
//! known last. `filter` never performs I/O.

use crate::database::RecordStore;
use crate::error::SosResult;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// An emergency contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Unique identifier (UUID).
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Display name.
    pub name: String,
    /// Phone number for the delivery gateway.
    pub phone: String,
    /// Derived initials for avatar display.
    pub initials: String,
}

impl Contact {
    /// Creates a new contact with a generated id and derived initials.
    pub fn new(user_id: &str, name: &str, phone: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            phone: phone.to_string(),
            initials: derive_initials(name),
        }
    }
}

/// Derive up to two initials from a display name.
pub fn derive_initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .take(2)
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Cached directory of the user's emergency contacts.
pub struct ContactDirectory {
    store: Arc<dyn RecordStore>,
    cache: RwLock<Vec<Contact>>,
}

impl ContactDirectory {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(Vec::new()),
        }
    }

    /// Replace the cache with the full contact set for the user.
    ///
    /// On store failure the previous cache is left intact and the typed
    /// error is returned to the caller.
    pub async fn refresh(&self, user_id: &str) -> SosResult<usize> {
        match self.store.contacts_for(user_id).await {
            Ok(contacts) => {
                let count = contacts.len();
                *self.cache.write() = contacts;
                tracing::info!("Contact cache refreshed: {} contact(s)", count);
                Ok(count)
            }
            Err(e) => {
                tracing::warn!("Contact refresh failed, keeping previous cache: {}", e);
                Err(e)
            }
        }
    }

    /// Return cached contacts.
    ///
    /// `None` means no filter: the full cached set. An explicit id list
    /// selects the intersection, preserving cache order; an explicitly empty
    /// list therefore selects nobody.
    pub fn filter(&self, ids: Option<&[String]>) -> Vec<Contact> {
        let cache = self.cache.read();
        match ids {
            None => cache.clone(),
            Some(ids) => cache
                .iter()
                .filter(|c| ids.contains(&c.id))
                .cloned()
                .collect(),
        }
    }

    /// Number of cached contacts.
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}
