//! SQLite persistence.
//!
//! Provides connection management, migrations, and CRUD for contacts,
//! codewords, and activation history. Each operation opens its own
//! connection; the blocking rusqlite calls run on the blocking pool behind
//! the async `RecordStore` seam.

pub mod codeword;
pub mod contact;
pub mod history;
pub mod migrations;
pub mod schema;

use crate::config::aegis_dir;
use crate::contacts::Contact;
use crate::error::{SosError, SosResult};
use crate::history::HistoryRecord;
use crate::voice::codewords::{guard_default, CodeWord};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::PathBuf;

use crate::database::migrations::run_migrations;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to create database directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Stored value could not be serialised: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database task failed: {0}")]
    Task(String),
}

impl From<DatabaseError> for SosError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(msg) => SosError::NotFound(msg),
            other => SosError::Transport(other.to_string()),
        }
    }
}

/// Async persistence seam consumed by the directory, ledger, and voice
/// engine. Production uses [`SqliteStore`]; tests substitute fakes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn contacts_for(&self, user_id: &str) -> SosResult<Vec<Contact>>;
    async fn codewords_for(&self, user_id: &str) -> SosResult<Vec<CodeWord>>;
    async fn insert_history(&self, record: &HistoryRecord) -> SosResult<()>;
    async fn history_for(&self, user_id: &str) -> SosResult<Vec<HistoryRecord>>;
}

/// SQLite-backed record store.
///
/// Holds only the database path; every operation opens a fresh connection,
/// so the store is freely shareable across tasks.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Store at an explicit database file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default location, `~/.aegis/aegis.db`.
    pub fn at_default_path() -> Self {
        Self {
            path: aegis_dir().join("aegis.db"),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Creates the database directory and runs pending migrations.
    ///
    /// Call once on startup.
    pub fn initialise(&self) -> Result<(), DatabaseError> {
        tracing::info!("Initialising database at {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
                tracing::info!("Created database directory at {:?}", parent);
            }
        }

        let mut conn = self.open_connection()?;
        run_migrations(&mut conn)?;

        tracing::info!("Database initialised successfully");
        Ok(())
    }

    /// Opens a new connection to the database.
    pub fn open_connection(&self) -> Result<Connection, DatabaseError> {
        let conn = Connection::open(&self.path)?;

        // Enable foreign keys
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(conn)
    }

    /// Run one blocking database operation on the blocking pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = store.open_connection()?;
            op(&conn)
        })
        .await
        .map_err(|e| DatabaseError::Task(e.to_string()))?
    }

    /// Inserts a contact.
    pub async fn create_contact(&self, contact: &Contact) -> Result<(), DatabaseError> {
        let contact = contact.clone();
        self.with_conn(move |conn| contact::create_contact(conn, &contact))
            .await
    }

    /// Updates an existing contact.
    pub async fn update_contact(&self, contact: &Contact) -> Result<(), DatabaseError> {
        let contact = contact.clone();
        self.with_conn(move |conn| contact::update_contact(conn, &contact))
            .await
    }

    /// Deletes a contact by id.
    pub async fn delete_contact(&self, id: &str) -> Result<(), DatabaseError> {
        let id = id.to_string();
        self.with_conn(move |conn| contact::delete_contact(conn, &id))
            .await
    }

    /// Inserts a codeword for a user. The built-in default is rejected.
    pub async fn create_codeword(&self, user_id: &str, codeword: &CodeWord) -> SosResult<()> {
        guard_default(&codeword.id)?;
        let user_id = user_id.to_string();
        let codeword = codeword.clone();
        Ok(self
            .with_conn(move |conn| codeword::create_codeword(conn, &user_id, &codeword))
            .await?)
    }

    /// Updates an existing codeword. The built-in default is rejected.
    pub async fn update_codeword(&self, codeword: &CodeWord) -> SosResult<()> {
        guard_default(&codeword.id)?;
        let codeword = codeword.clone();
        Ok(self
            .with_conn(move |conn| codeword::update_codeword(conn, &codeword))
            .await?)
    }

    /// Deletes a codeword by id. The built-in default is rejected.
    pub async fn delete_codeword(&self, id: &str) -> SosResult<()> {
        guard_default(id)?;
        let id = id.to_string();
        Ok(self
            .with_conn(move |conn| codeword::delete_codeword(conn, &id))
            .await?)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn contacts_for(&self, user_id: &str) -> SosResult<Vec<Contact>> {
        let user_id = user_id.to_string();
        Ok(self
            .with_conn(move |conn| contact::list_contacts(conn, &user_id))
            .await?)
    }

    async fn codewords_for(&self, user_id: &str) -> SosResult<Vec<CodeWord>> {
        let user_id = user_id.to_string();
        Ok(self
            .with_conn(move |conn| codeword::list_codewords(conn, &user_id))
            .await?)
    }

    async fn insert_history(&self, record: &HistoryRecord) -> SosResult<()> {
        let record = record.clone();
        Ok(self
            .with_conn(move |conn| history::insert_history(conn, &record))
            .await?)
    }

    async fn history_for(&self, user_id: &str) -> SosResult<Vec<HistoryRecord>> {
        let user_id = user_id.to_string();
        Ok(self
            .with_conn(move |conn| history::list_history(conn, &user_id))
            .await?)
    }
}
