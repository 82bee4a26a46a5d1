//! Database schema definitions.
//!
//! Contains SQL statements for creating and managing database tables.

/// SQL statement to create the migrations tracking table.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQL statement to create the contacts table.
pub const CREATE_CONTACTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS contacts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    phone TEXT NOT NULL,
    initials TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// SQL statement to create an index on contacts.user_id for per-user listing.
pub const CREATE_CONTACTS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_contacts_user_id ON contacts(user_id);
"#;

/// SQL statement to create the history table.
///
/// `contact_ids` is a JSON array of contact ids; the location columns are
/// nullable because an activation may complete without a position fix.
pub const CREATE_HISTORY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS history (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    lat REAL,
    lng REAL,
    observed_at TEXT,
    message TEXT NOT NULL,
    contact_ids TEXT NOT NULL,
    trigger TEXT NOT NULL,
    codeword_used TEXT,
    audio_url TEXT
);
"#;

/// SQL statement to create an index for newest-first per-user history reads.
pub const CREATE_HISTORY_USER_TIMESTAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_history_user_id_timestamp ON history(user_id, timestamp);
"#;

/// SQL statement to create the codewords table (v2 migration).
pub const CREATE_CODEWORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS codewords (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    word TEXT NOT NULL,
    message TEXT NOT NULL,
    contact_ids TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// SQL statement to create an index on codewords.user_id for per-user listing.
pub const CREATE_CODEWORDS_USER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_codewords_user_id ON codewords(user_id);
"#;
