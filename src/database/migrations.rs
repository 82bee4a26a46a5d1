//! Database migration system.
//!
//! Migrations are versioned and tracked in the `migrations` table.
//! Each migration is run exactly once, in order.

use rusqlite::Connection;

use crate::database::schema::{
    CREATE_CODEWORDS_TABLE, CREATE_CODEWORDS_USER_INDEX, CREATE_CONTACTS_TABLE,
    CREATE_CONTACTS_USER_INDEX, CREATE_HISTORY_TABLE, CREATE_HISTORY_USER_TIMESTAMP_INDEX,
    CREATE_MIGRATIONS_TABLE,
};
use crate::database::DatabaseError;

/// A database migration with a version number, name, and SQL statements.
struct Migration {
    version: i32,
    name: &'static str,
    statements: &'static [&'static str],
}

/// All migrations to be applied, in order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_contacts_and_history",
        statements: &[
            CREATE_CONTACTS_TABLE,
            CREATE_CONTACTS_USER_INDEX,
            CREATE_HISTORY_TABLE,
            CREATE_HISTORY_USER_TIMESTAMP_INDEX,
        ],
    },
    Migration {
        version: 2,
        name: "create_codewords",
        statements: &[CREATE_CODEWORDS_TABLE, CREATE_CODEWORDS_USER_INDEX],
    },
];

/// Returns the current schema version from the database.
fn get_current_version(conn: &Connection) -> Result<i32, DatabaseError> {
    let version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Records a migration as applied.
fn record_migration(conn: &Connection, version: i32, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        (version, name),
    )?;
    Ok(())
}

/// Runs all pending migrations.
///
/// Each migration runs in a transaction; if any statement fails, that
/// migration's changes are rolled back.
pub fn run_migrations(conn: &mut Connection) -> Result<(), DatabaseError> {
    // First, ensure the migrations table exists
    conn.execute_batch(CREATE_MIGRATIONS_TABLE)?;

    let current_version = get_current_version(conn)?;
    tracing::info!("Current database schema version: {}", current_version);

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|m| m.version > current_version)
        .collect();

    if pending.is_empty() {
        tracing::info!("Database schema is up to date");
        return Ok(());
    }

    tracing::info!("{} pending migration(s) to apply", pending.len());

    for migration in pending {
        tracing::info!(
            "Applying migration {} (v{})",
            migration.name,
            migration.version
        );

        let tx = conn.transaction()?;

        for statement in migration.statements {
            tx.execute_batch(statement).map_err(|e| {
                DatabaseError::Migration(format!("Migration {} failed: {}", migration.name, e))
            })?;
        }

        record_migration(&tx, migration.version, migration.name)?;
        tx.commit()?;

        tracing::info!("Migration {} applied successfully", migration.name);
    }

    let final_version = get_current_version(conn)?;
    tracing::info!("Database schema now at version {}", final_version);

    Ok(())
}
