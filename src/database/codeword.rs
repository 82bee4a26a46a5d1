//! Codeword CRUD operations.
//!
//! Only user-defined codewords live here; the built-in default is
//! synthesised at load time and never persisted. Recipient selections are
//! stored as JSON arrays of contact ids.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::database::DatabaseError;
use crate::voice::codewords::CodeWord;

/// Column list for all SELECT queries.
const SELECT_COLUMNS: &str = "id, word, message, contact_ids";

/// Map a database row to a CodeWord struct.
fn row_to_codeword(row: &rusqlite::Row) -> rusqlite::Result<(CodeWord, String)> {
    let codeword = CodeWord {
        id: row.get(0)?,
        word: row.get(1)?,
        message: row.get(2)?,
        contact_ids: Vec::new(),
    };
    let contact_ids_json: String = row.get(3)?;
    Ok((codeword, contact_ids_json))
}

/// Inserts a new codeword for a user.
pub fn create_codeword(
    conn: &Connection,
    user_id: &str,
    codeword: &CodeWord,
) -> Result<(), DatabaseError> {
    let contact_ids = serde_json::to_string(&codeword.contact_ids)?;
    conn.execute(
        r#"
        INSERT INTO codewords (id, user_id, word, message, contact_ids, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            codeword.id,
            user_id,
            codeword.word,
            codeword.message,
            contact_ids,
            Utc::now().to_rfc3339(),
        ],
    )?;

    tracing::debug!("Created codeword: {}", codeword.id);
    Ok(())
}

/// Lists all user-defined codewords, in creation order.
pub fn list_codewords(conn: &Connection, user_id: &str) -> Result<Vec<CodeWord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM codewords WHERE user_id = ?1 ORDER BY created_at ASC",
        SELECT_COLUMNS
    ))?;

    let rows = stmt
        .query_map(params![user_id], row_to_codeword)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut codewords = Vec::with_capacity(rows.len());
    for (mut codeword, contact_ids_json) in rows {
        codeword.contact_ids = serde_json::from_str(&contact_ids_json)?;
        codewords.push(codeword);
    }
    Ok(codewords)
}

/// Updates an existing codeword. Returns `NotFound` when no row matches.
pub fn update_codeword(conn: &Connection, codeword: &CodeWord) -> Result<(), DatabaseError> {
    let contact_ids = serde_json::to_string(&codeword.contact_ids)?;
    let updated = conn.execute(
        r#"
        UPDATE codewords
        SET word = ?2, message = ?3, contact_ids = ?4
        WHERE id = ?1
        "#,
        params![codeword.id, codeword.word, codeword.message, contact_ids],
    )?;

    if updated == 0 {
        return Err(DatabaseError::NotFound(format!(
            "Codeword {} does not exist",
            codeword.id
        )));
    }
    Ok(())
}

/// Deletes a codeword by its id.
pub fn delete_codeword(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM codewords WHERE id = ?1", params![id])?;
    tracing::debug!("Deleted codeword: {}", id);
    Ok(())
}
