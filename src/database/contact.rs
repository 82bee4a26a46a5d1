//! Contact CRUD operations.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::contacts::Contact;
use crate::database::DatabaseError;

/// Column list for all SELECT queries.
const SELECT_COLUMNS: &str = "id, user_id, name, phone, initials";

/// Map a database row to a Contact struct.
fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<Contact> {
    Ok(Contact {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        phone: row.get(3)?,
        initials: row.get(4)?,
    })
}

/// Inserts a new contact.
pub fn create_contact(conn: &Connection, contact: &Contact) -> Result<(), DatabaseError> {
    conn.execute(
        r#"
        INSERT INTO contacts (id, user_id, name, phone, initials, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            contact.id,
            contact.user_id,
            contact.name,
            contact.phone,
            contact.initials,
            Utc::now().to_rfc3339(),
        ],
    )?;

    tracing::debug!("Created contact: {}", contact.id);
    Ok(())
}

/// Lists all contacts for a user, in creation order.
pub fn list_contacts(conn: &Connection, user_id: &str) -> Result<Vec<Contact>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM contacts WHERE user_id = ?1 ORDER BY created_at ASC",
        SELECT_COLUMNS
    ))?;

    let contacts = stmt
        .query_map(params![user_id], row_to_contact)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(contacts)
}

/// Retrieves a contact by its id.
pub fn get_contact(conn: &Connection, id: &str) -> Result<Option<Contact>, DatabaseError> {
    let result = conn.query_row(
        &format!("SELECT {} FROM contacts WHERE id = ?1", SELECT_COLUMNS),
        params![id],
        row_to_contact,
    );

    match result {
        Ok(contact) => Ok(Some(contact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Updates an existing contact. Returns `NotFound` when no row matches.
pub fn update_contact(conn: &Connection, contact: &Contact) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        r#"
        UPDATE contacts
        SET name = ?2, phone = ?3, initials = ?4
        WHERE id = ?1
        "#,
        params![contact.id, contact.name, contact.phone, contact.initials],
    )?;

    if updated == 0 {
        return Err(DatabaseError::NotFound(format!(
            "Contact {} does not exist",
            contact.id
        )));
    }
    Ok(())
}

/// Deletes a contact by its id.
pub fn delete_contact(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM contacts WHERE id = ?1", params![id])?;
    tracing::debug!("Deleted contact: {}", id);
    Ok(())
}
