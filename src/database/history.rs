//! Activation history persistence.
//!
//! History rows are append-only. Timestamps are stored as RFC 3339 text,
//! the recipient list as a JSON array, and the optional location as three
//! nullable columns.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection};

use crate::database::DatabaseError;
use crate::history::HistoryRecord;
use crate::location::Location;
use crate::orchestrator::TriggerType;

/// Column list for all SELECT queries.
const SELECT_COLUMNS: &str = r#"
    id, user_id, timestamp, lat, lng, observed_at, message,
    contact_ids, trigger, codeword_used, audio_url
"#;

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Map a database row to a HistoryRecord struct.
fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<HistoryRecord> {
    let timestamp: String = row.get(2)?;
    let lat: Option<f64> = row.get(3)?;
    let lng: Option<f64> = row.get(4)?;
    let observed_at: Option<String> = row.get(5)?;
    let contact_ids_json: String = row.get(7)?;
    let trigger: String = row.get(8)?;

    let location = match (lat, lng, observed_at) {
        (Some(lat), Some(lng), Some(observed_at)) => Some(Location {
            lat,
            lng,
            observed_at: parse_timestamp(5, &observed_at)?,
        }),
        _ => None,
    };

    let contact_ids: Vec<String> = serde_json::from_str(&contact_ids_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?;

    let trigger = trigger.parse::<TriggerType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;

    Ok(HistoryRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        timestamp: parse_timestamp(2, &timestamp)?,
        location,
        message: row.get(6)?,
        contact_ids,
        trigger,
        codeword_used: row.get(9)?,
        audio_url: row.get(10)?,
    })
}

/// Appends a history record.
pub fn insert_history(conn: &Connection, record: &HistoryRecord) -> Result<(), DatabaseError> {
    let contact_ids = serde_json::to_string(&record.contact_ids)?;
    conn.execute(
        r#"
        INSERT INTO history (
            id, user_id, timestamp, lat, lng, observed_at, message,
            contact_ids, trigger, codeword_used, audio_url
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
        params![
            record.id,
            record.user_id,
            record.timestamp.to_rfc3339(),
            record.location.map(|l| l.lat),
            record.location.map(|l| l.lng),
            record.location.map(|l| l.observed_at.to_rfc3339()),
            record.message,
            contact_ids,
            record.trigger.as_str(),
            record.codeword_used,
            record.audio_url,
        ],
    )?;

    tracing::debug!("Inserted history record: {}", record.id);
    Ok(())
}

/// Lists all history records for a user, newest first.
pub fn list_history(conn: &Connection, user_id: &str) -> Result<Vec<HistoryRecord>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM history WHERE user_id = ?1 ORDER BY timestamp DESC",
        SELECT_COLUMNS
    ))?;

    let records = stmt
        .query_map(params![user_id], row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}
