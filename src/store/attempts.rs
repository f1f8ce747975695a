//! Append-only import audit trail.

use chrono::Utc;
use rusqlite::{Connection, Row, params};

use super::named;
use crate::core::{AttemptStatus, ImportAttempt};

/// Fields of an audit entry to be written.
#[derive(Debug, Clone, Copy)]
pub struct NewAttempt<'a> {
    pub file_name: &'a str,
    pub content_hash: Option<&'a str>,
    pub import_source: Option<&'a str>,
    pub status: AttemptStatus,
    pub message: Option<&'a str>,
    pub document_id: Option<i64>,
}

pub(crate) fn insert(conn: &Connection, attempt: &NewAttempt<'_>) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO import_attempts
             (file_name, content_hash, import_source, status, message, document_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            attempt.file_name,
            attempt.content_hash,
            attempt.import_source,
            attempt.status.as_str(),
            attempt.message,
            attempt.document_id,
            Utc::now(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn row_to_attempt(row: &Row<'_>) -> rusqlite::Result<ImportAttempt> {
    Ok(ImportAttempt {
        id: row.get("id")?,
        file_name: row.get("file_name")?,
        content_hash: row.get("content_hash")?,
        import_source: row.get("import_source")?,
        status: named(row, "status", AttemptStatus::from_name)?,
        message: row.get("message")?,
        document_id: row.get("document_id")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn list(conn: &Connection, file_name: Option<&str>) -> rusqlite::Result<Vec<ImportAttempt>> {
    let mut out = Vec::new();
    match file_name {
        Some(name) => {
            let mut stmt = conn.prepare(
                "SELECT * FROM import_attempts WHERE file_name = ?1 ORDER BY id",
            )?;
            for row in stmt.query_map([name], row_to_attempt)? {
                out.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare("SELECT * FROM import_attempts ORDER BY id")?;
            for row in stmt.query_map([], row_to_attempt)? {
                out.push(row?);
            }
        }
    }
    Ok(out)
}
