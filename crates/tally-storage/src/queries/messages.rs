// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message operations.

use rusqlite::{Row, params};
use tally_core::{Role, SessionId, StoredMessage, TallyError};

use crate::database::{Database, map_tr_err, now_timestamp};

fn message_from_row(row: &Row<'_>) -> Result<StoredMessage, rusqlite::Error> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredMessage {
        id: row.get(0)?,
        session_id: SessionId(row.get(1)?),
        role,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Append a message and touch the session's `updated_at` in one transaction.
pub async fn insert_message(
    db: &Database,
    session_id: &SessionId,
    role: Role,
    content: &str,
) -> Result<StoredMessage, TallyError> {
    let msg = StoredMessage {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.clone(),
        role,
        content: content.to_string(),
        created_at: now_timestamp(),
    };
    let m = msg.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO chat_messages (id, session_id, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![m.id, m.session_id.0, m.role.to_string(), m.content, m.created_at],
            )?;
            tx.execute(
                "UPDATE chat_sessions SET updated_at = ?2 WHERE id = ?1",
                params![m.session_id.0, m.created_at],
            )?;
            tx.commit()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(msg)
}

/// The last `limit` messages of a session, oldest first.
pub async fn recent_messages(
    db: &Database,
    session_id: &SessionId,
    limit: usize,
) -> Result<Vec<StoredMessage>, TallyError> {
    let session_id = session_id.0.clone();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<StoredMessage>, rusqlite::Error> {
            // rowid breaks ties between messages written in the same millisecond.
            let mut stmt = conn.prepare(
                "SELECT id, session_id, role, content, created_at FROM (
                     SELECT rowid AS seq, id, session_id, role, content, created_at
                     FROM chat_messages WHERE session_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2
                 ) ORDER BY created_at ASC, seq ASC",
            )?;
            let rows = stmt.query_map(params![session_id, limit], message_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
