// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat session operations.

use rusqlite::{OptionalExtension, Row, params};
use tally_core::{Session, SessionId, TallyError, UserId};

use crate::database::{Database, map_tr_err, now_timestamp};

fn session_from_row(row: &Row<'_>) -> Result<Session, rusqlite::Error> {
    let user_id: String = row.get(1)?;
    let user_id = user_id.parse::<UserId>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Session {
        id: SessionId(row.get(0)?),
        user_id,
        topic: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

pub async fn create_session(
    db: &Database,
    user_id: UserId,
    topic: Option<String>,
) -> Result<Session, TallyError> {
    let now = now_timestamp();
    let session = Session {
        id: SessionId(uuid::Uuid::new_v4().to_string()),
        user_id,
        topic,
        created_at: now.clone(),
        updated_at: now,
    };
    let s = session.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO chat_sessions (id, user_id, topic, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![s.id.0, s.user_id.to_string(), s.topic, s.created_at, s.updated_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(session)
}

pub async fn get_session(db: &Database, id: &SessionId) -> Result<Option<Session>, TallyError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, user_id, topic, created_at, updated_at FROM chat_sessions WHERE id = ?1",
                params![id],
                session_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions for a user, most recently active first.
pub async fn list_sessions(db: &Database, user_id: UserId) -> Result<Vec<Session>, TallyError> {
    let uid = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Session>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, topic, created_at, updated_at FROM chat_sessions
                 WHERE user_id = ?1 ORDER BY updated_at DESC",
            )?;
            let rows = stmt.query_map(params![uid], session_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
