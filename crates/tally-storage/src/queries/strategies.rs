// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Strategy CRUD operations.

use rusqlite::{OptionalExtension, Row, params};
use tally_core::{TallyError, UserId};

use crate::database::{Database, map_tr_err, now_timestamp};
use crate::models::Strategy;

fn strategy_from_row(row: &Row<'_>) -> Result<Strategy, rusqlite::Error> {
    Ok(Strategy {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        style: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Create a strategy for the user.
pub async fn insert_strategy(
    db: &Database,
    user_id: UserId,
    name: &str,
    style: Option<&str>,
    description: Option<&str>,
) -> Result<Strategy, TallyError> {
    let strategy = Strategy {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: name.trim().to_string(),
        style: style.map(str::to_string),
        description: description.map(str::to_string),
        created_at: now_timestamp(),
    };
    let s = strategy.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO strategies (id, user_id, name, style, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![s.id, s.user_id, s.name, s.style, s.description, s.created_at],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    Ok(strategy)
}

pub async fn get_strategy(
    db: &Database,
    user_id: UserId,
    id: &str,
) -> Result<Option<Strategy>, TallyError> {
    let uid = user_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, user_id, name, style, description, created_at
                 FROM strategies WHERE id = ?1 AND user_id = ?2",
                params![id, uid],
                strategy_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The user's strategies in creation order.
pub async fn list_strategies(db: &Database, user_id: UserId) -> Result<Vec<Strategy>, TallyError> {
    let uid = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Strategy>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, name, style, description, created_at
                 FROM strategies WHERE user_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![uid], strategy_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Delete a strategy; its trades keep their rows with `strategy_id` cleared.
pub async fn delete_strategy(db: &Database, user_id: UserId, id: &str) -> Result<bool, TallyError> {
    let uid = user_id.to_string();
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute(
                "DELETE FROM strategies WHERE id = ?1 AND user_id = ?2",
                params![id, uid],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}
