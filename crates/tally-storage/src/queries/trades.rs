// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trade CRUD operations. Every query is scoped by the owning user.

use rusqlite::{OptionalExtension, Row, params};
use tally_core::{TallyError, UserId};

use crate::database::{Database, map_tr_err};
use crate::models::{NewTrade, Trade, realized_pnl};

const TRADE_COLUMNS: &str = "id, user_id, symbol, direction, status, pnl, quantity, entry_price, \
     exit_price, fees, entry_time, exit_time, instrument_type, strategy_id, tags";

fn trade_from_row(row: &Row<'_>) -> Result<Trade, rusqlite::Error> {
    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        direction: row.get(3)?,
        status: row.get(4)?,
        pnl: row.get(5)?,
        quantity: row.get(6)?,
        entry_price: row.get(7)?,
        exit_price: row.get(8)?,
        fees: row.get(9)?,
        entry_time: row.get(10)?,
        exit_time: row.get(11)?,
        instrument_type: row.get(12)?,
        strategy_id: row.get(13)?,
        tags: row.get(14)?,
    })
}

/// Record an open trade and return it.
pub async fn insert_trade(
    db: &Database,
    user_id: UserId,
    trade: &NewTrade,
) -> Result<Trade, TallyError> {
    let id = uuid::Uuid::new_v4().to_string();
    let uid = user_id.to_string();
    let t = trade.clone();
    db.connection()
        .call(move |conn| -> Result<Trade, rusqlite::Error> {
            conn.execute(
                "INSERT INTO trades (id, user_id, symbol, direction, status, quantity, entry_price, \
                 fees, entry_time, instrument_type, strategy_id, tags)
                 VALUES (?1, ?2, ?3, ?4, 'OPEN', ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    uid,
                    t.symbol,
                    t.direction,
                    t.quantity,
                    t.entry_price,
                    t.fees,
                    t.entry_time,
                    t.instrument_type,
                    t.strategy_id,
                    t.tags,
                ],
            )?;
            conn.query_row(
                &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1"),
                params![id],
                trade_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Close an open trade at `exit_price`, computing its PnL.
///
/// Returns `None` when the trade does not exist, belongs to someone else,
/// or is already closed.
pub async fn close_trade(
    db: &Database,
    user_id: UserId,
    trade_id: &str,
    exit_price: f64,
    exit_time: &str,
) -> Result<Option<Trade>, TallyError> {
    let uid = user_id.to_string();
    let trade_id = trade_id.to_string();
    let exit_time = exit_time.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Trade>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let open = tx
                .query_row(
                    &format!(
                        "SELECT {TRADE_COLUMNS} FROM trades \
                         WHERE id = ?1 AND user_id = ?2 AND status = 'OPEN'"
                    ),
                    params![trade_id, uid],
                    trade_from_row,
                )
                .optional()?;
            let Some(open) = open else {
                return Ok(None);
            };

            let pnl = realized_pnl(
                &open.direction,
                open.entry_price,
                exit_price,
                open.quantity,
                open.fees,
            );
            tx.execute(
                "UPDATE trades SET status = 'CLOSED', exit_price = ?2, exit_time = ?3, pnl = ?4
                 WHERE id = ?1",
                params![trade_id, exit_price, exit_time, pnl],
            )?;
            let closed = tx.query_row(
                &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1"),
                params![trade_id],
                trade_from_row,
            )?;
            tx.commit()?;
            Ok(Some(closed))
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one of the user's trades.
pub async fn get_trade(
    db: &Database,
    user_id: UserId,
    trade_id: &str,
) -> Result<Option<Trade>, TallyError> {
    let uid = user_id.to_string();
    let trade_id = trade_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {TRADE_COLUMNS} FROM trades WHERE id = ?1 AND user_id = ?2"),
                params![trade_id, uid],
                trade_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// The user's trades, newest entry first.
pub async fn list_trades(
    db: &Database,
    user_id: UserId,
    limit: i64,
    offset: i64,
) -> Result<Vec<Trade>, TallyError> {
    let uid = user_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Trade>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRADE_COLUMNS} FROM trades WHERE user_id = ?1 \
                 ORDER BY entry_time DESC LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt.query_map(params![uid, limit, offset], trade_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Number of trades the user has journaled.
pub async fn count_trades(db: &Database, user_id: UserId) -> Result<i64, TallyError> {
    let uid = user_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM trades WHERE user_id = ?1",
                params![uid],
                |row| row.get::<_, i64>(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete one of the user's trades. Returns whether a row was removed.
pub async fn delete_trade(db: &Database, user_id: UserId, trade_id: &str) -> Result<bool, TallyError> {
    let uid = user_id.to_string();
    let trade_id = trade_id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let n = conn.execute(
                "DELETE FROM trades WHERE id = ?1 AND user_id = ?2",
                params![trade_id, uid],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(map_tr_err)
}
