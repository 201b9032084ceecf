// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two data lanes behind the chat assistant.
//!
//! The standard metrics lane runs one fixed aggregate. The dynamic lane runs
//! guard-admitted SQL inside a transaction where `trades` and `strategies`
//! are shadowed by temp views holding only the caller's rows; rolling the
//! transaction back drops the views again. An authorizer refuses reads of any
//! other table, and a progress handler interrupts the statement once
//! `statement_timeout_ms` has passed.

use std::time::{Duration, Instant};

use rusqlite::hooks::{AuthAction, AuthContext, Authorization};
use rusqlite::params;
use rusqlite::types::ValueRef;
use serde_json::{Number, Value};
use tally_config::model::SqlConfig;
use tally_core::{TallyError, UserId};
use tally_storage::{Database, map_tr_err};
use tracing::{debug, error, warn};

use crate::context::{ContextMeta, QueryContext, Row};
use crate::intent::Period;
use crate::sql_guard::AdmittedQuery;

/// VM instructions between deadline checks.
const PROGRESS_OPS: i32 = 1_000;

/// Tables guarded SQL may read, in any schema.
const READABLE_TABLES: &[&str] = &["trades", "strategies"];

#[derive(Debug, thiserror::Error)]
enum ExecFailure {
    #[error("statement is not read-only")]
    NotReadOnly,
    #[error("expected exactly one parameter, found {0}")]
    ParameterCount(usize),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl ExecFailure {
    /// What the model (and so the user) gets to see.
    fn sanitized(&self) -> &'static str {
        match self {
            ExecFailure::NotReadOnly => "Query rejected: it is not read-only.",
            ExecFailure::ParameterCount(_) => {
                "Query rejected: it must use exactly one parameter ($1)."
            }
            ExecFailure::Sqlite(e)
                if e.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) =>
            {
                "Query timed out."
            }
            ExecFailure::Sqlite(e)
                if e.sqlite_error_code()
                    == Some(rusqlite::ErrorCode::AuthorizationForStatementDenied) =>
            {
                "Query rejected: it reads a table outside the journal."
            }
            ExecFailure::Sqlite(_) => "Query execution failed.",
        }
    }
}

struct MetricTotals {
    total: i64,
    net_pnl: f64,
    avg_pnl: Option<f64>,
    wins: i64,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<{} bytes>", b.len())),
    }
}

/// `uid` comes from a parsed [`UserId`], so it is a bare UUID.
fn scoped_views(uid: &str) -> String {
    format!(
        "CREATE TEMP VIEW trades AS SELECT * FROM main.trades WHERE user_id = '{uid}';
         CREATE TEMP VIEW strategies AS SELECT * FROM main.strategies WHERE user_id = '{uid}';"
    )
}

/// Subqueries and CTEs never reach the authorizer, only real tables do.
fn journal_reads_only(ctx: AuthContext<'_>) -> Authorization {
    match ctx.action {
        AuthAction::Read { table_name, .. } if !READABLE_TABLES.contains(&table_name) => {
            Authorization::Deny
        }
        _ => Authorization::Allow,
    }
}

fn run_scoped(
    conn: &mut rusqlite::Connection,
    uid: &str,
    sql: &str,
    max_rows: usize,
) -> Result<Vec<Row>, ExecFailure> {
    let tx = conn.transaction()?;
    tx.execute_batch(&scoped_views(uid))?;

    tx.authorizer(Some(journal_reads_only));
    let result = read_rows(&tx, uid, sql, max_rows);
    tx.authorizer(None::<fn(AuthContext<'_>) -> Authorization>);
    let out = result?;
    tx.rollback()?;
    Ok(out)
}

fn read_rows(
    conn: &rusqlite::Connection,
    uid: &str,
    sql: &str,
    max_rows: usize,
) -> Result<Vec<Row>, ExecFailure> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(ExecFailure::NotReadOnly);
    }
    let param_count = stmt.parameter_count();
    if param_count != 1 {
        return Err(ExecFailure::ParameterCount(param_count));
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut out = Vec::new();
    let mut rows = stmt.query([uid])?;
    while out.len() < max_rows
        && let Some(row) = rows.next()?
    {
        let mut record = Row::new();
        for (i, name) in columns.iter().enumerate() {
            record.insert(name.clone(), json_value(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

#[derive(Clone)]
pub struct QueryTools {
    db: Database,
    max_rows: usize,
    min_sample_size: usize,
    statement_timeout: Duration,
}

impl QueryTools {
    pub fn new(db: Database, config: &SqlConfig) -> Self {
        Self {
            db,
            max_rows: config.max_rows,
            min_sample_size: config.min_sample_size,
            statement_timeout: Duration::from_millis(config.statement_timeout_ms),
        }
    }

    /// Count, net and average PnL, and win rate over closed trades.
    pub async fn standard_metrics(
        &self,
        user_id: UserId,
        period: Period,
    ) -> Result<QueryContext, TallyError> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(pnl), 0), ROUND(AVG(pnl), 2),
                    COUNT(*) FILTER (WHERE pnl > 0)
             FROM trades
             WHERE user_id = ?1 AND status = 'CLOSED' AND {}",
            period.entry_time_predicate()
        );
        let uid = user_id.to_string();
        let totals = self
            .db
            .connection()
            .call(move |conn| {
                conn.query_row(&sql, params![uid], |row| {
                    Ok(MetricTotals {
                        total: row.get(0)?,
                        net_pnl: row.get(1)?,
                        avg_pnl: row.get(2)?,
                        wins: row.get(3)?,
                    })
                })
            })
            .await
            .map_err(map_tr_err)?;

        debug!(user_id = %user_id, %period, total = totals.total, "standard metrics");
        if totals.total == 0 {
            return Ok(QueryContext::empty());
        }

        let win_rate = round_to(totals.wins as f64 / totals.total as f64 * 100.0, 1);
        let mut row = Row::new();
        row.insert("period".into(), Value::String(period.to_string()));
        row.insert("total_trades".into(), Value::from(totals.total));
        row.insert("net_pnl".into(), Value::from(round_to(totals.net_pnl, 2)));
        row.insert("avg_pnl".into(), Value::from(totals.avg_pnl.unwrap_or(0.0)));
        row.insert("win_rate".into(), Value::from(win_rate));
        Ok(QueryContext::rows(
            vec![row],
            ContextMeta {
                period: Some(period),
                ..ContextMeta::default()
            },
        ))
    }

    /// Run admitted SQL with the caller's id bound to `$1`.
    ///
    /// Never fails: database errors become an error context with a
    /// sanitized message.
    pub async fn execute_secure_sql(&self, user_id: UserId, query: &AdmittedQuery) -> QueryContext {
        let uid = user_id.to_string();
        let sql = query.as_str().to_string();
        let max_rows = self.max_rows;
        let timeout = self.statement_timeout;
        let started = Instant::now();

        let result = self
            .db
            .connection()
            .call(move |conn| {
                let deadline = Instant::now() + timeout;
                conn.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
                let result = run_scoped(conn, &uid, &sql, max_rows);
                conn.progress_handler(0, None::<fn() -> bool>);
                result
            })
            .await;

        match result {
            Ok(rows) => {
                let n = rows.len();
                debug!(
                    user_id = %user_id,
                    rows = n,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "guarded query finished"
                );
                QueryContext::rows(
                    rows,
                    ContextMeta {
                        truncated: Some(n >= max_rows),
                        insufficient_data: Some(n < self.min_sample_size),
                        ..ContextMeta::default()
                    },
                )
            }
            Err(tokio_rusqlite::Error::Error(failure)) => {
                warn!(user_id = %user_id, error = %failure, "guarded query failed");
                QueryContext::error(failure.sanitized())
            }
            Err(other) => {
                error!(user_id = %user_id, error = %other, "database unavailable for guarded query");
                QueryContext::error("Query execution failed.")
            }
        }
    }
}
