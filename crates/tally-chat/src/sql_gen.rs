// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text-to-SQL for data questions. One attempt, never fails: anything that
//! goes wrong yields [`NO_SQL`].

use std::sync::Arc;

use tally_core::{ChatMessage, LlmProvider};
use tracing::{debug, warn};

use crate::settings::ModelSettings;

/// Returned when no query is warranted or generation failed.
pub const NO_SQL: &str = "NO_SQL";

/// Read-only schema the model may query.
pub const SCHEMA_CONTEXT: &str = "SQLite schema (read-only). Use user_id = $1 for scoping.
Tables:
- trades(user_id, symbol, direction, status, quantity, pnl, entry_price, exit_price, fees, entry_time, exit_time, instrument_type, strategy_id, tags)
- strategies(id, user_id, name, style, description)
Join: trades.strategy_id = strategies.id
Timestamps are ISO-8601 UTC text, e.g. 2026-03-02T15:04:05.000Z. status is 'OPEN' or 'CLOSED'; pnl is set on CLOSED trades.";

fn system_prompt() -> String {
    format!(
        "You generate a single SQLite SELECT (or WITH ... SELECT) query, RAW SQL only.
SCHEMA:
{SCHEMA_CONTEXT}
RULES:
- Generate SQL ONLY if data is required. If not, return exactly {NO_SQL}.
- Use only SELECT / WITH ... SELECT.
- ALWAYS include `user_id = $1` in every WHERE clause that reads trades or strategies.
- Prefer aggregates (SUM, AVG, COUNT).
- Do not add LIMIT; the caller applies one.
- No destructive operations, no comments, no semicolons."
    )
}

/// Whether generation produced nothing usable.
pub fn is_no_sql(sql: &str) -> bool {
    let sql = sql.trim();
    sql.is_empty() || sql.eq_ignore_ascii_case(NO_SQL)
}

/// Drop markdown fences around model SQL.
fn strip_fences(content: &str) -> String {
    content
        .replace("```sql", "")
        .replace("```SQL", "")
        .replace("```", "")
        .trim()
        .to_string()
}

pub struct SqlGenerator {
    llm: Arc<dyn LlmProvider>,
    settings: ModelSettings,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, settings: ModelSettings) -> Self {
        Self { llm, settings }
    }

    pub async fn generate(&self, message: &str) -> String {
        let request = self.settings.deterministic(
            vec![
                ChatMessage::system(system_prompt()),
                ChatMessage::user(message),
            ],
            None,
        );
        match self.llm.complete(request).await {
            Ok(resp) => {
                let sql = strip_fences(&resp.content);
                if is_no_sql(&sql) {
                    debug!("model declined to generate SQL");
                    NO_SQL.to_string()
                } else {
                    sql
                }
            }
            Err(e) => {
                warn!(error = %e, "SQL generation failed");
                NO_SQL.to_string()
            }
        }
    }
}
