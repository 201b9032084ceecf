// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! AI usage log persistence.

use rusqlite::params;
use tally_core::{TallyError, UserId};

use crate::database::{Database, map_tr_err};
use crate::models::{UsageLog, UsageTotals};

pub async fn insert_usage_log(db: &Database, log: &UsageLog) -> Result<(), TallyError> {
    let l = log.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO ai_usage_logs (id, user_id, model, provider, input_tokens, \
                 output_tokens, est_cost, latency_ms, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    l.id,
                    l.user_id,
                    l.model,
                    l.provider,
                    l.input_tokens,
                    l.output_tokens,
                    l.est_cost,
                    l.latency_ms,
                    l.context,
                    l.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Totals for a user over rows whose `created_at` starts with `prefix`
/// (e.g. `"2026-03"` for a month).
pub async fn totals_for_prefix(
    db: &Database,
    user_id: UserId,
    prefix: &str,
) -> Result<UsageTotals, TallyError> {
    let uid = user_id.to_string();
    let pattern = format!("{prefix}%");
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0),
                        COALESCE(SUM(est_cost), 0.0)
                 FROM ai_usage_logs WHERE user_id = ?1 AND created_at LIKE ?2",
                params![uid, pattern],
                |row| {
                    Ok(UsageTotals {
                        calls: row.get(0)?,
                        input_tokens: row.get(1)?,
                        output_tokens: row.get(2)?,
                        est_cost: row.get(3)?,
                    })
                },
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(user: UserId, created_at: &str, cost: f64) -> UsageLog {
        UsageLog {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.to_string(),
            model: "gpt-4.1".into(),
            provider: "openai".into(),
            input_tokens: 100,
            output_tokens: 50,
            est_cost: cost,
            latency_ms: 12.5,
            context: "chat_synthesis".into(),
            created_at: created_at.into(),
        }
    }

    #[tokio::test]
    async fn monthly_totals_only_count_matching_rows() {
        let db = Database::open_in_memory().await.unwrap();
        let user = UserId::new();
        insert_usage_log(&db, &log(user, "2026-03-01T00:00:00.000Z", 0.5))
            .await
            .unwrap();
        insert_usage_log(&db, &log(user, "2026-03-15T00:00:00.000Z", 0.25))
            .await
            .unwrap();
        insert_usage_log(&db, &log(user, "2026-04-01T00:00:00.000Z", 9.0))
            .await
            .unwrap();
        insert_usage_log(&db, &log(UserId::new(), "2026-03-02T00:00:00.000Z", 9.0))
            .await
            .unwrap();

        let totals = totals_for_prefix(&db, user, "2026-03").await.unwrap();
        assert_eq!(totals.calls, 2);
        assert_eq!(totals.input_tokens, 200);
        assert_eq!(totals.output_tokens, 100);
        assert!((totals.est_cost - 0.75).abs() < 1e-9);
    }
}
