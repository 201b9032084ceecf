// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage records for metered LLM calls.

use tally_core::{TallyError, UserId};
use tally_storage::queries::usage::insert_usage_log;
use tally_storage::{Database, UsageLog, now_timestamp};
use tracing::debug;

use crate::pricing::{calculate_cost, get_pricing};

/// One finished call, before pricing.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageEntry {
    pub user_id: UserId,
    pub model: String,
    pub provider: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub latency_ms: f64,
    /// What the call was for, e.g. `chat_synthesis`.
    pub context: String,
}

impl UsageEntry {
    /// Price the entry and stamp it with an id and the current time.
    pub fn into_log(self) -> UsageLog {
        let input_tokens = self.input_tokens.max(0);
        let output_tokens = self.output_tokens.max(0);
        let est_cost = calculate_cost(input_tokens, output_tokens, &get_pricing(&self.model));
        UsageLog {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.to_string(),
            model: self.model,
            provider: self.provider,
            input_tokens,
            output_tokens,
            est_cost,
            latency_ms: self.latency_ms,
            context: self.context,
            created_at: now_timestamp(),
        }
    }
}

pub async fn record(db: &Database, entry: UsageEntry) -> Result<UsageLog, TallyError> {
    let log = entry.into_log();
    insert_usage_log(db, &log).await?;
    debug!(
        user_id = %log.user_id,
        model = %log.model,
        input_tokens = log.input_tokens,
        output_tokens = log.output_tokens,
        est_cost = log.est_cost,
        "usage recorded"
    );
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_log_prices_and_clamps() {
        let user = UserId::new();
        let log = UsageEntry {
            user_id: user,
            model: "gpt-5".into(),
            provider: "openai".into(),
            input_tokens: 2_000,
            output_tokens: -3,
            latency_ms: 850.0,
            context: "chat_synthesis".into(),
        }
        .into_log();
        assert_eq!(log.user_id, user.to_string());
        assert_eq!(log.output_tokens, 0);
        assert!((log.est_cost - 0.0025).abs() < 1e-12);
        assert_eq!(log.created_at.len(), "2026-01-01T00:00:00.000Z".len());
    }
}
