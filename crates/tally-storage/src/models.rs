// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row types for the journal tables.

use serde::{Deserialize, Serialize};
use tally_core::{PlanTier, UserId, UserProfile};

/// A `user_profiles` row with the plan kept as stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileRow {
    pub id: UserId,
    pub plan_tier: String,
    pub daily_chat_count: i64,
    pub last_chat_reset_at: Option<String>,
    pub monthly_import_count: i64,
    pub monthly_ai_tokens_used: i64,
    pub quota_reset_at: Option<String>,
}

impl ProfileRow {
    /// Normalizes the stored plan, using `fallback` for unrecognized values.
    pub fn into_profile(self, fallback: PlanTier) -> UserProfile {
        let plan_tier = PlanTier::normalize(&self.plan_tier).unwrap_or_else(|| {
            tracing::warn!(user_id = %self.id, plan = %self.plan_tier, "unknown plan tier, using fallback");
            fallback
        });
        UserProfile {
            id: self.id,
            plan_tier,
            daily_chat_count: self.daily_chat_count,
            last_chat_reset_at: self.last_chat_reset_at,
            monthly_import_count: self.monthly_import_count,
            monthly_ai_tokens_used: self.monthly_ai_tokens_used,
            quota_reset_at: self.quota_reset_at,
        }
    }
}

/// A journaled trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    /// `LONG` or `SHORT`.
    pub direction: String,
    /// `OPEN` or `CLOSED`.
    pub status: String,
    pub pnl: Option<f64>,
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub fees: f64,
    pub entry_time: String,
    pub exit_time: Option<String>,
    pub instrument_type: String,
    pub strategy_id: Option<String>,
    /// Comma-separated tags.
    pub tags: Option<String>,
}

/// Input for recording a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrade {
    pub symbol: String,
    pub direction: String,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_time: String,
    pub instrument_type: String,
    pub strategy_id: Option<String>,
    pub tags: Option<String>,
    pub fees: f64,
}

impl NewTrade {
    /// An open single-unit stock trade with no strategy, tags or fees.
    pub fn open(symbol: &str, direction: &str, entry_price: f64, entry_time: &str) -> Self {
        Self {
            symbol: symbol.trim().to_uppercase(),
            direction: direction.trim().to_uppercase(),
            quantity: 1.0,
            entry_price,
            entry_time: entry_time.to_string(),
            instrument_type: "STOCK".to_string(),
            strategy_id: None,
            tags: None,
            fees: 0.0,
        }
    }
}

/// Realized PnL of a position: signed price move times size, less fees.
pub fn realized_pnl(direction: &str, entry: f64, exit: f64, quantity: f64, fees: f64) -> f64 {
    let multiplier = if direction.eq_ignore_ascii_case("SHORT") {
        -1.0
    } else {
        1.0
    };
    (exit - entry) * quantity * multiplier - fees
}

/// A named trading strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub style: Option<String>,
    pub description: Option<String>,
    pub created_at: String,
}

/// One metered LLM call.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageLog {
    pub id: String,
    pub user_id: String,
    pub model: String,
    pub provider: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub est_cost: f64,
    pub latency_ms: f64,
    /// What the call was for, e.g. `chat_synthesis`.
    pub context: String,
    pub created_at: String,
}

/// Aggregated usage over a period.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub calls: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub est_cost: f64,
}
