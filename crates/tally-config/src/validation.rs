// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use tally_core::PlanTier;

use crate::diagnostic::ConfigError;
use crate::model::{PlanLimits, TallyConfig};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &TallyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path must not be empty"));
    }

    let llm = &config.llm;
    if !(0.0..=2.0).contains(&llm.temperature) {
        errors.push(ConfigError::invalid(format!(
            "llm.temperature must be between 0 and 2, got {}",
            llm.temperature
        )));
    }
    if llm.max_attempts < 1 {
        errors.push(ConfigError::invalid("llm.max_attempts must be at least 1"));
    }
    if llm.timeout_secs == 0 {
        errors.push(ConfigError::invalid("llm.timeout_secs must be greater than 0"));
    }
    if llm.retry_base_delay_ms > llm.retry_max_delay_ms {
        errors.push(ConfigError::invalid(format!(
            "llm.retry_base_delay_ms ({}) must not exceed llm.retry_max_delay_ms ({})",
            llm.retry_base_delay_ms, llm.retry_max_delay_ms
        )));
    }
    if llm.model.trim().is_empty() {
        errors.push(ConfigError::invalid("llm.model must not be empty"));
    }

    if config.sql.max_rows < 1 {
        errors.push(ConfigError::invalid("sql.max_rows must be at least 1"));
    }
    if config.sql.min_sample_size > config.sql.max_rows {
        errors.push(ConfigError::invalid(format!(
            "sql.min_sample_size ({}) must not exceed sql.max_rows ({})",
            config.sql.min_sample_size, config.sql.max_rows
        )));
    }

    if config.chat.history_turns > config.chat.recent_context_limit {
        errors.push(ConfigError::invalid(format!(
            "chat.history_turns ({}) must not exceed chat.recent_context_limit ({})",
            config.chat.history_turns, config.chat.recent_context_limit
        )));
    }
    if config.chat.output_ratio < 0.0 {
        errors.push(ConfigError::invalid("chat.output_ratio must be non-negative"));
    }

    if config.quota.max_tokens_per_request <= 0 {
        errors.push(ConfigError::invalid(
            "quota.max_tokens_per_request must be greater than 0",
        ));
    } else if config.chat.output_ratio >= 0.0 {
        let needed = context_reservation(config);
        if needed > config.quota.max_tokens_per_request {
            errors.push(ConfigError::invalid(format!(
                "chat.max_context_chars ({}) needs a reservation of {needed} tokens, \
                 above quota.max_tokens_per_request ({})",
                config.chat.max_context_chars, config.quota.max_tokens_per_request
            )));
        }
    }
    if PlanTier::normalize(&config.quota.default_plan).is_none() {
        errors.push(ConfigError::invalid(format!(
            "quota.default_plan `{}` is not a known plan (FREE, PRO, PREMIUM)",
            config.quota.default_plan
        )));
    }

    for (name, limits) in [
        ("free", &config.plans.free),
        ("pro", &config.plans.pro),
        ("premium", &config.plans.premium),
    ] {
        validate_plan(name, limits, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Tokens reserved for a synthesis call whose context fills
/// `chat.max_context_chars`, before the prompt and history are counted.
fn context_reservation(config: &TallyConfig) -> i64 {
    let chat = &config.chat;
    let input = chat.max_context_chars.div_ceil(4) as f64;
    (input * (1.0 + chat.output_ratio)).ceil() as i64 + i64::from(chat.output_padding)
}

fn validate_plan(name: &str, limits: &PlanLimits, errors: &mut Vec<ConfigError>) {
    if limits.daily_chat_msgs <= 0 {
        errors.push(ConfigError::invalid(format!(
            "plans.{name}.daily_chat_msgs must be greater than 0"
        )));
    }
    if limits.monthly_csv_imports < 0 {
        errors.push(ConfigError::invalid(format!(
            "plans.{name}.monthly_csv_imports must be non-negative"
        )));
    }
    if let Some(tokens) = limits.monthly_ai_tokens_limit
        && tokens < 0
    {
        errors.push(ConfigError::invalid(format!(
            "plans.{name}.monthly_ai_tokens_limit must be non-negative, got {tokens}"
        )));
    }
}
