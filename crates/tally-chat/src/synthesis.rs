// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt assembly for the final answer.

use serde_json::{Value, json};
use tally_config::model::ChatConfig;
use tally_core::ChatMessage;
use tally_quota::estimate_reservation;
use tally_security::redact_private_fields;
use tracing::debug;

use crate::context::QueryContext;

/// Shown when no answer could be generated.
pub const FALLBACK_ANSWER: &str = "I'm having trouble generating the answer right now.";

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(text: String, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

/// Serialized context for the prompt: at most `max_rows` rows, private
/// fields redacted, cut to `max_chars`.
pub fn render_context(context: &QueryContext, max_rows: usize, max_chars: usize) -> String {
    let mut value = serde_json::to_value(context)
        .unwrap_or_else(|_| json!({"status": "error", "message": "Context unavailable."}));
    if let Some(Value::Array(rows)) = value.get_mut("data") {
        rows.truncate(max_rows);
    }
    let redacted = redact_private_fields(&mut value);
    if redacted > 0 {
        debug!(fields = redacted, "redacted private fields from context");
    }
    truncate_chars(value.to_string(), max_chars)
}

fn system_prompt(context_json: &str) -> String {
    format!(
        "You are a concise, factual Trading Analyst. Use ONLY the provided context data to answer.
CONTEXT:
{context_json}
RULES:
- If status == 'error', explain the error.
- If data is empty, say \"I found no matching trades.\"
- If meta.insufficient_data is true, warn that the sample is too small for firm conclusions.
- If meta.truncated is true, mention that only the first rows were considered.
- Round numeric values to 2 decimals."
    )
}

fn assemble(context_json: &str, tail: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(tail.len() + 2);
    messages.push(ChatMessage::system(system_prompt(context_json)));
    messages.extend(tail.iter().cloned());
    messages.push(ChatMessage::user(message));
    messages
}

/// System prompt with context, the last `history_turns` history messages,
/// then the user's message.
///
/// The result is shrunk until its reservation estimate fits `max_tokens`:
/// first the oldest history entries go, then the serialized context is cut.
/// Only a user message that is too large on its own can still exceed it.
pub fn build_messages(
    context: &QueryContext,
    history: &[ChatMessage],
    message: &str,
    config: &ChatConfig,
    max_tokens: i64,
) -> Vec<ChatMessage> {
    let mut tail = &history[history.len().saturating_sub(config.history_turns)..];
    let mut max_chars = config.max_context_chars;
    loop {
        let context_json = render_context(context, config.max_context_rows, max_chars);
        let messages = assemble(&context_json, tail, message);
        let estimate = estimate_reservation(&messages, config.output_ratio, config.output_padding);
        let over = estimate.estimated_total - max_tokens;
        if over <= 0 {
            return messages;
        }

        if let Some((_, rest)) = tail.split_first() {
            tail = rest;
            debug!(over, kept = tail.len(), "dropping history to fit the request ceiling");
        } else if max_chars > 0 {
            // Every context token is reserved once as input and again as output.
            let shed_tokens = (over as f64 / (1.0 + config.output_ratio)).ceil() as usize + 1;
            let cut = max_chars.min(context_json.chars().count());
            max_chars = cut.saturating_sub(shed_tokens * 4);
            debug!(over, max_chars, "shrinking synthesis context to fit the request ceiling");
        } else {
            return messages;
        }
    }
}
