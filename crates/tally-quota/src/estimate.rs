// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Character-count token heuristics.

use tally_core::ChatMessage;

/// Roughly four characters per token, never less than one token.
pub fn estimate_tokens(text: &str) -> i64 {
    ((text.chars().count() / 4) as i64).max(1)
}

/// Output tokens of a finished response, for usage logs. Zero for empty text.
pub fn output_tokens(text: &str) -> i64 {
    (text.chars().count() / 4) as i64
}

/// Upfront token estimate for one metered call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservationEstimate {
    pub input_tokens: i64,
    pub estimated_total: i64,
}

/// Input is every message content joined with single spaces. The output
/// allowance is `input * output_ratio` plus a fixed padding.
pub fn estimate_reservation(
    messages: &[ChatMessage],
    output_ratio: f64,
    padding: u32,
) -> ReservationEstimate {
    let text = messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let input_tokens = estimate_tokens(&text);
    let output = (input_tokens as f64 * output_ratio).floor() as i64 + i64::from(padding);
    ReservationEstimate {
        input_tokens,
        estimated_total: input_tokens + output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_costs_one_token() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(output_tokens(""), 0);
    }

    #[test]
    fn counts_characters_not_bytes() {
        assert_eq!(estimate_tokens("€€€€€€€€"), 2);
    }

    #[test]
    fn reservation_adds_ratio_and_padding() {
        let messages = vec![
            ChatMessage::system("a".repeat(399)),
            ChatMessage::user("b".repeat(400)),
        ];
        // 399 + 1 space + 400 = 800 chars -> 200 tokens.
        let est = estimate_reservation(&messages, 1.0, 10);
        assert_eq!(est.input_tokens, 200);
        assert_eq!(est.estimated_total, 410);

        let est = estimate_reservation(&messages, 0.5, 0);
        assert_eq!(est.estimated_total, 300);
    }
}
