// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tolerant extraction of a JSON object from model output.
//!
//! Models wrap JSON in code fences, prefix it with `data:`, or surround it
//! with prose. [`parse_llm_json`] strips the wrappers and scans for the first
//! balanced object, ignoring braces inside string literals.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Longest span scanned for the closing brace.
pub const MAX_SCAN_CHARS: usize = 20_000;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:\w+)?\n(.*?)```").unwrap());
static DATA_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*data:\s*").unwrap());

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("empty model response")]
    Empty,
    #[error("no JSON object found")]
    NoObject,
    #[error("unbalanced braces in model response")]
    Unbalanced,
    #[error("JSON object longer than {MAX_SCAN_CHARS} characters")]
    TooLong,
    #[error("invalid JSON: {0}")]
    Invalid(#[from] serde_json::Error),
}

fn strip_wrappers(text: &str) -> String {
    let unfenced = CODE_FENCE.replace_all(text, "$1");
    DATA_PREFIX.replace_all(&unfenced, "").trim().to_string()
}

/// Byte range of the first balanced `{...}` starting at `start`.
fn balanced_end(s: &str, start: usize) -> Result<usize, ParseError> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (scanned, (offset, ch)) in s[start..].char_indices().enumerate() {
        if scanned >= MAX_SCAN_CHARS {
            return Err(ParseError::TooLong);
        }
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Ok(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    Err(ParseError::Unbalanced)
}

/// Parse the first JSON object in `text`.
pub fn parse_llm_json(text: &str) -> Result<Value, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let s = strip_wrappers(text);

    if s.starts_with('{')
        && s.ends_with('}')
        && let Ok(value) = serde_json::from_str::<Value>(&s)
    {
        return Ok(value);
    }

    let start = s.find('{').ok_or(ParseError::NoObject)?;
    let end = balanced_end(&s, start)?;
    Ok(serde_json::from_str(&s[start..end])?)
}
