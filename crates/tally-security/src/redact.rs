// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Secret redaction for log output and private-field redaction for prompts.
//!
//! Secrets are caught two ways: regexes for known provider key formats, and
//! exact matches for the configured keys loaded at startup.

use std::io::Write;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;
use serde_json::Value;

/// Known provider secret formats.
static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // OpenAI keys, including project keys: sk-proj-...
        Regex::new(r"sk-[a-zA-Z0-9_\-]{20,}").unwrap(),
        // Perplexity keys.
        Regex::new(r"pplx-[a-zA-Z0-9]{20,}").unwrap(),
        // Google API keys (Gemini).
        Regex::new(r"AIza[0-9A-Za-z_\-]{35}").unwrap(),
        // Bearer tokens in headers.
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").unwrap(),
        // Keys passed as query parameters.
        Regex::new(r"([?&]key=)[^&\s]+").unwrap(),
    ]
});

/// The redaction placeholder.
pub const REDACTED: &str = "[REDACTED]";

/// Object keys whose values never reach a model prompt.
const PRIVATE_KEY_MARKERS: &[&str] = &["preference"];

/// Redact secrets from a string using the known patterns plus exact values.
pub fn redact(input: &str, known_secrets: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in SECRET_PATTERNS.iter() {
        result = pattern
            .replace_all(&result, |caps: &regex::Captures<'_>| {
                // Keep the `?key=` prefix so URLs stay readable.
                match caps.get(1) {
                    Some(prefix) => format!("{}{REDACTED}", prefix.as_str()),
                    None => REDACTED.to_string(),
                }
            })
            .into_owned();
    }

    // Longest first so a secret containing another is fully replaced.
    let mut sorted: Vec<&String> = known_secrets.iter().filter(|s| !s.is_empty()).collect();
    sorted.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted {
        result = result.replace(value.as_str(), REDACTED);
    }

    result
}

/// Replace every object value whose key names account preferences.
///
/// Walks nested objects and arrays. Returns how many values were replaced.
pub fn redact_private_fields(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let mut replaced = 0;
            for (key, inner) in map.iter_mut() {
                let lower = key.to_ascii_lowercase();
                if PRIVATE_KEY_MARKERS.iter().any(|m| lower.contains(m)) {
                    *inner = Value::String(REDACTED.to_string());
                    replaced += 1;
                } else {
                    replaced += redact_private_fields(inner);
                }
            }
            replaced
        }
        Value::Array(items) => items.iter_mut().map(redact_private_fields).sum(),
        _ => 0,
    }
}

/// A writer that redacts secrets before forwarding to `inner`.
///
/// Used as the tracing output so that provider keys never reach the logs,
/// even when an upstream error message echoes a request URL.
pub struct RedactingWriter<W> {
    inner: W,
    known_secrets: Arc<RwLock<Vec<String>>>,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, known_secrets: Arc<RwLock<Vec<String>>>) -> Self {
        Self {
            inner,
            known_secrets,
        }
    }

    /// Register a secret for exact-match redaction.
    pub fn add_secret(known_secrets: &Arc<RwLock<Vec<String>>>, value: String) {
        if value.is_empty() {
            return;
        }
        if let Ok(mut values) = known_secrets.write()
            && !values.contains(&value)
        {
            values.push(value);
        }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let secrets = self
            .known_secrets
            .read()
            .map(|v| v.clone())
            .unwrap_or_default();
        self.inner.write_all(redact(&input, &secrets).as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
