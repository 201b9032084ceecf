// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Intent classification for chat messages.
//!
//! Keyword heuristics answer the common cases with no model call. Anything
//! they cannot place goes to the LLM, and any failure there degrades to
//! [`Intent::General`], which never reads user data.

use std::sync::Arc;

use tally_core::{ChatMessage, LlmProvider, ResponseFormat};
use tracing::{debug, warn};

use crate::intent::{Intent, Period};
use crate::json::parse_llm_json;
use crate::settings::ModelSettings;

/// Metric terms that route to the standard metrics lane (contains, lower-case).
const CORE_METRICS: &[&str] = &[
    "pnl",
    "profit",
    "loss",
    "win rate",
    "winrate",
    "trades",
    "performance",
    "returns",
];

/// Qualifiers that turn a metric question into a custom query.
const RELATIONAL_QUALIFIERS: &[&str] = &[
    " on ", " by ", " per ", " when ", " where ", " strategy", " tag", " symbol",
];

/// Greetings (exact match after trimming punctuation).
const GREETINGS: &[&str] = &["hi", "hello", "hey"];

/// Terms that mean the answer needs the database.
const DATA_KEYWORDS: &[&str] = &[
    "win rate",
    "pnl",
    "profit",
    "loss",
    "trades",
    "avg",
    "average",
    "sum",
    "total",
    "count",
    "how many",
    "best strategy",
    "worst strategy",
    "performance",
    "drawdown",
    "expectancy",
];

/// Terms that mean the user wants advice rather than numbers.
const REASONING_KEYWORDS: &[&str] = &[
    "how should",
    "how to",
    "advice",
    "improve",
    "why",
    "explain",
    "suggest",
    "should i",
];

/// Window phrases, checked in order.
const PERIOD_PHRASES: &[(&str, Period)] = &[
    ("this month", Period::ThisMonth),
    ("last 7 days", Period::Last7Days),
    ("past 7 days", Period::Last7Days),
    ("this week", Period::Last7Days),
    ("past week", Period::Last7Days),
    ("last week", Period::Last7Days),
    ("last 30 days", Period::Last30Days),
    ("past 30 days", Period::Last30Days),
    ("past month", Period::Last30Days),
];

const CLASSIFY_PROMPT: &str = "Classify the user request into exactly ONE of these types.
Return JSON ONLY.

TYPES:
- STANDARD_METRICS (headline numbers: win rate, PnL, trade count)
- DATA_QUERY (questions needing a custom query over trades or strategies)
- REASONING_ONLY (advice or explanation, no data needed)
- GENERAL

For STANDARD_METRICS set args.period to one of ALL_TIME, LAST_7_DAYS, THIS_MONTH, LAST_30_DAYS.

Return format:
{ \"type\": \"...\", \"args\": { } }";

const NEEDS_DATA_SYSTEM: &str = "Answer YES or NO only.";

/// Lower-cased, trimmed, and padded with spaces so edge qualifiers match.
fn normalize(message: &str) -> String {
    format!(" {} ", message.trim().to_lowercase())
}

/// The reporting window named in `message`, or all time.
pub fn infer_period(message: &str) -> Period {
    let text = message.to_lowercase();
    PERIOD_PHRASES
        .iter()
        .find(|(phrase, _)| text.contains(phrase))
        .map(|(_, period)| *period)
        .unwrap_or_default()
}

/// Heuristic classification. `None` when only the model can decide.
pub fn classify_fast(message: &str) -> Option<Intent> {
    let text = normalize(message);

    if CORE_METRICS.iter().any(|k| text.contains(k)) {
        if RELATIONAL_QUALIFIERS.iter().any(|q| text.contains(q)) {
            return Some(Intent::DataQuery);
        }
        return Some(Intent::StandardMetrics {
            period: infer_period(&text),
        });
    }

    let bare = text.trim().trim_end_matches(['!', '.', '?', ',']);
    if GREETINGS.contains(&bare) {
        return Some(Intent::General);
    }
    None
}

/// Keyword answer to "does this need the database?", if the keywords decide it.
pub fn needs_data_fast(message: &str) -> Option<bool> {
    let text = message.to_lowercase();
    if DATA_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Some(true);
    }
    if REASONING_KEYWORDS.iter().any(|k| text.contains(k)) {
        return Some(false);
    }
    None
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmProvider>,
    settings: ModelSettings,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, settings: ModelSettings) -> Self {
        Self { llm, settings }
    }

    /// Classify `message`. Never fails.
    pub async fn classify(&self, message: &str) -> Intent {
        if let Some(intent) = classify_fast(message) {
            debug!(%intent, "classified by keywords");
            return intent;
        }

        let request = self.settings.deterministic(
            vec![
                ChatMessage::system(CLASSIFY_PROMPT),
                ChatMessage::user(message),
            ],
            Some(ResponseFormat::JsonObject),
        );
        let content = match self.llm.complete(request).await {
            Ok(resp) => resp.content,
            Err(e) => {
                warn!(error = %e, "intent classification call failed");
                return Intent::General;
            }
        };

        match parse_llm_json(&content) {
            Ok(value) => match Intent::from_json(&value) {
                Some(intent) => {
                    debug!(%intent, "classified by model");
                    intent
                }
                None => {
                    debug!(response = %value, "model returned an unknown intent");
                    Intent::General
                }
            },
            Err(e) => {
                debug!(error = %e, "unparseable classification");
                Intent::General
            }
        }
    }

    /// Whether a data question actually needs a query.
    ///
    /// Ambiguous messages and model failures answer yes.
    pub async fn needs_data(&self, message: &str) -> bool {
        if let Some(decided) = needs_data_fast(message) {
            return decided;
        }

        let prompt = format!(
            "Does this message require querying the user's database? Answer YES or NO only.\n\nMessage: \"{message}\""
        );
        let request = self.settings.deterministic(
            vec![
                ChatMessage::system(NEEDS_DATA_SYSTEM),
                ChatMessage::user(prompt),
            ],
            None,
        );
        match self.llm.complete(request).await {
            Ok(resp) => resp.content.trim().to_uppercase().starts_with('Y'),
            Err(e) => {
                warn!(error = %e, "needs-data call failed, assuming data is needed");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tally_config::model::LlmConfig;
    use tally_test_utils::{MockProvider, MockReply};

    use super::*;

    fn classifier(mock: &MockProvider) -> IntentClassifier {
        IntentClassifier::new(
            Arc::new(mock.clone()),
            ModelSettings::from_config(&LlmConfig::default()),
        )
    }

    #[test]
    fn metric_questions_use_the_fast_path() {
        assert_eq!(
            classify_fast("What's my PnL?"),
            Some(Intent::StandardMetrics {
                period: Period::AllTime
            })
        );
        assert_eq!(
            classify_fast("What's my win rate this month?"),
            Some(Intent::StandardMetrics {
                period: Period::ThisMonth
            })
        );
        assert_eq!(
            classify_fast("how did my trades do this week"),
            Some(Intent::StandardMetrics {
                period: Period::Last7Days
            })
        );
    }

    #[test]
    fn qualified_metric_questions_are_data_queries() {
        assert_eq!(
            classify_fast("Show me my PnL by strategy"),
            Some(Intent::DataQuery)
        );
        assert_eq!(classify_fast("win rate per symbol"), Some(Intent::DataQuery));
        assert_eq!(
            classify_fast("profit when I trade on fridays"),
            Some(Intent::DataQuery)
        );
    }

    #[test]
    fn greetings_and_unknowns() {
        assert_eq!(classify_fast("Hello!"), Some(Intent::General));
        assert_eq!(classify_fast("  hey "), Some(Intent::General));
        assert_eq!(classify_fast("hey there, can you help"), None);
        assert_eq!(classify_fast("What is my biggest winner?"), None);
    }

    #[test]
    fn period_inference() {
        assert_eq!(infer_period("pnl last 30 days"), Period::Last30Days);
        assert_eq!(infer_period("pnl in the PAST MONTH"), Period::Last30Days);
        assert_eq!(infer_period("pnl this year"), Period::AllTime);
    }

    #[test]
    fn needs_data_keywords() {
        assert_eq!(needs_data_fast("how many trades on AAPL"), Some(true));
        assert_eq!(needs_data_fast("why do I keep revenge trading"), Some(false));
        assert_eq!(needs_data_fast("tell me about my AAPL positions"), None);
    }

    #[tokio::test]
    async fn model_fallback_parses_json() {
        let mock = MockProvider::with_responses(vec![
            "```json\n{\"type\": \"REASONING_ONLY\", \"args\": {}}\n```",
        ]);
        let intent = classifier(&mock).classify("Is scaling in a good idea?").await;
        assert_eq!(intent, Intent::ReasoningOnly);

        let requests = mock.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(requests[0].temperature, 0.0);
    }

    #[tokio::test]
    async fn model_period_is_carried() {
        let mock = MockProvider::with_responses(vec![
            r#"{"type": "STANDARD_METRICS", "args": {"period": "LAST_7_DAYS"}}"#,
        ]);
        let intent = classifier(&mock).classify("How am I doing lately?").await;
        assert_eq!(
            intent,
            Intent::StandardMetrics {
                period: Period::Last7Days
            }
        );
    }

    #[tokio::test]
    async fn malformed_model_output_is_general() {
        let mock = MockProvider::with_responses(vec!["I think it's a DATA_QUERY"]);
        assert_eq!(
            classifier(&mock).classify("Anything odd lately?").await,
            Intent::General
        );

        let mock = MockProvider::with_responses(vec![r#"{"type": "DELETE_EVERYTHING"}"#]);
        assert_eq!(
            classifier(&mock).classify("Anything odd lately?").await,
            Intent::General
        );
    }

    #[tokio::test]
    async fn failed_model_call_is_general() {
        let mock = MockProvider::with_replies(vec![MockReply::server_error()]);
        assert_eq!(
            classifier(&mock).classify("Anything odd lately?").await,
            Intent::General
        );
    }

    #[tokio::test]
    async fn fast_path_skips_the_model() {
        let mock = MockProvider::new();
        classifier(&mock).classify("hi").await;
        classifier(&mock).classify("total pnl").await;
        assert_eq!(mock.call_count().await, 0);
    }

    #[tokio::test]
    async fn needs_data_asks_the_model_when_ambiguous() {
        let mock = MockProvider::with_responses(vec!["no.", "Yes"]);
        let c = classifier(&mock);
        assert!(!c.needs_data("tell me about my AAPL positions").await);
        assert!(c.needs_data("tell me about my AAPL positions").await);

        let prompt = &mock.requests().await[0].messages[1].content;
        assert!(prompt.contains("Message: \"tell me about my AAPL positions\""));
    }

    #[tokio::test]
    async fn needs_data_defaults_to_yes_on_failure() {
        let mock = MockProvider::with_replies(vec![MockReply::server_error()]);
        assert!(classifier(&mock).needs_data("tell me about my AAPL positions").await);
    }
}
