// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The closed set of things a chat message can ask for.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Reporting window for the standard metrics lane.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(ascii_case_insensitive)]
pub enum Period {
    #[default]
    #[strum(serialize = "ALL_TIME")]
    #[serde(rename = "ALL_TIME")]
    AllTime,
    #[strum(serialize = "LAST_7_DAYS")]
    #[serde(rename = "LAST_7_DAYS")]
    Last7Days,
    #[strum(serialize = "THIS_MONTH")]
    #[serde(rename = "THIS_MONTH")]
    ThisMonth,
    #[strum(serialize = "LAST_30_DAYS")]
    #[serde(rename = "LAST_30_DAYS")]
    Last30Days,
}

impl Period {
    /// Unknown or missing values mean all time.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.trim().parse().unwrap_or_default()
    }

    /// SQLite predicate on `entry_time` selecting this window.
    pub(crate) fn entry_time_predicate(self) -> &'static str {
        match self {
            Period::AllTime => "1 = 1",
            Period::Last7Days => "entry_time >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-7 days')",
            Period::ThisMonth => "entry_time >= strftime('%Y-%m-01T00:00:00.000Z', 'now')",
            Period::Last30Days => {
                "entry_time >= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-30 days')"
            }
        }
    }
}

/// What the user wants from one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Headline numbers over a window: count, net and average PnL, win rate.
    StandardMetrics { period: Period },
    /// Anything needing a custom query over trades or strategies.
    DataQuery,
    /// Advice or explanation that needs no data.
    ReasoningOnly,
    General,
}

impl Intent {
    /// Wire name used in classifier output and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Intent::StandardMetrics { .. } => "STANDARD_METRICS",
            Intent::DataQuery => "DATA_QUERY",
            Intent::ReasoningOnly => "REASONING_ONLY",
            Intent::General => "GENERAL",
        }
    }

    /// Read a `{"type": ..., "args": {...}}` object. `None` for unknown types.
    pub fn from_json(value: &Value) -> Option<Self> {
        let kind = value.get("type")?.as_str()?.trim().to_ascii_uppercase();
        match kind.as_str() {
            "STANDARD_METRICS" => {
                let period = value
                    .get("args")
                    .and_then(|args| args.get("period"))
                    .and_then(Value::as_str)
                    .map(Period::parse_lenient)
                    .unwrap_or_default();
                Some(Intent::StandardMetrics { period })
            }
            "DATA_QUERY" => Some(Intent::DataQuery),
            "REASONING_ONLY" => Some(Intent::ReasoningOnly),
            "GENERAL" => Some(Intent::General),
            _ => None,
        }
    }

    /// Whether serving this intent reads the user's trades.
    pub fn touches_data(&self) -> bool {
        matches!(self, Intent::StandardMetrics { .. } | Intent::DataQuery)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::StandardMetrics { period } => write!(f, "STANDARD_METRICS({period})"),
            other => f.write_str(other.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn period_parsing_is_lenient() {
        assert_eq!(Period::parse_lenient("this_month"), Period::ThisMonth);
        assert_eq!(Period::parse_lenient(" LAST_7_DAYS "), Period::Last7Days);
        assert_eq!(Period::parse_lenient("FOREVER"), Period::AllTime);
        assert_eq!(Period::parse_lenient(""), Period::AllTime);
        assert_eq!(Period::Last30Days.to_string(), "LAST_30_DAYS");
        assert_eq!(
            serde_json::to_value(Period::Last7Days).unwrap(),
            json!("LAST_7_DAYS")
        );
    }

    #[test]
    fn intent_from_classifier_json() {
        let v = json!({"type": "standard_metrics", "args": {"period": "LAST_30_DAYS"}});
        assert_eq!(
            Intent::from_json(&v),
            Some(Intent::StandardMetrics {
                period: Period::Last30Days
            })
        );
        let v = json!({"type": "STANDARD_METRICS"});
        assert_eq!(
            Intent::from_json(&v),
            Some(Intent::StandardMetrics {
                period: Period::AllTime
            })
        );
        assert_eq!(
            Intent::from_json(&json!({"type": "DATA_QUERY", "args": {}})),
            Some(Intent::DataQuery)
        );
        assert_eq!(Intent::from_json(&json!({"type": "SMALL_TALK"})), None);
        assert_eq!(Intent::from_json(&json!({"kind": "GENERAL"})), None);
        assert_eq!(Intent::from_json(&json!({"type": 3})), None);
    }

    #[test]
    fn only_metric_and_query_intents_touch_data() {
        assert!(Intent::DataQuery.touches_data());
        assert!(!Intent::General.touches_data());
        assert_eq!(
            Intent::StandardMetrics {
                period: Period::ThisMonth
            }
            .to_string(),
            "STANDARD_METRICS(THIS_MONTH)"
        );
    }
}
