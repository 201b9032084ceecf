// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for Tally.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so unrecognized keys are
//! rejected at startup with a suggestion instead of being silently ignored.

use serde::{Deserialize, Serialize};
use tally_core::{PlanTier, ProviderKind};

/// Top-level Tally configuration.
///
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TallyConfig {
    /// Application identity and logging.
    #[serde(default)]
    pub app: AppConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gateway defaults shared by all providers.
    #[serde(default)]
    pub llm: LlmConfig,

    /// OpenAI credentials and endpoint.
    #[serde(default = "default_openai")]
    pub openai: ProviderConfig,

    /// Perplexity credentials and endpoint.
    #[serde(default = "default_perplexity")]
    pub perplexity: ProviderConfig,

    /// Gemini credentials and endpoint.
    #[serde(default = "default_gemini")]
    pub gemini: ProviderConfig,

    /// Chat pipeline bounds.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Guarded SQL execution limits.
    #[serde(default)]
    pub sql: SqlConfig,

    /// Quota ledger settings.
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Per-plan limits and feature gates.
    #[serde(default)]
    pub plans: PlansConfig,
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            storage: StorageConfig::default(),
            llm: LlmConfig::default(),
            openai: default_openai(),
            perplexity: default_perplexity(),
            gemini: default_gemini(),
            chat: ChatConfig::default(),
            sql: SqlConfig::default(),
            quota: QuotaConfig::default(),
            plans: PlansConfig::default(),
        }
    }
}

impl TallyConfig {
    /// Returns the endpoint settings for a provider.
    pub fn provider(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::OpenAi => &self.openai,
            ProviderKind::Perplexity => &self.perplexity,
            ProviderKind::Gemini => &self.gemini,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_app_name() -> String {
    "tally".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("tally").join("tally.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("tally.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Defaults applied to every gateway call.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-attempt request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts for non-streaming calls, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::Gemini
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    2000
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

/// Credentials and endpoint for one provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API key. `None` leaves the provider unconfigured.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL of the provider API.
    #[serde(default)]
    pub base_url: String,
}

fn default_openai() -> ProviderConfig {
    ProviderConfig {
        api_key: None,
        base_url: "https://api.openai.com/v1".to_string(),
    }
}

fn default_perplexity() -> ProviderConfig {
    ProviderConfig {
        api_key: None,
        base_url: "https://api.perplexity.ai".to_string(),
    }
}

fn default_gemini() -> ProviderConfig {
    ProviderConfig {
        api_key: None,
        base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
    }
}

/// Bounds on what the chat pipeline feeds to the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChatConfig {
    /// Number of most recent history messages included in synthesis.
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    /// Data rows serialized into the synthesis prompt.
    #[serde(default = "default_max_context_rows")]
    pub max_context_rows: usize,

    /// Hard character budget for the serialized context.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Expected output tokens per input token when reserving quota.
    #[serde(default = "default_output_ratio")]
    pub output_ratio: f64,

    /// Constant added to every reservation estimate.
    #[serde(default = "default_output_padding")]
    pub output_padding: u32,

    /// Messages of session history loaded per turn.
    #[serde(default = "default_recent_context_limit")]
    pub recent_context_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_turns: default_history_turns(),
            max_context_rows: default_max_context_rows(),
            max_context_chars: default_max_context_chars(),
            output_ratio: default_output_ratio(),
            output_padding: default_output_padding(),
            recent_context_limit: default_recent_context_limit(),
        }
    }
}

fn default_history_turns() -> usize {
    2
}

fn default_max_context_rows() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    30_000
}

fn default_output_ratio() -> f64 {
    1.0
}

fn default_output_padding() -> u32 {
    10
}

fn default_recent_context_limit() -> usize {
    10
}

/// Limits for guarded SQL execution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SqlConfig {
    /// Row cap appended to admitted queries without a LIMIT.
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Below this many rows the result is flagged `insufficient_data`.
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: usize,

    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            min_sample_size: default_min_sample_size(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }
}

fn default_max_rows() -> usize {
    30
}

fn default_min_sample_size() -> usize {
    2
}

fn default_statement_timeout_ms() -> u64 {
    3000
}

/// Quota ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Largest single reservation accepted, in estimated tokens.
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: i64,

    /// How long a cached profile is trusted.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Plan assumed when a stored plan string is not recognized.
    #[serde(default = "default_plan")]
    pub default_plan: String,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_request: default_max_tokens_per_request(),
            cache_ttl_secs: default_cache_ttl_secs(),
            default_plan: default_plan(),
        }
    }
}

fn default_max_tokens_per_request() -> i64 {
    20_000
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_plan() -> String {
    "FREE".to_string()
}

/// Limits for each plan tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlansConfig {
    #[serde(default = "PlanLimits::free")]
    pub free: PlanLimits,

    #[serde(default = "PlanLimits::pro")]
    pub pro: PlanLimits,

    #[serde(default = "PlanLimits::premium")]
    pub premium: PlanLimits,
}

impl Default for PlansConfig {
    fn default() -> Self {
        Self {
            free: PlanLimits::free(),
            pro: PlanLimits::pro(),
            premium: PlanLimits::premium(),
        }
    }
}

impl PlansConfig {
    pub fn limits(&self, tier: PlanTier) -> &PlanLimits {
        match tier {
            PlanTier::Free => &self.free,
            PlanTier::Pro => &self.pro,
            PlanTier::Premium => &self.premium,
        }
    }
}

/// Numeric limits and feature gates of one plan.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PlanLimits {
    #[serde(default)]
    pub max_strategies: i64,

    #[serde(default)]
    pub max_total_trades: i64,

    #[serde(default)]
    pub daily_chat_msgs: i64,

    #[serde(default)]
    pub monthly_csv_imports: i64,

    /// Monthly AI token allowance; absent means unlimited.
    #[serde(default)]
    pub monthly_ai_tokens_limit: Option<i64>,

    #[serde(default)]
    pub allow_web_search: bool,

    #[serde(default)]
    pub allow_broker_sync: bool,

    #[serde(default)]
    pub allow_csv_export: bool,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::free()
    }
}

impl PlanLimits {
    pub fn free() -> Self {
        Self {
            max_strategies: 1,
            max_total_trades: 50,
            daily_chat_msgs: 10,
            monthly_csv_imports: 1,
            monthly_ai_tokens_limit: Some(50_000),
            allow_web_search: false,
            allow_broker_sync: false,
            allow_csv_export: false,
        }
    }

    pub fn pro() -> Self {
        Self {
            max_strategies: 50,
            max_total_trades: 100_000,
            daily_chat_msgs: 500,
            monthly_csv_imports: 100,
            monthly_ai_tokens_limit: Some(2_000_000),
            allow_web_search: true,
            allow_broker_sync: true,
            allow_csv_export: true,
        }
    }

    pub fn premium() -> Self {
        Self {
            max_strategies: 1_000,
            max_total_trades: 1_000_000,
            daily_chat_msgs: 1_000_000,
            monthly_csv_imports: 1_000_000,
            monthly_ai_tokens_limit: None,
            allow_web_search: true,
            allow_broker_sync: true,
            allow_csv_export: true,
        }
    }
}
