// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the Tally crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::TallyError;

/// Identifier of a journal user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(UserId)
            .map_err(|e| TallyError::InvalidInput(format!("invalid user id '{s}': {e}")))
    }
}

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author of a chat message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One `{role, content}` pair sent to a model or read from history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Text-generation backends the gateway knows how to reach.
///
/// Dispatch on this enum is always an exhaustive `match`, so adding a
/// provider forces every call site to handle it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    Perplexity,
    Gemini,
}

/// Requested shape of the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// A completion request routed through the LLM gateway.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub provider: ProviderKind,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: Option<ResponseFormat>,
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

/// A completed (non-streaming) model answer.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
    pub provider: ProviderKind,
}

/// One event from a streaming completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    /// Incremental text.
    Delta(String),
    /// Terminal sentinel; no chunks follow.
    Done { usage: Option<TokenUsage> },
}

/// Subscription level governing feature gates and usage limits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(ascii_case_insensitive)]
pub enum PlanTier {
    #[strum(to_string = "FREE")]
    Free,
    #[strum(to_string = "PRO")]
    Pro,
    #[strum(
        to_string = "PREMIUM",
        serialize = "FOUNDER",
        serialize = "LIFETIME",
        serialize = "LIFETIME_PRO"
    )]
    Premium,
}

impl PlanTier {
    /// Normalizes a stored plan string, folding legacy aliases into their tier.
    ///
    /// Returns `None` for unknown plans so callers can pick their own default.
    pub fn normalize(raw: &str) -> Option<Self> {
        PlanTier::from_str(raw.trim()).ok()
    }
}

/// A user's plan and usage counters as persisted in `user_profiles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub plan_tier: PlanTier,
    pub daily_chat_count: i64,
    pub last_chat_reset_at: Option<String>,
    pub monthly_import_count: i64,
    pub monthly_ai_tokens_used: i64,
    pub quota_reset_at: Option<String>,
}

/// A persisted chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub topic: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

impl From<&StoredMessage> for ChatMessage {
    fn from(msg: &StoredMessage) -> Self {
        ChatMessage {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_aliases_fold_into_premium() {
        assert_eq!(PlanTier::normalize("FOUNDER"), Some(PlanTier::Premium));
        assert_eq!(PlanTier::normalize("lifetime"), Some(PlanTier::Premium));
        assert_eq!(PlanTier::normalize("LIFETIME_PRO"), Some(PlanTier::Premium));
        assert_eq!(PlanTier::normalize(" pro "), Some(PlanTier::Pro));
        assert_eq!(PlanTier::normalize("free"), Some(PlanTier::Free));
        assert_eq!(PlanTier::normalize("enterprise"), None);
    }

    #[test]
    fn plan_tier_displays_canonical_name() {
        assert_eq!(PlanTier::Premium.to_string(), "PREMIUM");
        assert_eq!(PlanTier::Free.to_string(), "FREE");
        let json = serde_json::to_string(&PlanTier::Pro).unwrap();
        assert_eq!(json, "\"PRO\"");
    }

    #[test]
    fn provider_kind_parses_lowercase_names() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("Gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert_eq!(ProviderKind::Perplexity.to_string(), "perplexity");
        assert_eq!(ProviderKind::OpenAi.to_string(), "openai");
        assert!("anthropic".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn role_round_trips_through_strings() {
        for role in [Role::System, Role::User, Role::Assistant] {
            let parsed: Role = role.to_string().parse().unwrap();
            assert_eq!(parsed, role);
        }
        assert_eq!(
            serde_json::to_string(&ChatMessage::user("hi")).unwrap(),
            r#"{"role":"user","content":"hi"}"#
        );
    }

    #[test]
    fn user_id_parse_rejects_garbage() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!(matches!(
            "not-a-uuid".parse::<UserId>(),
            Err(TallyError::InvalidInput(_))
        ));
    }
}
