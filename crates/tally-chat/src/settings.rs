// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model selection shared by every chat-side LLM call.

use tally_config::model::LlmConfig;
use tally_core::{ChatMessage, CompletionRequest, ProviderKind, ResponseFormat};

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ModelSettings {
    pub fn from_config(config: &LlmConfig) -> Self {
        Self {
            provider: config.provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// A free-text request at the configured temperature.
    pub fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: self.model.clone(),
            provider: self.provider,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: None,
        }
    }

    /// Deterministic request for routing decisions and SQL generation.
    pub fn deterministic(
        &self,
        messages: Vec<ChatMessage>,
        format: Option<ResponseFormat>,
    ) -> CompletionRequest {
        CompletionRequest {
            temperature: 0.0,
            response_format: format,
            ..self.request(messages)
        }
    }
}
