// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for OpenAI-compatible chat completion APIs.
//!
//! OpenAI and Perplexity share the wire format; they differ only in base
//! URL, model naming, and which optional request fields they accept.

use std::time::Duration;

use tally_core::{
    ChunkStream, CompletionRequest, CompletionResponse, ProviderKind, ResponseFormat, TallyError,
};
use tracing::debug;

use crate::http::{build_client, post_json, read_json};
use crate::sse;
use crate::wire::{
    ChatCompletionRequest, ChatCompletionResponse, StreamOptions, WireMessage, WireResponseFormat,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

/// Model used on Perplexity when the requested one is not a sonar model.
pub const PERPLEXITY_FALLBACK_MODEL: &str = "sonar";

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    kind: ProviderKind,
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenAiCompatClient {
    /// Creates a client for `kind`, which must be OpenAI or Perplexity.
    pub fn new(
        kind: ProviderKind,
        api_key: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, TallyError> {
        let default_base = match kind {
            ProviderKind::OpenAi => OPENAI_BASE_URL,
            ProviderKind::Perplexity => PERPLEXITY_BASE_URL,
            ProviderKind::Gemini => {
                return Err(TallyError::Internal(
                    "gemini does not speak the chat completions protocol".into(),
                ));
            }
        };
        let base_url = if base_url.trim().is_empty() {
            default_base
        } else {
            base_url
        };

        Ok(Self {
            kind,
            client: build_client("authorization", &format!("Bearer {api_key}"), timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// The model actually sent upstream for a requested name.
    pub fn resolve_model(&self, requested: &str) -> String {
        match self.kind {
            ProviderKind::Perplexity if !requested.contains("sonar") => {
                PERPLEXITY_FALLBACK_MODEL.to_string()
            }
            _ => requested.to_string(),
        }
    }

    fn build_request(&self, request: &CompletionRequest, stream: bool) -> ChatCompletionRequest {
        // Perplexity rejects the json_object response format and stream_options.
        let is_openai = self.kind == ProviderKind::OpenAi;
        let response_format = match request.response_format {
            Some(ResponseFormat::JsonObject) if is_openai => Some(WireResponseFormat {
                type_: "json_object".into(),
            }),
            _ => None,
        };

        ChatCompletionRequest {
            model: self.resolve_model(&request.model),
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format,
            stream,
            stream_options: (stream && is_openai).then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// Sends one non-streaming request. Retries are the gateway's job.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TallyError> {
        let body = self.build_request(request, false);
        let name = self.kind.to_string();
        let response = post_json(&self.client, &self.endpoint(), &body, &name, self.timeout).await?;
        let parsed: ChatCompletionResponse = read_json(response, &name).await?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TallyError::provider(format!("{name} response had no content"), None))?;
        let usage = parsed.usage.map(Into::into).unwrap_or_default();
        debug!(provider = %name, model = %body.model, "completion parsed");

        Ok(CompletionResponse {
            content,
            usage,
            model: parsed.model.unwrap_or(body.model),
            provider: self.kind,
        })
    }

    /// Opens a streaming request.
    pub async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, TallyError> {
        let body = self.build_request(request, true);
        let name = self.kind.to_string();
        let response = post_json(&self.client, &self.endpoint(), &body, &name, self.timeout).await?;
        Ok(sse::parse_openai_stream(response))
    }
}
