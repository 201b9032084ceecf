// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single entry point for text generation.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tally_config::model::TallyConfig;
use tally_core::{
    ChatMessage, ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, ProviderKind,
    TallyError,
};
use tracing::{debug, info, warn};

use crate::gemini::GeminiClient;
use crate::openai::OpenAiCompatClient;
use crate::retry::RetryPolicy;

/// Routes completion requests to the provider they name.
///
/// Providers without an API key are left out; a request naming one fails
/// with [`TallyError::Config`] instead of reaching the network.
#[derive(Debug, Clone)]
pub struct LlmGateway {
    openai: Option<OpenAiCompatClient>,
    perplexity: Option<OpenAiCompatClient>,
    gemini: Option<GeminiClient>,
    retry: RetryPolicy,
    default_provider: ProviderKind,
    default_model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmGateway {
    /// Builds clients for every provider with a key. The default provider
    /// from `[llm]` must be among them.
    pub fn from_config(config: &TallyConfig) -> Result<Self, TallyError> {
        let timeout = Duration::from_secs(config.llm.timeout_secs);
        let key = |kind: ProviderKind| {
            config
                .provider(kind)
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
        };

        let openai = key(ProviderKind::OpenAi)
            .map(|k| {
                OpenAiCompatClient::new(ProviderKind::OpenAi, k, &config.openai.base_url, timeout)
            })
            .transpose()?;
        let perplexity = key(ProviderKind::Perplexity)
            .map(|k| {
                OpenAiCompatClient::new(
                    ProviderKind::Perplexity,
                    k,
                    &config.perplexity.base_url,
                    timeout,
                )
            })
            .transpose()?;
        let gemini = key(ProviderKind::Gemini)
            .map(|k| GeminiClient::new(k, &config.gemini.base_url, timeout))
            .transpose()?;

        let gateway = Self {
            openai,
            perplexity,
            gemini,
            retry: RetryPolicy::from_config(&config.llm),
            default_provider: config.llm.provider,
            default_model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        };

        if !gateway.is_configured(config.llm.provider) {
            return Err(not_configured(config.llm.provider));
        }
        info!(
            provider = %gateway.default_provider,
            model = %gateway.default_model,
            "llm gateway ready"
        );
        Ok(gateway)
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::OpenAi => self.openai.is_some(),
            ProviderKind::Perplexity => self.perplexity.is_some(),
            ProviderKind::Gemini => self.gemini.is_some(),
        }
    }

    /// A request for the configured default provider and model.
    pub fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            messages,
            model: self.default_model.clone(),
            provider: self.default_provider,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: None,
        }
    }

    async fn complete_once(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TallyError> {
        match request.provider {
            ProviderKind::OpenAi => self.compat(&self.openai, request.provider)?.complete(request).await,
            ProviderKind::Perplexity => {
                self.compat(&self.perplexity, request.provider)?
                    .complete(request)
                    .await
            }
            ProviderKind::Gemini => self.gemini_client()?.complete(request).await,
        }
    }

    fn compat<'a>(
        &self,
        client: &'a Option<OpenAiCompatClient>,
        kind: ProviderKind,
    ) -> Result<&'a OpenAiCompatClient, TallyError> {
        client.as_ref().ok_or_else(|| not_configured(kind))
    }

    fn gemini_client(&self) -> Result<&GeminiClient, TallyError> {
        self.gemini
            .as_ref()
            .ok_or_else(|| not_configured(ProviderKind::Gemini))
    }
}

fn not_configured(kind: ProviderKind) -> TallyError {
    TallyError::Config(format!(
        "provider '{kind}' has no API key (set TALLY_{}_API_KEY)",
        kind.to_string().to_uppercase()
    ))
}

#[async_trait]
impl LlmProvider for LlmGateway {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, TallyError> {
        if request.messages.is_empty() {
            return Err(TallyError::InvalidInput(
                "completion request has no messages".into(),
            ));
        }

        let started = Instant::now();
        let label = request.provider.to_string();
        let result = self
            .retry
            .run(&label, || self.complete_once(&request))
            .await;

        match &result {
            Ok(response) => debug!(
                provider = %response.provider,
                model = %response.model,
                total_tokens = response.usage.total_tokens,
                latency_ms = started.elapsed().as_millis() as u64,
                "completion finished"
            ),
            Err(e) => warn!(provider = %label, error = %e, "completion failed"),
        }
        result
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, TallyError> {
        if request.messages.is_empty() {
            return Err(TallyError::InvalidInput(
                "completion request has no messages".into(),
            ));
        }
        match request.provider {
            ProviderKind::OpenAi => self.compat(&self.openai, request.provider)?.stream(&request).await,
            ProviderKind::Perplexity => {
                self.compat(&self.perplexity, request.provider)?
                    .stream(&request)
                    .await
            }
            ProviderKind::Gemini => self.gemini_client()?.stream(&request).await,
        }
    }
}
