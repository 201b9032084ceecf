// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for the Gemini `generateContent` API.

use std::time::Duration;

use tally_core::{
    ChunkStream, CompletionRequest, CompletionResponse, ProviderKind, ResponseFormat, Role,
    TallyError,
};
use tracing::debug;

use crate::http::{build_client, post_json, read_json};
use crate::sse;
use crate::wire::{
    GeminiContent, GeminiPart, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when the request names another vendor's model.
pub const GEMINI_FALLBACK_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, TallyError> {
        let base_url = if base_url.trim().is_empty() {
            GEMINI_BASE_URL
        } else {
            base_url
        };
        Ok(Self {
            // Header auth keeps the key out of request URLs.
            client: build_client("x-goog-api-key", api_key, timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn resolve_model(requested: &str) -> &str {
        if requested.is_empty() || requested.contains("gpt") || requested.contains("sonar") {
            GEMINI_FALLBACK_MODEL
        } else {
            requested
        }
    }

    /// Maps chat roles onto Gemini contents.
    ///
    /// System messages become one `systemInstruction`; assistant turns use
    /// the `model` role.
    pub fn build_request(request: &CompletionRequest) -> GenerateContentRequest {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        let system_instruction = (!system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(system.join("\n\n")),
            }],
        });

        let contents = request
            .messages
            .iter()
            .filter_map(|m| {
                let role = match m.role {
                    Role::System => return None,
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                Some(GeminiContent {
                    role: Some(role.to_string()),
                    parts: vec![GeminiPart {
                        text: Some(m.content.clone()),
                    }],
                })
            })
            .collect();

        GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: match request.response_format {
                    Some(ResponseFormat::JsonObject) => Some("application/json".into()),
                    _ => None,
                },
            },
        }
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, TallyError> {
        let model = Self::resolve_model(&request.model);
        let url = format!("{}/models/{model}:generateContent", self.base_url);
        let body = Self::build_request(request);

        let response = post_json(&self.client, &url, &body, "gemini", self.timeout).await?;
        let parsed: GenerateContentResponse = read_json(response, "gemini").await?;
        if parsed.candidates.is_empty() {
            return Err(TallyError::provider(
                "gemini response had no candidates",
                None,
            ));
        }
        debug!(model, "gemini completion parsed");

        Ok(CompletionResponse {
            content: parsed.text(),
            usage: parsed.usage_metadata.map(Into::into).unwrap_or_default(),
            model: model.to_string(),
            provider: ProviderKind::Gemini,
        })
    }

    pub async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, TallyError> {
        let model = Self::resolve_model(&request.model);
        let url = format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        );
        let body = Self::build_request(request);
        let response = post_json(&self.client, &url, &body, "gemini", self.timeout).await?;
        Ok(sse::parse_gemini_stream(response))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tally_core::{ChatMessage, StreamChunk};
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            messages: vec![
                ChatMessage::system("You are a concise, factual Trading Analyst."),
                ChatMessage::user("What was my win rate?"),
                ChatMessage::assistant("62.5%"),
                ChatMessage::user("And last month?"),
            ],
            model: "gpt-4.1".into(),
            provider: ProviderKind::Gemini,
            temperature: 0.7,
            max_tokens: 1000,
            response_format: None,
        }
    }

    #[test]
    fn other_vendor_models_fall_back() {
        assert_eq!(GeminiClient::resolve_model("gpt-5"), GEMINI_FALLBACK_MODEL);
        assert_eq!(GeminiClient::resolve_model("sonar"), GEMINI_FALLBACK_MODEL);
        assert_eq!(GeminiClient::resolve_model("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[test]
    fn roles_map_to_gemini_contents() {
        let body = GeminiClient::build_request(&request());
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a concise, factual Trading Analyst."
        );
        assert!(json["systemInstruction"].get("role").is_none());
        let roles: Vec<&str> = json["contents"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["role"].as_str().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1000);
    }

    #[tokio::test]
    async fn complete_uses_header_key_and_fallback_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(header("x-goog-api-key", "AIza-test"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": {"temperature": 0.7}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "About 55%."}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 30, "candidatesTokenCount": 4, "totalTokenCount": 34}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new("AIza-test", &server.uri(), Duration::from_secs(5)).unwrap();
        let response = client.complete(&request()).await.unwrap();
        assert_eq!(response.content, "About 55%.");
        assert_eq!(response.usage.input_tokens, 30);
        assert_eq!(response.usage.total_tokens, 34);
        assert_eq!(response.model, GEMINI_FALLBACK_MODEL);
    }

    #[tokio::test]
    async fn blocked_prompt_without_candidates_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new("AIza-test", &server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn stream_hits_sse_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("alt", "sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(
                        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]},\"finishReason\":\"STOP\"}]}\n\n",
                    ),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new("AIza-test", &server.uri(), Duration::from_secs(5)).unwrap();
        let chunks: Vec<_> = client.stream(&request()).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap(), &StreamChunk::Delta("ok".into()));
        assert!(matches!(chunks[1], Ok(StreamChunk::Done { usage: None })));
    }
}
