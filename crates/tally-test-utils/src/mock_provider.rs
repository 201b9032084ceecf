// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider for deterministic testing.
//!
//! Replies are popped from a FIFO queue. When the queue is empty the
//! provider answers "mock response". Every request is recorded so tests can
//! assert on prompts and call counts.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tally_core::{
    ChunkStream, CompletionRequest, CompletionResponse, LlmProvider, StreamChunk, TallyError,
    TokenUsage,
};
use tokio::sync::Mutex;

/// One scripted outcome.
#[derive(Debug)]
pub enum MockReply {
    Text(String),
    Fail(TallyError),
}

impl MockReply {
    pub fn text(s: impl Into<String>) -> Self {
        MockReply::Text(s.into())
    }

    /// A 503 from the provider.
    pub fn server_error() -> Self {
        MockReply::Fail(TallyError::provider("service unavailable", Some(503)))
    }
}

const MOCK_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
    total_tokens: 30,
};

#[derive(Clone, Default)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            requests: Arc::default(),
        }
    }

    /// Shorthand for a queue of text replies.
    pub fn with_responses<S: Into<String>>(responses: Vec<S>) -> Self {
        Self::with_replies(responses.into_iter().map(MockReply::text).collect())
    }

    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Every request seen so far, oldest first.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next(&self, request: CompletionRequest) -> MockReply {
        self.requests.lock().await.push(request);
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockReply::text("mock response"))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, TallyError> {
        let model = request.model.clone();
        let provider = request.provider;
        match self.next(request).await {
            MockReply::Text(content) => Ok(CompletionResponse {
                content,
                usage: MOCK_USAGE,
                model,
                provider,
            }),
            MockReply::Fail(e) => Err(e),
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, TallyError> {
        match self.next(request).await {
            MockReply::Text(text) => Ok(Box::pin(stream::iter(vec![
                Ok(StreamChunk::Delta(text)),
                Ok(StreamChunk::Done {
                    usage: Some(MOCK_USAGE),
                }),
            ]))),
            MockReply::Fail(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use tally_core::{ChatMessage, ProviderKind};

    use super::*;

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest {
            messages: vec![ChatMessage::user(text)],
            model: "test-model".into(),
            provider: ProviderKind::OpenAi,
            temperature: 0.0,
            max_tokens: 100,
            response_format: None,
        }
    }

    #[tokio::test]
    async fn default_response_when_queue_empty() {
        let provider = MockProvider::new();
        let resp = provider.complete(request("hi")).await.unwrap();
        assert_eq!(resp.content, "mock response");
        assert_eq!(resp.model, "test-model");
    }

    #[tokio::test]
    async fn scripted_replies_in_order_and_requests_recorded() {
        let provider = MockProvider::with_replies(vec![
            MockReply::text("first"),
            MockReply::server_error(),
        ]);
        assert_eq!(provider.complete(request("a")).await.unwrap().content, "first");
        let err = provider.complete(request("b")).await.unwrap_err();
        assert!(err.is_retryable());

        let seen = provider.requests().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].messages[0].content, "b");
    }

    #[tokio::test]
    async fn stream_ends_with_done() {
        let provider = MockProvider::with_responses(vec!["streamed"]);
        let chunks: Vec<_> = provider
            .stream(request("x"))
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(matches!(chunks[1], Ok(StreamChunk::Done { .. })));
    }
}
