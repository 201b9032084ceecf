// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parsers for streaming completions.
//!
//! Both parsers turn a reqwest byte stream into [`StreamChunk`]s using
//! `eventsource-stream`. Every stream ends with exactly one
//! [`StreamChunk::Done`], or stops right after the first error.

use eventsource_stream::Eventsource;
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use tally_core::{ChunkStream, StreamChunk, TallyError, TokenUsage};

use crate::wire::{ChatCompletionChunk, GenerateContentResponse};

/// Sentinel data payload closing an OpenAI-style stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Parse an OpenAI-compatible `chat/completions` stream.
pub fn parse_openai_stream(response: reqwest::Response) -> ChunkStream {
    let mut usage: Option<TokenUsage> = None;

    let mapped = response
        .bytes_stream()
        .eventsource()
        .filter_map(move |result| {
            let item = match result {
                Ok(event) if event.data.trim() == DONE_SENTINEL => {
                    Some(Ok(StreamChunk::Done { usage }))
                }
                Ok(event) => match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
                    Ok(chunk) => {
                        if let Some(u) = chunk.usage {
                            usage = Some(u.into());
                        }
                        let text: String = chunk
                            .choices
                            .iter()
                            .filter_map(|c| c.delta.content.as_deref())
                            .collect();
                        (!text.is_empty()).then_some(Ok(StreamChunk::Delta(text)))
                    }
                    Err(e) => Some(Err(TallyError::Provider {
                        message: format!("failed to parse stream chunk: {e}"),
                        status: None,
                        source: Some(Box::new(e)),
                    })),
                },
                Err(e) => Some(Err(stream_error(e))),
            };
            future::ready(item)
        });

    terminate_once(mapped)
}

/// Parse a Gemini `streamGenerateContent?alt=sse` stream.
///
/// Gemini has no sentinel; the chunk carrying a finish reason closes the
/// stream, and end-of-body closes it otherwise.
pub fn parse_gemini_stream(response: reqwest::Response) -> ChunkStream {
    let mapped = response
        .bytes_stream()
        .eventsource()
        .flat_map(|result| {
            let items: Vec<Result<StreamChunk, TallyError>> = match result {
                Ok(event) => match serde_json::from_str::<GenerateContentResponse>(&event.data) {
                    Ok(chunk) => {
                        let mut out = Vec::with_capacity(2);
                        let text = chunk.text();
                        if !text.is_empty() {
                            out.push(Ok(StreamChunk::Delta(text)));
                        }
                        if chunk.is_finished() {
                            out.push(Ok(StreamChunk::Done {
                                usage: chunk.usage_metadata.map(Into::into),
                            }));
                        }
                        out
                    }
                    Err(e) => vec![Err(TallyError::Provider {
                        message: format!("failed to parse stream chunk: {e}"),
                        status: None,
                        source: Some(Box::new(e)),
                    })],
                },
                Err(e) => vec![Err(stream_error(e))],
            };
            stream::iter(items)
        });

    terminate_once(mapped)
}

fn stream_error(e: impl std::fmt::Display) -> TallyError {
    TallyError::Network {
        message: format!("SSE stream error: {e}"),
        source: None,
    }
}

/// Append a `Done` for streams that end without one, and cut everything
/// after the first `Done` or error.
fn terminate_once<S>(inner: S) -> ChunkStream
where
    S: Stream<Item = Result<StreamChunk, TallyError>> + Send + 'static,
{
    let tail = stream::once(future::ready(Ok(StreamChunk::Done { usage: None })));
    let mut finished = false;
    let bounded = inner.chain(tail).take_while(move |item| {
        let keep = !finished;
        if matches!(item, Ok(StreamChunk::Done { .. }) | Err(_)) {
            finished = true;
        }
        future::ready(keep)
    });
    Box::pin(bounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(&server.uri()).await.unwrap()
    }

    async fn collect(stream: ChunkStream) -> Vec<Result<StreamChunk, TallyError>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn openai_deltas_then_done_with_usage() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Win \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"rate 60%\"}}]}\n\n",
            "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":4,\"total_tokens\":16}}\n\n",
            "data: [DONE]\n\n",
        );
        let items = collect(parse_openai_stream(mock_sse_response(sse).await)).await;
        let items: Vec<StreamChunk> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0], StreamChunk::Delta("Win ".into()));
        assert_eq!(items[1], StreamChunk::Delta("rate 60%".into()));
        match &items[2] {
            StreamChunk::Done { usage: Some(u) } => assert_eq!(u.total_tokens, 16),
            other => panic!("expected Done with usage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn openai_stream_without_sentinel_still_terminates() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n";
        let items = collect(parse_openai_stream(mock_sse_response(sse).await)).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Ok(StreamChunk::Done { usage: None })));
    }

    #[tokio::test]
    async fn malformed_chunk_ends_stream_with_error() {
        let sse = "data: {not json\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n";
        let items = collect(parse_openai_stream(mock_sse_response(sse).await)).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TallyError::Provider { .. })));
    }

    #[tokio::test]
    async fn gemini_finish_reason_closes_stream() {
        let sse = concat!(
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"You \"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"lost\"}]},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":5,\"candidatesTokenCount\":2,\"totalTokenCount\":7}}\n\n",
        );
        let items = collect(parse_gemini_stream(mock_sse_response(sse).await)).await;
        let items: Vec<StreamChunk> = items.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            items,
            vec![
                StreamChunk::Delta("You ".into()),
                StreamChunk::Delta("lost".into()),
                StreamChunk::Done {
                    usage: Some(TokenUsage {
                        input_tokens: 5,
                        output_tokens: 2,
                        total_tokens: 7
                    })
                },
            ]
        );
    }
}
