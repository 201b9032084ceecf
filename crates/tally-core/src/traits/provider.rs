// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider trait for text-generation backends.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::TallyError;
use crate::types::{CompletionRequest, CompletionResponse, StreamChunk};

/// Stream of incremental completion chunks, terminated by [`StreamChunk::Done`].
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, TallyError>> + Send>>;

/// Uniform capability: send messages, get text plus token usage, optionally stream.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short name used in logs and usage records.
    fn name(&self) -> &str;

    /// Sends a completion request and returns the full response.
    async fn complete(&self, request: CompletionRequest)
    -> Result<CompletionResponse, TallyError>;

    /// Sends a completion request and returns a stream of response chunks.
    ///
    /// Streams are never retried: once partial output has been delivered a
    /// retry would duplicate it.
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream, TallyError>;
}
