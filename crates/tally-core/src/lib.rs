// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tally trading journal.
//!
//! This crate provides the error taxonomy, the shared domain types and the
//! trait seams (LLM providers, conversation storage) used throughout the
//! Tally workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TallyError;
pub use types::{
    ChatMessage, CompletionRequest, CompletionResponse, PlanTier, ProviderKind, ResponseFormat,
    Role, Session, SessionId, StoredMessage, StreamChunk, TokenUsage, UserId, UserProfile,
};

pub use traits::{ChunkStream, LlmProvider, StorageAdapter};
