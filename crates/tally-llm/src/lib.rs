// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM gateway for the Tally trading journal.
//!
//! One [`LlmGateway`] fronts every configured text-generation provider
//! behind the [`tally_core::LlmProvider`] trait. Non-streaming calls retry
//! transient failures with bounded exponential backoff; streaming calls
//! are never retried.

pub mod gateway;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod retry;
pub mod sse;
pub mod wire;

pub use gateway::LlmGateway;
pub use retry::RetryPolicy;
