// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the Tally crates.
//!
//! Traits use `#[async_trait]` so they can be held as `Arc<dyn ...>`.

pub mod provider;
pub mod storage;

pub use provider::{ChunkStream, LlmProvider};
pub use storage::StorageAdapter;
