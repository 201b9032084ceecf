// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Tally integration tests.
//!
//! - [`MockProvider`] - scripted LLM replies and failures, with captured requests
//! - [`TestEnv`] - temp SQLite database, a seeded user, and a quota manager

pub mod env;
pub mod mock_provider;

pub use env::TestEnv;
pub use mock_provider::{MockProvider, MockReply};
