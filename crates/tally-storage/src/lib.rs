// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Tally trading journal.
//!
//! Provides WAL-mode SQLite storage with embedded refinery migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed queries
//! for user profiles, trades, strategies, chat history and AI usage logs.

pub mod adapter;
pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::{Database, map_tr_err, now_timestamp};
pub use models::*;
