// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage trait for conversation persistence.

use async_trait::async_trait;

use crate::error::TallyError;
use crate::types::{Role, Session, SessionId, StoredMessage, UserId};

/// Persistence of chat sessions and their ordered messages.
///
/// The chat core only needs recent history as input and appends the
/// synthesized answer afterwards; everything else about the store is the
/// adapter's business.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Creates a session owned by `user_id`.
    async fn create_session(
        &self,
        user_id: UserId,
        topic: Option<String>,
    ) -> Result<Session, TallyError>;

    /// Looks up a session by id.
    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, TallyError>;

    /// Lists a user's sessions, most recently updated first.
    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, TallyError>;

    /// Appends a message to a session and bumps the session's `updated_at`.
    async fn insert_message(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, TallyError>;

    /// Returns the last `limit` messages of a session in chronological order.
    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, TallyError>;
}
