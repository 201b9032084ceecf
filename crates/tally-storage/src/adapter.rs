// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the `StorageAdapter` trait.

use async_trait::async_trait;
use tally_core::{Role, Session, SessionId, StorageAdapter, StoredMessage, TallyError, UserId};

use crate::database::Database;
use crate::queries;

/// SQLite-backed conversation storage.
///
/// Cheap to clone; clones share the database's writer thread.
#[derive(Clone)]
pub struct SqliteStorage {
    db: Database,
}

impl SqliteStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn create_session(
        &self,
        user_id: UserId,
        topic: Option<String>,
    ) -> Result<Session, TallyError> {
        queries::sessions::create_session(&self.db, user_id, topic).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, TallyError> {
        queries::sessions::get_session(&self.db, id).await
    }

    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<Session>, TallyError> {
        queries::sessions::list_sessions(&self.db, user_id).await
    }

    async fn insert_message(
        &self,
        session_id: &SessionId,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, TallyError> {
        queries::messages::insert_message(&self.db, session_id, role, content).await
    }

    async fn recent_messages(
        &self,
        session_id: &SessionId,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, TallyError> {
        queries::messages::recent_messages(&self.db, session_id, limit).await
    }
}
