// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-backed chat: daily quota, history, persistence around one
//! pipeline turn.

use std::sync::Arc;

use tally_core::{ChatMessage, Role, SessionId, StorageAdapter, TallyError, UserProfile};
use tally_quota::QuotaManager;
use tracing::{debug, info, warn};

use crate::pipeline::{ChatAnswer, ChatPipeline};

/// Characters of the first message kept as a new session's topic.
const TOPIC_CHARS: usize = 60;

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub session_id: SessionId,
    pub answer: ChatAnswer,
}

pub struct Conversation {
    pipeline: ChatPipeline,
    quota: QuotaManager,
    storage: Arc<dyn StorageAdapter>,
    recent_context_limit: usize,
}

impl Conversation {
    pub fn new(
        pipeline: ChatPipeline,
        quota: QuotaManager,
        storage: Arc<dyn StorageAdapter>,
        recent_context_limit: usize,
    ) -> Self {
        Self {
            pipeline,
            quota,
            storage,
            recent_context_limit,
        }
    }

    /// Send `message` in `session_id`, or in a new session when `None`.
    ///
    /// The daily chat counter is only bumped once the answer is stored.
    pub async fn send(
        &self,
        profile: &UserProfile,
        session_id: Option<SessionId>,
        message: &str,
    ) -> Result<ChatTurn, TallyError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(TallyError::InvalidInput("message must not be empty".into()));
        }
        self.quota.check_daily_chat(profile).await?;

        let session_id = match session_id {
            Some(id) => {
                let session = self
                    .storage
                    .get_session(&id)
                    .await?
                    .filter(|s| s.user_id == profile.id)
                    .ok_or_else(|| TallyError::InvalidInput(format!("unknown session {id}")))?;
                session.id
            }
            None => {
                let topic: String = message.chars().take(TOPIC_CHARS).collect();
                let session = self.storage.create_session(profile.id, Some(topic)).await?;
                info!(user_id = %profile.id, session_id = %session.id, "session created");
                session.id
            }
        };

        let history: Vec<ChatMessage> = self
            .storage
            .recent_messages(&session_id, self.recent_context_limit)
            .await?
            .iter()
            .map(ChatMessage::from)
            .collect();
        debug!(session_id = %session_id, history = history.len(), "history loaded");

        let answer = self.pipeline.process(profile, message, &history).await?;

        self.storage
            .insert_message(&session_id, Role::User, message)
            .await?;
        self.storage
            .insert_message(&session_id, Role::Assistant, &answer.text)
            .await?;

        if let Err(e) = self.quota.increment_daily_chat(profile.id).await {
            warn!(user_id = %profile.id, error = %e, "failed to bump daily chat count");
        }

        Ok(ChatTurn { session_id, answer })
    }
}
