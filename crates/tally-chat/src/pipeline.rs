// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One chat turn: classify, gather context, synthesize.

use std::sync::Arc;

use tally_config::model::{ChatConfig, TallyConfig};
use tally_core::{ChatMessage, LlmProvider, TallyError, UserProfile};
use tally_quota::QuotaManager;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classifier::IntentClassifier;
use crate::context::QueryContext;
use crate::intent::Intent;
use crate::metered::MeteredLlm;
use crate::settings::ModelSettings;
use crate::sql_gen::{SqlGenerator, is_no_sql};
use crate::sql_guard::SqlGuard;
use crate::synthesis::{FALLBACK_ANSWER, build_messages};
use crate::tools::QueryTools;

/// Result of one turn.
#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub text: String,
    pub intent: Intent,
    pub context: QueryContext,
}

pub struct ChatPipeline {
    classifier: IntentClassifier,
    sql_gen: SqlGenerator,
    guard: SqlGuard,
    tools: QueryTools,
    metered: MeteredLlm,
    quota: QuotaManager,
    settings: ModelSettings,
    chat: ChatConfig,
    max_request_tokens: i64,
}

impl ChatPipeline {
    pub fn new(llm: Arc<dyn LlmProvider>, quota: QuotaManager, config: &TallyConfig) -> Self {
        let settings = ModelSettings::from_config(&config.llm);
        Self {
            classifier: IntentClassifier::new(llm.clone(), settings.clone()),
            sql_gen: SqlGenerator::new(llm.clone(), settings.clone()),
            guard: SqlGuard::from_config(&config.sql),
            tools: QueryTools::new(quota.database().clone(), &config.sql),
            metered: MeteredLlm::new(llm, quota.clone(), &config.chat),
            quota,
            settings,
            chat: config.chat.clone(),
            max_request_tokens: config.quota.max_tokens_per_request,
        }
    }

    /// Answer `message` for `profile`.
    ///
    /// Only quota denials (and an exhausted budget found up front) are
    /// errors. Every other failure is folded into the context or the
    /// fallback answer.
    pub async fn process(
        &self,
        profile: &UserProfile,
        message: &str,
        history: &[ChatMessage],
    ) -> Result<ChatAnswer, TallyError> {
        self.quota.check_ai_tokens(profile)?;

        let request_id = Uuid::new_v4();
        let intent = self.classifier.classify(message).await;
        info!(
            %request_id,
            user_id = %profile.id,
            intent = intent.kind(),
            touches_data = intent.touches_data(),
            "chat turn classified"
        );

        let context = match self.build_context(profile, message, intent, request_id).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(%request_id, error = %e, "context dispatch failed");
                QueryContext::error("Internal processing error.")
            }
        };

        let messages = build_messages(
            &context,
            history,
            message,
            &self.chat,
            self.max_request_tokens,
        );
        let request = self.settings.request(messages);
        let text = match self.metered.complete(profile, request, "chat_synthesis").await {
            Ok(resp) if !resp.content.trim().is_empty() => resp.content,
            Ok(_) => {
                warn!(%request_id, "empty synthesis response");
                FALLBACK_ANSWER.to_string()
            }
            Err(e) if e.is_quota_denial() => return Err(e),
            Err(e) => {
                warn!(%request_id, error = %e, "synthesis failed");
                FALLBACK_ANSWER.to_string()
            }
        };

        Ok(ChatAnswer {
            text,
            intent,
            context,
        })
    }

    async fn build_context(
        &self,
        profile: &UserProfile,
        message: &str,
        intent: Intent,
        request_id: Uuid,
    ) -> Result<QueryContext, TallyError> {
        match intent {
            Intent::StandardMetrics { period } => {
                self.tools.standard_metrics(profile.id, period).await
            }
            Intent::DataQuery => Ok(self.data_query(profile, message, request_id).await),
            Intent::ReasoningOnly => Ok(QueryContext::info("Reasoning-only response.")),
            Intent::General => Ok(QueryContext::info("General conversation.")),
        }
    }

    async fn data_query(
        &self,
        profile: &UserProfile,
        message: &str,
        request_id: Uuid,
    ) -> QueryContext {
        if !self.classifier.needs_data(message).await {
            debug!(%request_id, "data query answered without the database");
            return QueryContext::info("No database query required.");
        }

        let sql = self.sql_gen.generate(message).await;
        if is_no_sql(&sql) {
            return QueryContext::error("Failed to generate SQL.");
        }

        match self.guard.admit(&sql) {
            Ok(admitted) => {
                debug!(%request_id, limit_appended = admitted.limit_appended(), "generated SQL admitted");
                self.tools.execute_secure_sql(profile.id, &admitted).await
            }
            Err(rejection) => {
                warn!(%request_id, user_id = %profile.id, reason = %rejection, "generated SQL rejected");
                QueryContext::error(format!("Generated SQL failed safety checks: {rejection}."))
            }
        }
    }
}
