// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota-guarded LLM calls: reserve, call, then commit and log or roll back.

use std::sync::Arc;
use std::time::Instant;

use tally_config::model::ChatConfig;
use tally_core::{CompletionRequest, CompletionResponse, LlmProvider, TallyError, UserProfile};
use tally_quota::estimate::output_tokens;
use tally_quota::{QuotaManager, UsageEntry, estimate_reservation};
use tracing::{debug, warn};

pub struct MeteredLlm {
    llm: Arc<dyn LlmProvider>,
    quota: QuotaManager,
    output_ratio: f64,
    output_padding: u32,
}

impl MeteredLlm {
    pub fn new(llm: Arc<dyn LlmProvider>, quota: QuotaManager, config: &ChatConfig) -> Self {
        Self {
            llm,
            quota,
            output_ratio: config.output_ratio,
            output_padding: config.output_padding,
        }
    }

    /// Run `request` against the user's monthly token budget.
    ///
    /// Quota denials are returned before the provider is called. A failed
    /// call returns its reservation (best effort) before the error is
    /// passed on. Usage logging failures are only logged.
    pub async fn complete(
        &self,
        profile: &UserProfile,
        request: CompletionRequest,
        purpose: &str,
    ) -> Result<CompletionResponse, TallyError> {
        let estimate =
            estimate_reservation(&request.messages, self.output_ratio, self.output_padding);
        let mut reservation = self
            .quota
            .reserve_ai_tokens(profile, estimate.estimated_total)
            .await?;
        let provider = request.provider;

        let started = Instant::now();
        match self.llm.complete(request).await {
            Ok(response) => {
                reservation.commit();
                let entry = UsageEntry {
                    user_id: profile.id,
                    model: response.model.clone(),
                    provider: provider.to_string(),
                    input_tokens: estimate.input_tokens,
                    output_tokens: output_tokens(&response.content),
                    latency_ms: started.elapsed().as_secs_f64() * 1000.0,
                    context: purpose.to_string(),
                };
                if let Err(e) = self.quota.log_usage(entry).await {
                    warn!(user_id = %profile.id, error = %e, "failed to record usage");
                }
                debug!(
                    user_id = %profile.id,
                    reserved = reservation.estimated_total,
                    purpose,
                    "metered call succeeded"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(user_id = %profile.id, error = %e, purpose, "metered call failed, rolling back");
                if let Err(rollback_err) = self.quota.rollback(reservation).await {
                    warn!(user_id = %profile.id, error = %rollback_err, "token rollback failed");
                }
                Err(e)
            }
        }
    }
}
