// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat turns against the real gateway, with the provider mocked over HTTP.

use std::sync::Arc;

use serde_json::json;
use tally_chat::{ChatPipeline, Conversation, FALLBACK_ANSWER, Intent};
use tally_config::model::TallyConfig;
use tally_core::{PlanTier, StorageAdapter};
use tally_llm::LlmGateway;
use tally_storage::SqliteStorage;
use tally_test_utils::TestEnv;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "model": "gpt-4.1-mini",
        "choices": [{"message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 50, "completion_tokens": 10, "total_tokens": 60}
    }))
}

async fn env_for(server: &MockServer) -> TestEnv {
    let mut config = TallyConfig::default();
    config.openai.api_key = Some("sk-test".into());
    config.openai.base_url = server.uri();
    config.llm.max_attempts = 2;
    config.llm.retry_base_delay_ms = 1;
    config.llm.retry_max_delay_ms = 5;
    TestEnv::with_config(config, PlanTier::Pro).await.unwrap()
}

fn pipeline(env: &TestEnv) -> ChatPipeline {
    let gateway = LlmGateway::from_config(&env.config).unwrap();
    ChatPipeline::new(Arc::new(gateway), env.quota.clone(), &env.config)
}

#[tokio::test]
async fn data_question_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("RAW SQL only"))
        .respond_with(completion(
            "```sql\nSELECT symbol, COUNT(*) AS n FROM trades WHERE user_id = $1 GROUP BY symbol\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Trading Analyst"))
        .respond_with(completion("You traded AAPL twice."))
        .expect(1)
        .mount(&server)
        .await;

    let env = env_for(&server).await;
    env.add_closed_trade("AAPL", "LONG", 100.0, 104.0, "2026-02-02T15:00:00.000Z")
        .await
        .unwrap();
    env.add_closed_trade("AAPL", "LONG", 100.0, 98.0, "2026-02-03T15:00:00.000Z")
        .await
        .unwrap();

    let answer = pipeline(&env)
        .process(&env.user, "How many trades did I take per symbol?", &[])
        .await
        .unwrap();

    assert_eq!(answer.intent, Intent::DataQuery);
    assert_eq!(answer.text, "You traded AAPL twice.");
    let data = answer.context.data();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0]["n"], json!(2));
    assert_eq!(answer.context.meta().unwrap().insufficient_data, Some(false));
    assert!(env.tokens_used().await.unwrap() > 0);
}

#[tokio::test]
async fn provider_outage_returns_fallback_and_refunds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let env = env_for(&server).await;
    env.set_tokens_used(1_234).await.unwrap();

    let answer = pipeline(&env)
        .process(&env.user, "What's my pnl this month?", &[])
        .await
        .unwrap();

    assert_eq!(answer.text, FALLBACK_ANSWER);
    assert!(answer.context.data().is_empty());
    assert_eq!(env.tokens_used().await.unwrap(), 1_234);
}

#[tokio::test]
async fn conversation_persists_both_sides() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(completion("Hello! How can I help with your journal?"))
        .mount(&server)
        .await;

    let env = env_for(&server).await;
    let storage = Arc::new(SqliteStorage::new(env.db.clone()));
    let conversation = Conversation::new(
        pipeline(&env),
        env.quota.clone(),
        storage.clone(),
        env.config.chat.recent_context_limit,
    );

    let turn = conversation.send(&env.user, None, "hi").await.unwrap();
    assert_eq!(turn.answer.intent, Intent::General);

    let stored = storage.recent_messages(&turn.session_id, 10).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].content, "Hello! How can I help with your journal?");
}
