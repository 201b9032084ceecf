// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand implementations.

use std::sync::Arc;

use serde_json::json;
use tally_chat::{ChatPipeline, Conversation, SqlGuard};
use tally_config::model::TallyConfig;
use tally_core::{SessionId, TallyError, UserId};
use tally_llm::LlmGateway;
use tally_quota::{QuotaManager, UsageCounter};
use tally_storage::queries::trades;
use tally_storage::{Database, NewTrade, SqliteStorage};
use tracing::info;

/// Journal database and quota ledger over it.
async fn open_ledger(config: &TallyConfig) -> Result<QuotaManager, TallyError> {
    let db = Database::open_with_config(&config.storage).await?;
    QuotaManager::from_config(db, config)
}

fn print_json(value: &serde_json::Value) -> Result<(), TallyError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| TallyError::Internal(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

pub async fn run_chat(
    config: &TallyConfig,
    user: UserId,
    session: Option<SessionId>,
    message: &str,
    json: bool,
) -> Result<(), TallyError> {
    let gateway = Arc::new(LlmGateway::from_config(config)?);
    let quota = open_ledger(config).await?;
    let profile = quota.ensure_profile(user).await?;
    let storage = Arc::new(SqliteStorage::new(quota.database().clone()));

    let pipeline = ChatPipeline::new(gateway, quota.clone(), config);
    let conversation = Conversation::new(
        pipeline,
        quota.clone(),
        storage,
        config.chat.recent_context_limit,
    );
    let turn = conversation.send(&profile, session, message).await?;

    if json {
        print_json(&json!({
            "session_id": turn.session_id.to_string(),
            "intent": turn.answer.intent.kind(),
            "answer": turn.answer.text,
            "context": turn.answer.context,
        }))?;
    } else {
        println!("{}", turn.answer.text);
        eprintln!("session: {}", turn.session_id);
    }
    quota.database().clone().close().await
}

fn format_counter(counter: &UsageCounter) -> String {
    match counter.limit {
        Some(limit) => format!("{} / {limit}", counter.used),
        None => format!("{} / unlimited", counter.used),
    }
}

pub async fn run_usage(config: &TallyConfig, user: UserId, json: bool) -> Result<(), TallyError> {
    let quota = open_ledger(config).await?;
    let report = quota
        .usage(user)
        .await?
        .ok_or_else(|| TallyError::InvalidInput(format!("unknown user {user}")))?;

    if json {
        let value = serde_json::to_value(&report)
            .map_err(|e| TallyError::Internal(format!("failed to encode usage: {e}")))?;
        print_json(&value)?;
    } else {
        println!("plan:       {}", report.plan);
        println!("chat today: {}", format_counter(&report.chat));
        println!("imports:    {}", format_counter(&report.imports));
        println!("AI tokens:  {}", format_counter(&report.ai_tokens));
    }
    quota.database().clone().close().await
}

/// Prints the admitted query, or fails with the rejection reason.
pub fn run_check_sql(config: &TallyConfig, sql: &str) -> Result<(), TallyError> {
    let guard = SqlGuard::from_config(&config.sql);
    let admitted = guard
        .admit(sql)
        .map_err(|reason| TallyError::InvalidInput(format!("rejected: {reason}")))?;
    println!("{}", admitted.as_str());
    Ok(())
}

pub async fn run_set_plan(config: &TallyConfig, user: UserId, plan: &str) -> Result<(), TallyError> {
    let quota = open_ledger(config).await?;
    quota.ensure_profile(user).await?;
    let tier = quota.set_plan_tier(user, plan).await?;
    println!("{user}: {tier}");
    quota.database().clone().close().await
}

#[derive(Debug)]
pub struct TradeArgs {
    pub symbol: String,
    pub direction: String,
    pub entry: f64,
    pub exit: Option<f64>,
    pub quantity: f64,
    pub time: Option<String>,
}

pub async fn run_add_trade(
    config: &TallyConfig,
    user: UserId,
    args: TradeArgs,
) -> Result<(), TallyError> {
    let direction = args.direction.trim().to_uppercase();
    if direction != "LONG" && direction != "SHORT" {
        return Err(TallyError::InvalidInput(format!(
            "direction must be LONG or SHORT, got '{}'",
            args.direction
        )));
    }
    if args.quantity <= 0.0 {
        return Err(TallyError::InvalidInput("quantity must be positive".into()));
    }

    let quota = open_ledger(config).await?;
    let profile = quota.ensure_profile(user).await?;
    quota.check_trade_capacity(&profile).await?;

    let time = args.time.unwrap_or_else(tally_storage::now_timestamp);
    let mut trade = NewTrade::open(&args.symbol, &direction, args.entry, &time);
    trade.quantity = args.quantity;

    let db = quota.database();
    let mut stored = trades::insert_trade(db, user, &trade).await?;
    if let Some(exit) = args.exit {
        stored = trades::close_trade(db, user, &stored.id, exit, &time)
            .await?
            .ok_or_else(|| TallyError::Internal("trade vanished before closing".into()))?;
    }
    info!(user_id = %user, trade_id = %stored.id, status = %stored.status, "trade recorded");

    match stored.pnl {
        Some(pnl) => println!("{} {} {} closed, pnl {pnl:.2}", stored.id, stored.symbol, stored.direction),
        None => println!("{} {} {} open", stored.id, stored.symbol, stored.direction),
    }
    db.clone().close().await
}
