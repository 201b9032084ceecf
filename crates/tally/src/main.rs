// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tally - chat with your trading journal.
//!
//! This is the binary entry point: it loads configuration, sets up logging,
//! and runs one subcommand against the local journal database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tally_core::{SessionId, UserId};

/// Tally - chat with your trading journal.
#[derive(Parser, Debug)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the assistant a question about your trades.
    Chat {
        #[arg(long)]
        user: UserId,
        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,
        /// Print the answer and its context as JSON.
        #[arg(long)]
        json: bool,
        message: String,
    },
    /// Show plan limits and what has been used.
    Usage {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        json: bool,
    },
    /// Run a query through the SQL guard without executing it.
    CheckSql { sql: String },
    /// Change a user's plan (FREE, PRO, PREMIUM).
    SetPlan {
        #[arg(long)]
        user: UserId,
        plan: String,
    },
    /// Record a trade, closing it right away when --exit is given.
    AddTrade {
        #[arg(long)]
        user: UserId,
        symbol: String,
        /// LONG or SHORT.
        #[arg(long, default_value = "LONG")]
        direction: String,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        exit: Option<f64>,
        #[arg(long, default_value_t = 1.0)]
        quantity: f64,
        /// Entry (and exit) time; defaults to now.
        #[arg(long)]
        time: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => tally_config::load_and_validate_path(path),
        None => tally_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            tally_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    logging::init_tracing(&config);

    let result = match cli.command {
        Commands::Chat {
            user,
            session,
            json,
            message,
        } => commands::run_chat(&config, user, session.map(SessionId), &message, json).await,
        Commands::Usage { user, json } => commands::run_usage(&config, user, json).await,
        Commands::CheckSql { sql } => commands::run_check_sql(&config, &sql),
        Commands::SetPlan { user, plan } => commands::run_set_plan(&config, user, &plan).await,
        Commands::AddTrade {
            user,
            symbol,
            direction,
            entry,
            exit,
            quantity,
            time,
        } => {
            let trade = commands::TradeArgs {
                symbol,
                direction,
                entry,
                exit,
                quantity,
                time,
            };
            commands::run_add_trade(&config, user, trade).await
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(if e.is_quota_denial() { 2 } else { 1 });
    }
}
