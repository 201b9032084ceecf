// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that drive the `tally` binary.
//!
//! Each test gets its own temp directory holding `tally.toml` and the
//! journal database, so tests are independent and order-insensitive.

use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

const USER: &str = "6f1c2a54-2b7e-4d7e-9a53-1f0c1e5b9d11";

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        Self::with_extra("")
    }

    fn with_extra(extra: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("journal.db");
        let config = dir.path().join("tally.toml");
        std::fs::write(
            &config,
            format!(
                "[storage]\ndatabase_path = {:?}\n{extra}",
                db.to_string_lossy()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_tally"))
            .arg("--config")
            .arg(&self.config)
            .args(args)
            .current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .env_remove("TALLY_GEMINI_API_KEY")
            .env_remove("TALLY_OPENAI_API_KEY")
            .env_remove("TALLY_PERPLEXITY_API_KEY")
            .output()
            .unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn check_sql_admits_and_caps() {
    let ws = Workspace::new();
    let out = ws.run(&[
        "check-sql",
        "SELECT symbol, SUM(pnl) FROM trades WHERE user_id = $1 GROUP BY symbol",
    ]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).trim_end().ends_with("LIMIT 30"));
}

#[test]
fn check_sql_reports_the_rejection() {
    let ws = Workspace::new();
    let out = ws.run(&["check-sql", "DROP TABLE trades"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("only SELECT or WITH queries are allowed"));

    let out = ws.run(&[
        "check-sql",
        "SELECT * FROM trades t, user_profiles p WHERE t.user_id = $1",
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("unauthorized table 'user_profiles'"));
}

#[test]
fn configured_row_cap_is_used() {
    let ws = Workspace::with_extra("[sql]\nmax_rows = 5\n");
    let out = ws.run(&["check-sql", "SELECT symbol FROM trades WHERE user_id = $1"]);
    assert!(out.status.success());
    assert!(stdout(&out).trim_end().ends_with("LIMIT 5"));
}

#[test]
fn trades_and_usage_round_trip_through_the_journal() {
    let ws = Workspace::new();
    let out = ws.run(&[
        "add-trade", "--user", USER, "aapl", "--entry", "100", "--exit", "110",
    ]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("AAPL LONG closed, pnl 10.00"));

    let out = ws.run(&[
        "add-trade", "--user", USER, "tsla", "--direction", "short", "--entry", "200",
    ]);
    assert!(stdout(&out).contains("TSLA SHORT open"));

    let out = ws.run(&["usage", "--user", USER, "--json"]);
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_str(&stdout(&out)).unwrap();
    assert_eq!(report["plan"], "FREE");
    assert_eq!(report["ai_tokens"]["used"], 0);
    assert_eq!(report["ai_tokens"]["limit"], 50_000);
}

#[test]
fn plan_aliases_are_normalized() {
    let ws = Workspace::new();
    let out = ws.run(&["set-plan", "--user", USER, "lifetime"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("PREMIUM"));

    let out = ws.run(&["usage", "--user", USER]);
    assert!(stdout(&out).contains("AI tokens:  0 / unlimited"));
}

#[test]
fn bad_direction_is_invalid_input() {
    let ws = Workspace::new();
    let out = ws.run(&[
        "add-trade", "--user", USER, "aapl", "--direction", "sideways", "--entry", "1",
    ]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("direction must be LONG or SHORT"));
}

#[test]
fn chat_without_a_key_is_a_config_error() {
    let ws = Workspace::new();
    let out = ws.run(&["chat", "--user", USER, "what's my win rate?"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("has no API key"));
}

#[test]
fn unknown_config_key_fails_before_running() {
    let ws = Workspace::with_extra("[sql]\nmax_rowz = 5\n");
    let out = ws.run(&["check-sql", "SELECT 1 FROM trades WHERE user_id = $1"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("max_rowz"));
    assert!(stdout(&out).is_empty());
}
