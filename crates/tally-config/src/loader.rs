// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Merge order (later overrides earlier): compiled defaults,
//! `/etc/tally/tally.toml`, `~/.config/tally/tally.toml`, `./tally.toml`,
//! then `TALLY_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::TallyConfig;

/// Sections that may be addressed from the environment, longest first so
/// `plans_premium_` wins over a shorter prefix.
const ENV_SECTIONS: &[&str] = &[
    "plans_premium",
    "plans_free",
    "plans_pro",
    "perplexity",
    "storage",
    "openai",
    "gemini",
    "quota",
    "chat",
    "app",
    "llm",
    "sql",
];

/// Config files consulted in merge order.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/tally/tally.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("tally/tally.toml"));
    }
    paths.push(PathBuf::from("tally.toml"));
    paths
}

/// Load configuration from the standard hierarchy with env var overrides.
pub fn load_config() -> Result<TallyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no environment).
pub fn load_config_from_str(toml_content: &str) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<TallyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(TallyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(TallyConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Maps a lowercased, prefix-stripped env key to its dotted config path.
///
/// Only the section separator is rewritten: `openai_api_key` becomes
/// `openai.api_key`, never `openai.api.key`. Keys outside a known section
/// are returned unchanged and rejected later by `deny_unknown_fields`.
pub fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            let dotted_section = section.replacen("plans_", "plans.", 1);
            return format!("{dotted_section}.{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("TALLY_").map(|key| env_key_to_path(key.as_str()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_only_at_section() {
        assert_eq!(env_key_to_path("openai_api_key"), "openai.api_key");
        assert_eq!(env_key_to_path("llm_max_attempts"), "llm.max_attempts");
        assert_eq!(
            env_key_to_path("quota_max_tokens_per_request"),
            "quota.max_tokens_per_request"
        );
        assert_eq!(
            env_key_to_path("plans_premium_daily_chat_msgs"),
            "plans.premium.daily_chat_msgs"
        );
        assert_eq!(env_key_to_path("plans_pro_allow_csv_export"), "plans.pro.allow_csv_export");
    }

    #[test]
    fn unknown_env_section_is_left_alone() {
        assert_eq!(env_key_to_path("bogus_key"), "bogus_key");
    }

    #[test]
    fn local_file_is_merged_last() {
        let paths = config_file_paths();
        assert_eq!(paths.first(), Some(&PathBuf::from("/etc/tally/tally.toml")));
        assert_eq!(paths.last(), Some(&PathBuf::from("tally.toml")));
    }
}
