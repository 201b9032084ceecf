// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::{Arc, RwLock};

use tally_config::model::TallyConfig;
use tally_core::ProviderKind;
use tally_security::RedactingWriter;
use tracing_subscriber::EnvFilter;

/// Configured provider keys, for exact-match redaction.
fn known_secrets(config: &TallyConfig) -> Arc<RwLock<Vec<String>>> {
    let secrets = Arc::new(RwLock::new(Vec::new()));
    for kind in [ProviderKind::OpenAi, ProviderKind::Perplexity, ProviderKind::Gemini] {
        if let Some(key) = &config.provider(kind).api_key {
            RedactingWriter::<std::io::Stderr>::add_secret(&secrets, key.clone());
        }
    }
    secrets
}

/// Log to stderr through the redacting writer. `RUST_LOG` wins over
/// `app.log_level`.
pub fn init_tracing(config: &TallyConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tally={},warn", config.app.log_level)));
    let secrets = known_secrets(config);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(move || RedactingWriter::new(std::io::stderr(), secrets.clone()))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_keys_are_collected_once() {
        let mut config = TallyConfig::default();
        config.openai.api_key = Some("sk-one".into());
        config.gemini.api_key = Some("sk-one".into());
        config.perplexity.api_key = Some(String::new());
        let secrets = known_secrets(&config);
        assert_eq!(*secrets.read().unwrap(), vec!["sk-one".to_string()]);
    }
}
