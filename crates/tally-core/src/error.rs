// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tally trading journal.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across Tally crates.
///
/// Everything below the chat pipeline boundary is recovered locally into a
/// typed context or a degraded intent; only the quota denials
/// ([`TallyError::QuotaExceeded`] and [`TallyError::FeatureLocked`]) are meant
/// to reach the user as hard failures.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Configuration errors (invalid TOML, missing keys, failed validation).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transport-level failure talking to an external service.
    #[error("network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The provider asked us to slow down.
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// LLM provider errors (API failure, malformed response, model not found).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        /// HTTP status returned by the provider, when there was one.
        status: Option<u16>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The user's plan does not leave room for this operation.
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The user's plan does not include this feature.
    #[error("feature '{feature}' is not available on the current plan")]
    FeatureLocked { feature: String },

    /// The quota store could not be consulted, so the operation is refused.
    #[error("quota check unavailable: {message}")]
    QuotaUnavailable { message: String },

    /// Caller supplied something unusable (bad id, empty message).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TallyError {
    /// Whether a non-streaming LLM call that failed with this error may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            TallyError::Network { .. }
            | TallyError::RateLimited { .. }
            | TallyError::Timeout { .. } => true,
            TallyError::Provider { status, .. } => {
                matches!(status, Some(s) if *s >= 500 && *s <= 599)
            }
            _ => false,
        }
    }

    /// Whether this error is a plan denial that must be shown to the user.
    pub fn is_quota_denial(&self) -> bool {
        matches!(
            self,
            TallyError::QuotaExceeded { .. } | TallyError::FeatureLocked { .. }
        )
    }

    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>, status: Option<u16>) -> Self {
        TallyError::Provider {
            message: message.into(),
            status,
            source: None,
        }
    }
}
