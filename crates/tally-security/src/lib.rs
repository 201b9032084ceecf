// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redaction helpers for the Tally trading journal.
//!
//! Keeps provider API keys out of log output and account preferences out of
//! model prompts.

pub mod redact;

pub use redact::{REDACTED, RedactingWriter, redact, redact_private_fields};
