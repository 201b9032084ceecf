// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quota ledger for the Tally trading journal.
//!
//! This crate provides:
//! - **Plan limits**: feature gates and per-plan counters from `[plans.*]`
//! - **Token reservation**: conditional reserve before every paid LLM call,
//!   with a conditional rollback when the call fails
//! - **Counters**: daily chat messages and monthly CSV imports with resets
//! - **Usage logging**: one `ai_usage_logs` row per metered call with a cost estimate

pub mod cache;
pub mod estimate;
pub mod manager;
pub mod plans;
pub mod pricing;
pub mod usage_log;

pub use cache::ProfileCache;
pub use estimate::{ReservationEstimate, estimate_reservation, estimate_tokens};
pub use manager::{QuotaManager, TokenReservation, UsageCounter, UsageReport};
pub use plans::Feature;
pub use usage_log::UsageEntry;
