// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod messages;
pub mod profiles;
pub mod sessions;
pub mod strategies;
pub mod trades;
pub mod usage;
