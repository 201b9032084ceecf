// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat pipeline for the Tally trading journal.
//!
//! A turn runs through the [`ChatPipeline`]:
//! - Classify the message into an [`Intent`]
//! - Gather context from the standard metrics lane or from guarded,
//!   model-generated SQL
//! - Synthesize an answer under the user's monthly token budget
//!
//! [`Conversation`] wraps the pipeline with sessions, history and the
//! daily chat limit.

pub mod classifier;
pub mod context;
pub mod conversation;
pub mod intent;
pub mod json;
pub mod metered;
pub mod pipeline;
pub mod settings;
pub mod sql_gen;
pub mod sql_guard;
pub mod synthesis;
pub mod tools;

pub use classifier::IntentClassifier;
pub use context::{ContextMeta, ContextStatus, QueryContext, Row};
pub use conversation::{ChatTurn, Conversation};
pub use intent::{Intent, Period};
pub use metered::MeteredLlm;
pub use pipeline::{ChatAnswer, ChatPipeline};
pub use settings::ModelSettings;
pub use sql_gen::{NO_SQL, SqlGenerator};
pub use sql_guard::{AdmittedQuery, SqlGuard, SqlRejection};
pub use synthesis::FALLBACK_ANSWER;
pub use tools::QueryTools;
