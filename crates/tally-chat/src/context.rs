// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The envelope every query tool hands to synthesis.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::intent::Period;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextMeta {
    pub row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insufficient_data: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
}

/// `{status, meta, data, message?, info?}`.
///
/// Data-less contexts (informational notes and errors) omit `meta` and
/// `data`; an error context never carries rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    status: ContextStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<ContextMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Vec<Row>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info: Option<String>,
}

impl QueryContext {
    /// Rows from a tool. `meta.row_count` is set from `data`.
    pub fn rows(data: Vec<Row>, mut meta: ContextMeta) -> Self {
        meta.row_count = data.len();
        Self {
            status: ContextStatus::Ok,
            meta: Some(meta),
            data: Some(data),
            message: None,
            info: None,
        }
    }

    /// A successful query with no matches.
    pub fn empty() -> Self {
        Self::rows(Vec::new(), ContextMeta::default())
    }

    /// No query was run; `note` tells the model why.
    pub fn info(note: impl Into<String>) -> Self {
        Self {
            status: ContextStatus::Ok,
            meta: None,
            data: None,
            message: None,
            info: Some(note.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ContextStatus::Error,
            meta: None,
            data: None,
            message: Some(message.into()),
            info: None,
        }
    }

    pub fn status(&self) -> ContextStatus {
        self.status
    }

    pub fn is_error(&self) -> bool {
        self.status == ContextStatus::Error
    }

    pub fn meta(&self) -> Option<&ContextMeta> {
        self.meta.as_ref()
    }

    pub fn data(&self) -> &[Row] {
        self.data.as_deref().unwrap_or_default()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn info_note(&self) -> Option<&str> {
        self.info.as_deref()
    }
}
