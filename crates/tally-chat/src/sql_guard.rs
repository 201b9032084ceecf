// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admission policy for model-generated SQL.
//!
//! [`SqlGuard::admit`] is a pure predicate: a candidate is either admitted
//! (possibly with a row cap appended) or rejected with a reason. Rules, in
//! order:
//!
//! 1. starts with `SELECT` or `WITH`
//! 2. no write, DDL or connection-level keyword anywhere, and no `;`
//! 3. no system catalogs
//! 4. no comments, balanced literals and parentheses
//! 5. contains `user_id = $1`
//! 6. every table after `FROM`/`JOIN` is `trades`, `strategies` or a CTE
//!    declared by the query, and the two tables meet only on
//!    `trades.strategy_id = strategies.id`

use std::sync::LazyLock;

use regex::Regex;
use tally_config::model::SqlConfig;

/// Tables generated SQL may read.
pub const ALLOWED_TABLES: &[&str] = &["trades", "strategies"];

static READ_ONLY_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|with)\b").unwrap());

static FORBIDDEN_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(insert|update|delete|drop|alter|truncate|create|exec|execute|call|grant|revoke|attach|detach|pragma|vacuum|reindex|load_extension)\b",
    )
    .unwrap()
});

static SYSTEM_CATALOGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(pg_catalog|information_schema|pg_sleep|sqlite_master|sqlite_schema|sqlite_temp_master|sqlite_temp_schema|pragma_\w+)\b",
    )
    .unwrap()
});

// Matched against the space-joined token stream, see `render`.
static USER_SCOPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^| )(\w+ \. )?user_id = \$1( |$)").unwrap());

static STRATEGY_JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(^| )(\w+ \. )?strategy_id = (\w+ \. )?id( |$)|(^| )(\w+ \. )?id = (\w+ \. )?strategy_id( |$)",
    )
    .unwrap()
});

/// Words that end a table reference instead of aliasing it.
const CLAUSE_WORDS: &[&str] = &[
    "where", "join", "inner", "left", "right", "full", "cross", "natural", "outer", "on",
    "using", "group", "order", "limit", "having", "window", "union", "except", "intersect",
    "select", "from", "offset", "values",
];

/// Why a candidate was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlRejection {
    #[error("empty query")]
    Empty,
    #[error("only SELECT or WITH queries are allowed")]
    NotReadOnly,
    #[error("forbidden keyword '{keyword}'")]
    ForbiddenKeyword { keyword: String },
    #[error("system catalog '{name}' is not accessible")]
    SystemCatalog { name: String },
    #[error("SQL comments are not allowed")]
    Comment,
    #[error("malformed query: {0}")]
    Malformed(&'static str),
    #[error("missing user scope (user_id = $1)")]
    MissingUserScope,
    #[error("unauthorized table '{table}'")]
    UnauthorizedTable { table: String },
    #[error("strategies may only be joined on trades.strategy_id = strategies.id")]
    InvalidJoin,
}

/// SQL that passed every rule and is ready to run with `$1` bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmittedQuery {
    sql: String,
    limit_appended: bool,
}

impl AdmittedQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    /// Whether the guard added the row cap.
    pub fn limit_appended(&self) -> bool {
        self.limit_appended
    }

    #[cfg(test)]
    pub(crate) fn unchecked(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            limit_appended: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Keyword or identifier, lower-cased, quotes removed.
    Word(String),
    /// String literal contents.
    Literal(String),
    Symbol(char),
}

fn tokenize(sql: &str) -> Result<Vec<Token>, SqlRejection> {
    let chars: Vec<char> = sql.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c.is_whitespace() {
            i += 1;
        } else if (c == '-' && next == Some('-')) || (c == '/' && next == Some('*')) {
            return Err(SqlRejection::Comment);
        } else if c == '\'' {
            let mut lit = String::new();
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(SqlRejection::Malformed("unterminated string literal")),
                    Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                        lit.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        lit.push(*ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Literal(lit));
        } else if matches!(c, '"' | '`' | '[') {
            let close = if c == '[' { ']' } else { c };
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|ch| *ch == close)
                .map(|p| start + p)
                .ok_or(SqlRejection::Malformed("unterminated quoted identifier"))?;
            let ident: String = chars[start..end].iter().collect();
            tokens.push(Token::Word(ident.to_lowercase()));
            i = end + 1;
        } else if c.is_alphanumeric() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            tokens.push(Token::Word(word.to_lowercase()));
        } else {
            tokens.push(Token::Symbol(c));
            i += 1;
        }
    }
    Ok(tokens)
}

/// Space-joined tokens with literals blanked, so predicates inside string
/// literals never count.
fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| match t {
            Token::Word(w) => w.clone(),
            Token::Literal(_) => "''".to_string(),
            Token::Symbol(c) => c.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_word(token: Option<&Token>, word: &str) -> bool {
    matches!(token, Some(Token::Word(w)) if w == word)
}

/// Index of the `)` closing the `(` at `open`.
fn matching_paren(tokens: &[Token], open: usize) -> Result<usize, SqlRejection> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::Symbol('(') => depth += 1,
            Token::Symbol(')') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err(SqlRejection::Malformed("unbalanced parentheses"))
}

/// Names declared by a leading `WITH` clause.
fn cte_names(tokens: &[Token]) -> Result<Vec<String>, SqlRejection> {
    let mut names = Vec::new();
    if !is_word(tokens.first(), "with") {
        return Ok(names);
    }
    let mut i = 1;
    if is_word(tokens.get(i), "recursive") {
        i += 1;
    }
    while let Some(Token::Word(name)) = tokens.get(i) {
        names.push(name.clone());
        i += 1;
        if tokens.get(i) == Some(&Token::Symbol('(')) {
            i = matching_paren(tokens, i)? + 1;
        }
        if !is_word(tokens.get(i), "as") {
            break;
        }
        i += 1;
        if is_word(tokens.get(i), "not") {
            i += 1;
        }
        if is_word(tokens.get(i), "materialized") {
            i += 1;
        }
        if tokens.get(i) != Some(&Token::Symbol('(')) {
            break;
        }
        i = matching_paren(tokens, i)? + 1;
        if tokens.get(i) != Some(&Token::Symbol(',')) {
            break;
        }
        i += 1;
    }
    Ok(names)
}

/// Table names in the reference list starting at `i` (just after FROM/JOIN).
fn read_table_list(
    tokens: &[Token],
    mut i: usize,
    tables: &mut Vec<String>,
) -> Result<(), SqlRejection> {
    loop {
        match tokens.get(i) {
            Some(Token::Symbol('(')) => {
                let close = matching_paren(tokens, i)?;
                // Subqueries have their own FROM clauses, which the caller
                // visits. Anything else is a parenthesized table list.
                if !is_word(tokens.get(i + 1), "select") && !is_word(tokens.get(i + 1), "with") {
                    read_table_list(&tokens[..close], i + 1, tables)?;
                }
                i = close + 1;
            }
            Some(Token::Word(name)) | Some(Token::Literal(name)) => {
                let mut full = name.to_lowercase();
                i += 1;
                while tokens.get(i) == Some(&Token::Symbol('.')) {
                    let Some(Token::Word(part)) = tokens.get(i + 1) else {
                        break;
                    };
                    full.push('.');
                    full.push_str(part);
                    i += 2;
                }
                // Table-valued function call.
                if tokens.get(i) == Some(&Token::Symbol('(')) {
                    i = matching_paren(tokens, i)? + 1;
                }
                tables.push(full);
            }
            _ => return Ok(()),
        }

        if is_word(tokens.get(i), "as") {
            i += 2;
        } else if let Some(Token::Word(alias)) = tokens.get(i)
            && !CLAUSE_WORDS.contains(&alias.as_str())
        {
            i += 1;
        }

        if tokens.get(i) != Some(&Token::Symbol(',')) {
            return Ok(());
        }
        i += 1;
    }
}

fn referenced_tables(tokens: &[Token]) -> Result<Vec<String>, SqlRejection> {
    let mut tables = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if let Token::Word(w) = token
            && (w == "from" || w == "join")
        {
            read_table_list(tokens, i + 1, &mut tables)?;
        }
    }
    tables.sort();
    tables.dedup();
    Ok(tables)
}

#[derive(Debug, Clone)]
pub struct SqlGuard {
    max_rows: usize,
}

impl SqlGuard {
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    pub fn from_config(config: &SqlConfig) -> Self {
        Self::new(config.max_rows)
    }

    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// Check `sql` against every rule. Appends `LIMIT <max_rows>` when the
    /// query has no LIMIT of its own; nothing else is rewritten.
    pub fn admit(&self, sql: &str) -> Result<AdmittedQuery, SqlRejection> {
        let sql = sql.trim();
        if sql.is_empty() {
            return Err(SqlRejection::Empty);
        }
        if !READ_ONLY_START.is_match(sql) {
            return Err(SqlRejection::NotReadOnly);
        }
        if let Some(m) = FORBIDDEN_KEYWORDS.find(sql) {
            return Err(SqlRejection::ForbiddenKeyword {
                keyword: m.as_str().to_lowercase(),
            });
        }
        if let Some(m) = SYSTEM_CATALOGS.find(sql) {
            return Err(SqlRejection::SystemCatalog {
                name: m.as_str().to_lowercase(),
            });
        }
        if sql.contains(';') {
            return Err(SqlRejection::ForbiddenKeyword {
                keyword: ";".into(),
            });
        }

        let tokens = tokenize(sql)?;
        let rendered = render(&tokens);
        if !USER_SCOPE.is_match(&rendered) {
            return Err(SqlRejection::MissingUserScope);
        }

        let ctes = cte_names(&tokens)?;
        let tables = referenced_tables(&tokens)?;
        if let Some(table) = tables
            .iter()
            .find(|t| !ALLOWED_TABLES.contains(&t.as_str()) && !ctes.contains(t))
        {
            return Err(SqlRejection::UnauthorizedTable {
                table: table.clone(),
            });
        }
        let joins_strategies = ["trades", "strategies"]
            .iter()
            .all(|t| tables.iter().any(|x| x == t));
        if joins_strategies && !STRATEGY_JOIN.is_match(&rendered) {
            return Err(SqlRejection::InvalidJoin);
        }

        let has_limit = tokens.iter().any(|t| matches!(t, Token::Word(w) if w == "limit"));
        if has_limit {
            Ok(AdmittedQuery {
                sql: sql.to_string(),
                limit_appended: false,
            })
        } else {
            Ok(AdmittedQuery {
                sql: format!("{sql} LIMIT {}", self.max_rows),
                limit_appended: true,
            })
        }
    }
}

impl Default for SqlGuard {
    fn default() -> Self {
        Self::from_config(&SqlConfig::default())
    }
}
