// crates/tabula-server/src/sql/validator.rs
// Read-only SQL gate: the only way to obtain a `ValidatedSql`

use crate::error::{Result, TabulaError};
use std::fmt;
use tracing::warn;

/// Keywords rejected anywhere in the statement, matched as whole words
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "drop", "delete", "update", "insert", "alter", "truncate", "create", "grant", "revoke", "exec",
    "execute",
];

/// SQL text that passed [`validate`]. Cannot be built any other way, so
/// anything typed `ValidatedSql` has been through the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSql(String);

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedSql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Validate a statement. Fails closed.
///
/// 1. The first token must be `select` (case-insensitive).
/// 2. No blocked keyword may appear as a whole word anywhere.
/// 3. A single statement only; trailing semicolons are dropped.
///
/// Rejections are logged on the `security` target with the offending keyword.
pub fn validate(raw_sql: &str) -> Result<ValidatedSql> {
    let candidate = strip_trailing_semicolons(raw_sql);
    let normalized = candidate.to_ascii_lowercase();

    let leading = leading_keyword(&normalized);
    if leading != "select" {
        return Err(reject(if leading.is_empty() { "<empty>" } else { leading }, raw_sql));
    }

    if let Some(keyword) = first_blocked_keyword(&normalized) {
        return Err(reject(keyword, raw_sql));
    }

    if candidate.contains(';') {
        return Err(reject(";", raw_sql));
    }

    Ok(ValidatedSql(candidate.to_string()))
}

fn reject(keyword: &str, raw_sql: &str) -> TabulaError {
    warn!(
        target: "security",
        keyword,
        statement = %crate::utils::truncate(raw_sql, 200),
        "Rejected unsafe SQL"
    );
    TabulaError::Security {
        keyword: keyword.to_string(),
    }
}

fn strip_trailing_semicolons(raw_sql: &str) -> &str {
    let mut candidate = raw_sql.trim();
    while let Some(stripped) = candidate.strip_suffix(';') {
        candidate = stripped.trim_end();
    }
    candidate
}

fn tokens(normalized_sql: &str) -> impl Iterator<Item = &str> {
    normalized_sql
        .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .filter(|token| !token.is_empty())
}

fn leading_keyword(normalized_sql: &str) -> &str {
    tokens(normalized_sql).next().unwrap_or("")
}

fn first_blocked_keyword(normalized_sql: &str) -> Option<&'static str> {
    tokens(normalized_sql).find_map(|token| BLOCKED_KEYWORDS.iter().copied().find(|k| *k == token))
}
