// crates/tabula-server/src/orchestrator/types.rs
// Stage inputs and outputs shared across the orchestrator

use crate::error::Result;
use crate::intent::{IntentCategory, Visualization};
use crate::sql::parse::{guard_table, mask_literals};
use crate::sql::{ValidatedSql, validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Coordinator output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub category: IntentCategory,
    /// 0-100
    pub confidence: u8,
    /// Ordered, no duplicates
    pub tables_needed: Vec<String>,
    /// Ordered tags such as `count`, `list`, `search`
    pub operations: Vec<String>,
    pub skip_query: bool,
    pub direct_answer: Option<String>,
    pub visualization: Visualization,
}

impl IntentResult {
    pub fn new(category: IntentCategory, confidence: u8) -> Self {
        Self {
            category,
            confidence: confidence.min(100),
            tables_needed: Vec::new(),
            operations: Vec::new(),
            skip_query: false,
            direct_answer: None,
            visualization: category.visualization(),
        }
    }

    /// Add a table, keeping first-seen order
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        let table = table.into();
        if !self.tables_needed.iter().any(|t| t.eq_ignore_ascii_case(&table)) {
            self.tables_needed.push(table);
        }
        self
    }

    pub fn primary_table(&self) -> Option<&str> {
        self.tables_needed.first().map(String::as_str)
    }
}

/// Shape of a generated statement
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum StatementKind {
    CountDistinct,
    SimpleCount,
    List,
    Aggregation,
    Complex,
}

#[allow(clippy::expect_used)]
static COUNT_DISTINCT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bcount\s*\(\s*distinct\b").expect("valid count distinct regex")
});

#[allow(clippy::expect_used)]
static GROUP_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bgroup\s+by\b").expect("valid group by regex"));

#[allow(clippy::expect_used)]
static COMPLEX_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bjoin\b|\bcase\s+when\b|\bunion\b|\(\s*select\b|\bdate_trunc\b")
        .expect("valid complex shape regex")
});

#[allow(clippy::expect_used)]
static AGGREGATE_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(sum|avg|min|max|count)\s*\(").expect("valid aggregate function regex")
});

#[allow(clippy::expect_used)]
static SIMPLE_COUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*select\s+count\s*\(\s*(\*|1)\s*\)(\s+as\s+\w+)?\s+from\b")
        .expect("valid simple count regex")
});

/// Classify a statement by its text
pub fn classify_statement(sql: &str) -> StatementKind {
    let masked = mask_literals(sql);
    if COUNT_DISTINCT_RE.is_match(&masked) {
        StatementKind::CountDistinct
    } else if GROUP_BY_RE.is_match(&masked) {
        StatementKind::Aggregation
    } else if COMPLEX_SHAPE_RE.is_match(&masked) {
        StatementKind::Complex
    } else if SIMPLE_COUNT_RE.is_match(&masked) {
        StatementKind::SimpleCount
    } else if AGGREGATE_FN_RE.is_match(&masked) {
        StatementKind::Aggregation
    } else {
        StatementKind::List
    }
}

/// Query-stage output: a statement that already passed the safety gate
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStrategy {
    pub statement: ValidatedSql,
    pub kind: StatementKind,
    pub explanation: String,
    pub expected_shape: String,
}

/// What the model is asked to return for the query stage
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SqlDraft {
    pub sql: String,
    pub kind: Option<String>,
    pub explanation: String,
    pub expected_shape: String,
}

impl SqlDraft {
    /// Validate the draft. The declared kind is advisory; the statement text decides.
    pub fn into_strategy(self) -> Result<SqlStrategy> {
        let statement = validate(&self.sql)?;
        let kind = classify_statement(statement.as_str());
        Ok(SqlStrategy {
            statement,
            kind,
            explanation: self.explanation,
            expected_shape: self.expected_shape,
        })
    }
}

/// Non-fatal query-stage failure carrying a last-resort statement
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFailure {
    pub reason: String,
    /// `SELECT COUNT(*) FROM <first table>`, validated, when a table is known
    pub fallback: Option<ValidatedSql>,
}

impl QueryFailure {
    pub fn new(reason: impl Into<String>, first_table: Option<&str>) -> Self {
        let fallback = first_table
            .and_then(|t| guard_table(t).ok())
            .and_then(|t| validate(&format!("SELECT COUNT(*) FROM {t}")).ok());
        Self {
            reason: reason.into(),
            fallback,
        }
    }
}
