// crates/tabula-server/src/sql/parse.rs
// Lightweight clause splitting for single-table SELECT statements
//
// Not a SQL parser. Quoted literals are masked before keyword search so a
// value like 'order by' never splits a clause, and only keywords at paren
// depth zero count.

use crate::error::{Result, TabulaError};
use crate::store::{Filter, FilterOp};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(from|where|group\s+by|having|order\s+by|limit|offset)\b").expect("valid clause regex")
});

#[allow(clippy::expect_used)]
static SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:from|join)\b").expect("valid source regex"));

#[allow(clippy::expect_used)]
static SOURCE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:where|group\s+by|having|order\s+by|limit|offset|union|intersect|except|window|join|inner|left|right|full|cross|natural|on|using)\b",
    )
    .expect("valid source end regex")
});

#[allow(clippy::expect_used)]
static TABLE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^[\w."`\[\]]+"#).expect("valid table token regex"));

#[allow(clippy::expect_used)]
static CONDITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*(?:"?\w+"?\.)?"?(\w+)"?\s*(>=|<=|<>|!=|=|>|<|not\s+i?like|ilike|like|not\s+in|in|is\s+not|is)\s*(.*?)\s*$"#,
    )
    .expect("valid condition regex")
});

#[allow(clippy::expect_used)]
static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^(.*?)\s+as\s+"?(\w+)"?\s*$"#).expect("valid alias regex")
});

#[allow(clippy::expect_used)]
static AND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\band\b").expect("valid and regex"));

#[allow(clippy::expect_used)]
static OR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bor\b").expect("valid or regex"));

/// Catalog names that must never be read
const SYSTEM_CATALOGS: &[&str] = &[
    "sqlite_master",
    "sqlite_schema",
    "sqlite_temp_master",
    "sqlite_temp_schema",
    "sqlite_sequence",
    "information_schema",
];

/// Lowercase copy with quoted literal contents replaced by `x`. Byte offsets
/// line up with the input.
pub fn mask_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_quote = false;
    for ch in sql.chars() {
        if ch == '\'' {
            in_quote = !in_quote;
            out.push('\'');
        } else if in_quote {
            for _ in 0..ch.len_utf8() {
                out.push('x');
            }
        } else {
            out.push(ch.to_ascii_lowercase());
        }
    }
    out
}

fn depth_at(masked: &str, pos: usize) -> i32 {
    masked[..pos].chars().fold(0, |depth, ch| match ch {
        '(' => depth + 1,
        ')' => depth - 1,
        _ => depth,
    })
}

/// Top-level clauses of a SELECT
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Clauses {
    pub select: String,
    pub from: String,
    pub where_: Option<String>,
    pub group_by: Option<String>,
    pub having: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

pub fn split_clauses(sql: &str) -> Result<Clauses> {
    let masked = mask_literals(sql);
    let body_start = masked
        .find("select")
        .map(|i| i + "select".len())
        .ok_or_else(|| TabulaError::Translation("not a SELECT statement".into()))?;

    let mut marks: Vec<(String, usize, usize)> = Vec::new();
    for m in CLAUSE_RE.find_iter(&masked) {
        if m.start() < body_start || depth_at(&masked, m.start()) != 0 {
            continue;
        }
        let keyword: String = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if marks.iter().any(|(k, _, _)| *k == keyword) {
            continue;
        }
        marks.push((keyword, m.start(), m.end()));
    }
    marks.sort_by_key(|(_, start, _)| *start);

    let first_clause = marks.first().map(|(_, s, _)| *s).unwrap_or(sql.len());
    let mut clauses = Clauses {
        select: sql[body_start..first_clause].trim().to_string(),
        ..Default::default()
    };

    for (idx, (keyword, _, end)) in marks.iter().enumerate() {
        let stop = marks.get(idx + 1).map(|(_, s, _)| *s).unwrap_or(sql.len());
        let text = sql[*end..stop].trim().to_string();
        match keyword.as_str() {
            "from" => clauses.from = text,
            "where" => clauses.where_ = Some(text),
            "group by" => clauses.group_by = Some(text),
            "having" => clauses.having = Some(text),
            "order by" => clauses.order_by = Some(text),
            "limit" => clauses.limit = Some(text),
            "offset" => clauses.offset = Some(text),
            _ => {}
        }
    }

    if clauses.from.is_empty() {
        return Err(TabulaError::Translation("statement has no FROM clause".into()));
    }
    Ok(clauses)
}

/// Every table token named after FROM or JOIN at any depth, one per entry of
/// a comma-separated list. Expects masked input.
pub fn source_tables(masked: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for m in SOURCE_RE.find_iter(masked) {
        let rest = &masked[m.end()..];
        let mut depth = 0i32;
        let mut close = rest.len();
        for (idx, ch) in rest.char_indices() {
            match ch {
                '(' => depth += 1,
                ')' if depth == 0 => {
                    close = idx;
                    break;
                }
                ')' => depth -= 1,
                _ => {}
            }
        }
        let scope = &rest[..close];
        let end = SOURCE_END_RE
            .find_iter(scope)
            .find(|k| depth_at(scope, k.start()) == 0)
            .map_or(scope.len(), |k| k.start());

        for entry in split_top_level(&scope[..end], ',') {
            if let Some(token) = TABLE_TOKEN_RE.find(&entry) {
                tables.push(token.as_str().to_string());
            }
        }
    }
    tables
}

/// Split on `sep` at paren depth zero, outside quotes
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_quote = false;

    for ch in text.chars() {
        match ch {
            '\'' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => depth -= 1,
            c if c == sep && !in_quote && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Split a WHERE body on top-level `AND`. `None` when it uses `OR` or `BETWEEN`.
pub fn split_conjunction(where_body: &str) -> Option<Vec<String>> {
    let masked = mask_literals(where_body);
    if OR_RE.find_iter(&masked).any(|m| depth_at(&masked, m.start()) == 0)
        || masked.contains("between")
    {
        return None;
    }

    let mut parts = Vec::new();
    let mut last = 0;
    for m in AND_RE.find_iter(&masked) {
        if depth_at(&masked, m.start()) != 0 {
            continue;
        }
        parts.push(where_body[last..m.start()].trim().to_string());
        last = m.end();
    }
    parts.push(where_body[last..].trim().to_string());
    Some(parts.into_iter().filter(|p| !p.is_empty()).collect())
}

/// Parse a SQL literal: quoted string, number, null, boolean
pub fn parse_literal(text: &str) -> Option<Value> {
    let t = text.trim();
    if t.len() >= 2 && t.starts_with('\'') && t.ends_with('\'') {
        return Some(Value::String(t[1..t.len() - 1].replace("''", "'")));
    }
    match t.to_ascii_lowercase().as_str() {
        "null" => return Some(Value::Null),
        "true" => return Some(Value::Bool(true)),
        "false" => return Some(Value::Bool(false)),
        _ => {}
    }
    if let Ok(i) = t.parse::<i64>() {
        return Some(Value::from(i));
    }
    t.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Parse `col <op> value` into a filter. `None` for anything else.
pub fn parse_condition(text: &str) -> Option<Filter> {
    let caps = CONDITION_RE.captures(text)?;
    let column = caps.get(1)?.as_str().to_string();
    let op_text = caps
        .get(2)?
        .as_str()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    let rest = caps.get(3)?.as_str();

    let (op, value) = match op_text.as_str() {
        "=" => (FilterOp::Eq, parse_literal(rest)?),
        "!=" | "<>" => (FilterOp::Neq, parse_literal(rest)?),
        ">" => (FilterOp::Gt, parse_literal(rest)?),
        ">=" => (FilterOp::Gte, parse_literal(rest)?),
        "<" => (FilterOp::Lt, parse_literal(rest)?),
        "<=" => (FilterOp::Lte, parse_literal(rest)?),
        "like" => (FilterOp::Like, parse_literal(rest)?),
        "ilike" => (FilterOp::Ilike, parse_literal(rest)?),
        "in" => {
            let inner = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
            let values = split_top_level(inner, ',')
                .iter()
                .map(|v| parse_literal(v))
                .collect::<Option<Vec<_>>>()?;
            (FilterOp::In, Value::Array(values))
        }
        "is" if rest.eq_ignore_ascii_case("null") => (FilterOp::Is, Value::Null),
        "is not" if rest.eq_ignore_ascii_case("null") => {
            (FilterOp::Is, Value::String("not null".into()))
        }
        _ => return None,
    };

    // Comparisons against NULL need IS
    if value.is_null() && op != FilterOp::Is {
        return None;
    }

    Some(Filter { column, op, value })
}

/// Split `expr AS alias`; returns the expression and optional alias
pub fn split_alias(item: &str) -> (String, Option<String>) {
    match ALIAS_RE.captures(item) {
        Some(caps) => (
            caps.get(1).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
            caps.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (item.trim().to_string(), None),
    }
}

/// Strip quotes and a table qualifier from an identifier
pub fn bare_identifier(text: &str) -> Option<String> {
    let t = text.trim();
    let t = t.rsplit('.').next().unwrap_or(t);
    let t = t.trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']');
    (!t.is_empty() && t.chars().all(|c| c.is_alphanumeric() || c == '_')).then(|| t.to_string())
}

/// The single table named in FROM. Rejects qualified names and system catalogs.
pub fn from_table(from: &str) -> Result<String> {
    if from.contains(',') {
        return Err(TabulaError::Translation("multiple tables in FROM".into()));
    }
    let raw = from
        .split_whitespace()
        .next()
        .ok_or_else(|| TabulaError::Translation("empty FROM clause".into()))?;
    guard_table(raw)
}

/// Table-name guard shared by every execution path
pub fn guard_table(raw: &str) -> Result<String> {
    let name = raw.trim().trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']');
    if name.contains('.') {
        return Err(TabulaError::Translation(format!(
            "qualified table name not allowed: {name}"
        )));
    }
    let lower = name.to_ascii_lowercase();
    if SYSTEM_CATALOGS.contains(&lower.as_str()) || lower.starts_with("pg_") {
        return Err(TabulaError::Translation(format!(
            "system catalog not allowed: {name}"
        )));
    }
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(TabulaError::Translation(format!("invalid table name: {raw}")));
    }
    Ok(name.to_string())
}
