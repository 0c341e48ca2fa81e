// crates/tabula-server/src/sql/scan.rs
// In-memory evaluation of grouped, distinct, categorized and case-insensitive queries
//
// Used when the backend has no raw-read escape hatch. Pulls the whole table
// and computes the result client-side, so cost is O(rows in table).

use super::parse::{
    Clauses, bare_identifier, mask_literals, parse_condition, parse_literal, split_alias,
    split_conjunction, split_top_level,
};
use crate::error::{Result, TabulaError};
use crate::store::{Filter, FilterOp, Row};
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(count|sum|avg|min|max)\s*\(\s*(distinct\s+)?(.+?)\s*\)$")
        .expect("valid aggregate regex")
});

#[allow(clippy::expect_used)]
static DATE_TRUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^date_trunc\s*\(\s*'(\w+)'\s*,\s*(.+?)\s*\)$").expect("valid date_trunc regex")
});

#[allow(clippy::expect_used)]
static UNSUPPORTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bjoin\b|\(\s*select\b").expect("valid unsupported regex")
});

#[allow(clippy::expect_used)]
static CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^case\s+(when\b.*\S)\s+end$").expect("valid case regex"));

#[allow(clippy::expect_used)]
static CASE_KEYWORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(when|then|else)\b").expect("valid case keyword regex"));

/// Rows returned by a plain scan without an explicit LIMIT
pub const DEFAULT_SCAN_LIMIT: usize = 100;

/// Period used for date bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Year,
    Month,
    Week,
    Day,
}

impl Bucket {
    fn parse(unit: &str) -> Option<Self> {
        match unit.to_ascii_lowercase().as_str() {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "week" => Some(Self::Week),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    /// Truncate a date-like value to the start of its period
    fn apply(self, value: &Value) -> Value {
        let Some(text) = value.as_str() else {
            return Value::Null;
        };
        let Some(date) = text
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        else {
            return Value::Null;
        };
        let start = match self {
            Self::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
            Self::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            Self::Week => {
                Some(date - Duration::days(i64::from(date.weekday().num_days_from_monday())))
            }
            Self::Day => Some(date),
        };
        start
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Star,
    Column(String),
    Bucketed(Bucket, String),
    CountAll,
    Count(String),
    CountDistinct(String),
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
    /// Searched CASE: first branch whose conditions all hold, else `otherwise`
    Case {
        branches: Vec<(Vec<Filter>, Value)>,
        otherwise: Value,
    },
}

impl Expr {
    fn is_aggregate(&self) -> bool {
        !matches!(self, Self::Star | Self::Column(_) | Self::Bucketed(..) | Self::Case { .. })
    }

    fn parse(text: &str) -> Result<Self> {
        let t = text.trim();
        if t == "*" {
            return Ok(Self::Star);
        }
        if let Some(caps) = CASE_RE.captures(t) {
            return parse_case(&caps[1]);
        }
        if let Some(caps) = DATE_TRUNC_RE.captures(t) {
            let bucket = Bucket::parse(&caps[1])
                .ok_or_else(|| TabulaError::Translation(format!("unsupported period {}", &caps[1])))?;
            let column = bare_identifier(&caps[2])
                .ok_or_else(|| TabulaError::Translation(format!("unsupported expression {t}")))?;
            return Ok(Self::Bucketed(bucket, column));
        }
        if let Some(caps) = FUNCTION_RE.captures(t) {
            let func = caps[1].to_ascii_lowercase();
            let distinct = caps.get(2).is_some();
            let arg = caps[3].trim();
            if func == "count" && !distinct && (arg == "*" || arg == "1") {
                return Ok(Self::CountAll);
            }
            let column = bare_identifier(arg)
                .ok_or_else(|| TabulaError::Translation(format!("unsupported expression {t}")))?;
            return Ok(match (func.as_str(), distinct) {
                ("count", true) => Self::CountDistinct(column),
                ("count", false) => Self::Count(column),
                ("sum", _) => Self::Sum(column),
                ("avg", _) => Self::Avg(column),
                ("min", _) => Self::Min(column),
                _ => Self::Max(column),
            });
        }
        bare_identifier(t)
            .map(Self::Column)
            .ok_or_else(|| TabulaError::Translation(format!("unsupported expression {t}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Projection {
    expr: Expr,
    /// Output column name: the alias, or the expression text as written
    name: String,
    /// Normalized expression text for ORDER BY matching
    key: String,
}

fn normalize_expr(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && *c != '"')
        .collect::<String>()
        .to_ascii_lowercase()
}

/// A client-side evaluation plan for one table
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub table: String,
    filters: Vec<Filter>,
    projections: Vec<Projection>,
    group_by: Vec<Expr>,
    order: Vec<(String, bool)>,
    limit: Option<usize>,
    offset: usize,
}

impl ScanPlan {
    /// Build a plan from split clauses. Joins, subqueries, HAVING and OR
    /// conditions are rejected.
    pub fn from_clauses(sql: &str, clauses: &Clauses, table: String) -> Result<Self> {
        if UNSUPPORTED_RE.is_match(sql) {
            return Err(TabulaError::Translation(
                "joins and subqueries need the raw-read path".into(),
            ));
        }
        if clauses.having.is_some() {
            return Err(TabulaError::Translation("HAVING is not supported by the scan path".into()));
        }

        let filters = match &clauses.where_ {
            Some(body) => split_conjunction(body)
                .ok_or_else(|| TabulaError::Translation("OR/BETWEEN not supported by the scan path".into()))?
                .iter()
                .map(|cond| {
                    parse_condition(cond).ok_or_else(|| {
                        TabulaError::Translation(format!("unsupported condition: {cond}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let (select_body, distinct) = match strip_distinct(&clauses.select) {
            Some(rest) => (rest, true),
            None => (clauses.select.as_str(), false),
        };

        let projections = split_top_level(select_body, ',')
            .iter()
            .map(|item| {
                let (expr_text, alias) = split_alias(item);
                let expr = Expr::parse(&expr_text)?;
                Ok(Projection {
                    name: alias.unwrap_or_else(|| expr_text.clone()),
                    key: normalize_expr(&expr_text),
                    expr,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut group_by = match &clauses.group_by {
            Some(body) => split_top_level(body, ',')
                .iter()
                .map(|g| resolve_group_key(g, &projections))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        if distinct && group_by.is_empty() {
            group_by = projections.iter().map(|p| p.expr.clone()).collect();
        }

        let order = match &clauses.order_by {
            Some(body) => split_top_level(body, ',')
                .iter()
                .map(|item| {
                    let mut words: Vec<&str> = item.split_whitespace().collect();
                    let descending = match words.last().map(|w| w.to_ascii_lowercase()) {
                        Some(w) if w == "desc" => {
                            words.pop();
                            true
                        }
                        Some(w) if w == "asc" => {
                            words.pop();
                            false
                        }
                        _ => false,
                    };
                    (words.join(" "), descending)
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(Self {
            table,
            filters,
            projections,
            group_by,
            order,
            limit: parse_count(clauses.limit.as_deref()),
            offset: parse_count(clauses.offset.as_deref()).unwrap_or(0),
        })
    }

    fn aggregated(&self) -> bool {
        !self.group_by.is_empty() || self.projections.iter().any(|p| p.expr.is_aggregate())
    }

    /// Evaluate against every row of the table
    pub fn run(&self, rows: Vec<Row>) -> Result<Vec<Row>> {
        let matching: Vec<Row> = rows
            .into_iter()
            .filter(|row| self.filters.iter().all(|f| filter_matches(f, row)))
            .collect();

        let mut output = if self.aggregated() {
            self.aggregate(&matching)
        } else {
            self.project(matching)
        };

        self.sort(&mut output);

        let limit = match (self.limit, self.aggregated()) {
            (Some(limit), _) => limit,
            (None, false) => DEFAULT_SCAN_LIMIT,
            (None, true) => usize::MAX,
        };
        Ok(output.into_iter().skip(self.offset).take(limit).collect())
    }

    fn project(&self, rows: Vec<Row>) -> Vec<Row> {
        if self.projections.iter().any(|p| p.expr == Expr::Star) {
            return rows;
        }
        rows.iter()
            .map(|row| {
                self.projections
                    .iter()
                    .map(|p| (p.name.clone(), eval_scalar(&p.expr, row)))
                    .collect()
            })
            .collect()
    }

    fn aggregate(&self, rows: &[Row]) -> Vec<Row> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&Row>> = HashMap::new();

        for row in rows {
            let key: Vec<Value> = self.group_by.iter().map(|g| eval_scalar(g, row)).collect();
            let key = Value::Array(key).to_string();
            groups
                .entry(key.clone())
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(row);
        }

        // Aggregates over an empty table still yield one row
        if order.is_empty() && self.group_by.is_empty() {
            order.push(String::new());
            groups.insert(String::new(), Vec::new());
        }

        order
            .iter()
            .filter_map(|key| groups.get(key))
            .map(|members| {
                self.projections
                    .iter()
                    .map(|p| (p.name.clone(), eval_aggregate(&p.expr, members)))
                    .collect()
            })
            .collect()
    }

    fn sort(&self, rows: &mut [Row]) {
        if self.order.is_empty() {
            return;
        }
        let keys: Vec<(String, bool)> = self
            .order
            .iter()
            .map(|(expr, desc)| {
                let normalized = normalize_expr(expr);
                let name = self
                    .projections
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(expr) || p.key == normalized)
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| bare_identifier(expr).unwrap_or_else(|| expr.clone()));
                (name, *desc)
            })
            .collect();

        rows.sort_by(|a, b| {
            for (name, desc) in &keys {
                let ord = compare_values(
                    a.get(name).unwrap_or(&Value::Null),
                    b.get(name).unwrap_or(&Value::Null),
                );
                let ord = if *desc { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
    }
}

fn strip_distinct(select: &str) -> Option<&str> {
    let trimmed = select.trim_start();
    let head = trimmed.get(..8)?;
    (head.eq_ignore_ascii_case("distinct") && trimmed[8..].starts_with(char::is_whitespace))
        .then(|| trimmed[8..].trim_start())
}

/// A GROUP BY item is a column, a bucket expression, or an alias of one
fn resolve_group_key(text: &str, projections: &[Projection]) -> Result<Expr> {
    let normalized = normalize_expr(text);
    if let Some(p) = projections
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(text.trim()) || p.key == normalized)
        && !p.expr.is_aggregate()
    {
        return Ok(p.expr.clone());
    }
    if let Ok(position) = text.trim().parse::<usize>()
        && let Some(p) = position.checked_sub(1).and_then(|i| projections.get(i))
    {
        return Ok(p.expr.clone());
    }
    match Expr::parse(text)? {
        expr @ (Expr::Column(_) | Expr::Bucketed(..) | Expr::Case { .. }) => Ok(expr),
        _ => Err(TabulaError::Translation(format!("unsupported GROUP BY item: {text}"))),
    }
}

/// `WHEN cond THEN lit [WHEN ...] [ELSE lit]`, conditions being AND-joined
/// comparisons and results literals
fn parse_case(body: &str) -> Result<Expr> {
    let unsupported = || TabulaError::Translation(format!("unsupported CASE expression: {body}"));

    let masked = mask_literals(body);
    let marks: Vec<(String, usize, usize)> = CASE_KEYWORD_RE
        .find_iter(&masked)
        .map(|m| (m.as_str().to_string(), m.start(), m.end()))
        .collect();

    let mut branches = Vec::new();
    let mut otherwise = Value::Null;
    let mut pending: Option<Vec<Filter>> = None;

    for (idx, (keyword, _, end)) in marks.iter().enumerate() {
        let stop = marks.get(idx + 1).map_or(body.len(), |(_, start, _)| *start);
        let text = body[*end..stop].trim();
        match (keyword.as_str(), pending.take()) {
            ("when", None) => {
                let filters = split_conjunction(text)
                    .ok_or_else(unsupported)?
                    .iter()
                    .map(|cond| parse_condition(cond))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(unsupported)?;
                pending = Some(filters);
            }
            ("then", Some(filters)) => {
                branches.push((filters, parse_literal(text).ok_or_else(unsupported)?));
            }
            ("else", None) if idx + 1 == marks.len() && !branches.is_empty() => {
                otherwise = parse_literal(text).ok_or_else(unsupported)?;
            }
            _ => return Err(unsupported()),
        }
    }

    if branches.is_empty() || pending.is_some() {
        return Err(unsupported());
    }
    Ok(Expr::Case {
        branches,
        otherwise,
    })
}

fn parse_count(text: Option<&str>) -> Option<usize> {
    text.and_then(|t| t.split_whitespace().next())
        .and_then(|t| t.parse().ok())
}

fn column_value<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column)
        .or_else(|| {
            row.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(column))
                .map(|(_, v)| v)
        })
        .unwrap_or(&Value::Null)
}

fn eval_scalar(expr: &Expr, row: &Row) -> Value {
    match expr {
        Expr::Column(c) => column_value(row, c).clone(),
        Expr::Bucketed(bucket, c) => bucket.apply(column_value(row, c)),
        Expr::Case {
            branches,
            otherwise,
        } => branches
            .iter()
            .find(|(filters, _)| filters.iter().all(|f| filter_matches(f, row)))
            .map_or(otherwise, |(_, value)| value)
            .clone(),
        _ => Value::Null,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn number_value(x: f64) -> Value {
    if x.fract() == 0.0 && x.abs() < 9.0e15 {
        Value::from(x as i64)
    } else {
        serde_json::Number::from_f64(x)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn non_null<'a>(members: &[&'a Row], column: &str) -> Vec<&'a Value> {
    members
        .iter()
        .map(|row| column_value(*row, column))
        .filter(|v| !v.is_null())
        .collect()
}

fn eval_aggregate(expr: &Expr, members: &[&Row]) -> Value {
    let values = |c: &str| non_null(members, c);

    match expr {
        Expr::CountAll => Value::from(members.len() as u64),
        Expr::Count(c) => Value::from(values(c).len() as u64),
        Expr::CountDistinct(c) => {
            let distinct: HashSet<String> = values(c).iter().map(|v| v.to_string()).collect();
            Value::from(distinct.len() as u64)
        }
        Expr::Sum(c) => {
            let nums: Vec<f64> = values(c).into_iter().filter_map(as_number).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                number_value(nums.iter().sum())
            }
        }
        Expr::Avg(c) => {
            let nums: Vec<f64> = values(c).into_iter().filter_map(as_number).collect();
            if nums.is_empty() {
                Value::Null
            } else {
                number_value(nums.iter().sum::<f64>() / nums.len() as f64)
            }
        }
        Expr::Min(c) => values(c)
            .into_iter()
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Expr::Max(c) => values(c)
            .into_iter()
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        scalar => members
            .first()
            .map(|row| eval_scalar(scalar, row))
            .unwrap_or(Value::Null),
    }
}

/// Total order: nulls first, then numbers, then strings
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => value_text(a).cmp(&value_text(b)),
        },
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// SQL LIKE with `%` and `_`; case-insensitive like SQLite's default
pub fn like_matches(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '%' {
        pi += 1;
    }
    pi == p.len()
}

/// Client-side evaluation of a structured filter
pub fn filter_matches(filter: &Filter, row: &Row) -> bool {
    let value = column_value(row, &filter.column);
    match filter.op {
        FilterOp::Is => {
            let wants_not_null = filter
                .value
                .as_str()
                .is_some_and(|s| s.eq_ignore_ascii_case("not null"));
            value.is_null() != wants_not_null
        }
        _ if value.is_null() => false,
        FilterOp::Eq => compare_values(value, &filter.value) == Ordering::Equal,
        FilterOp::Neq => compare_values(value, &filter.value) != Ordering::Equal,
        FilterOp::Gt => compare_values(value, &filter.value) == Ordering::Greater,
        FilterOp::Gte => compare_values(value, &filter.value) != Ordering::Less,
        FilterOp::Lt => compare_values(value, &filter.value) == Ordering::Less,
        FilterOp::Lte => compare_values(value, &filter.value) != Ordering::Greater,
        FilterOp::Like | FilterOp::Ilike => {
            like_matches(&value_text(&filter.value), &value_text(value))
        }
        FilterOp::In => filter
            .value
            .as_array()
            .is_some_and(|items| items.iter().any(|v| compare_values(value, v) == Ordering::Equal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse::split_clauses;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        [
            json!({"id": 1, "city": "Recife", "email": "a@x.com", "total": 10, "created_at": "2024-01-15"}),
            json!({"id": 2, "city": "recife", "email": "b@x.com", "total": 20.5, "created_at": "2024-01-20"}),
            json!({"id": 3, "city": "Natal", "email": "a@x.com", "total": 5, "created_at": "2024-02-03"}),
            json!({"id": 4, "city": "Natal", "email": null, "total": 7, "created_at": "2024-03-09"}),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
    }

    fn scan(sql: &str) -> Vec<Row> {
        let clauses = split_clauses(sql).unwrap();
        ScanPlan::from_clauses(sql, &clauses, "t".into())
            .unwrap()
            .run(rows())
            .unwrap()
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    #[test]
    fn test_group_by_count() {
        let out = scan("SELECT city, COUNT(*) AS n FROM t GROUP BY city ORDER BY n DESC, city");
        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["city"], json!("Natal"));
        assert_eq!(out[0]["n"], json!(2));
    }

    #[test]
    fn test_count_distinct() {
        let out = scan("SELECT COUNT(DISTINCT email) FROM t");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["COUNT(DISTINCT email)"], json!(2));
    }

    #[test]
    fn test_sum_avg_min_max() {
        let out = scan("select sum(total) as s, avg(total) as a, min(total) as lo, max(total) as hi from t");
        assert_eq!(out[0]["s"], json!(42.5));
        assert_eq!(out[0]["lo"], json!(5));
        assert_eq!(out[0]["hi"], json!(20.5));
    }

    #[test]
    fn test_date_trunc_buckets() {
        let out = scan(
            "SELECT date_trunc('month', created_at) AS month, COUNT(*) AS n FROM t GROUP BY month ORDER BY month",
        );
        let months: Vec<&Value> = out.iter().map(|r| &r["month"]).collect();
        assert_eq!(months, vec![&json!("2024-01-01"), &json!("2024-02-01"), &json!("2024-03-01")]);
        assert_eq!(out[0]["n"], json!(2));
    }

    #[test]
    fn test_week_bucket_starts_monday() {
        // 2024-01-20 is a Saturday
        assert_eq!(Bucket::Week.apply(&json!("2024-01-20T10:00:00")), json!("2024-01-15"));
        assert_eq!(Bucket::Year.apply(&json!("2024-05-02")), json!("2024-01-01"));
        assert_eq!(Bucket::Day.apply(&json!(5)), json!(null));
    }

    #[test]
    fn test_case_when_categories() {
        let out = scan(
            "SELECT id, CASE WHEN total >= 10 AND city = 'Recife' THEN 'alto' WHEN total >= 7 THEN 'médio' ELSE 'baixo' END AS faixa FROM t ORDER BY id",
        );
        let tiers: Vec<&Value> = out.iter().map(|r| &r["faixa"]).collect();
        assert_eq!(tiers, vec![&json!("alto"), &json!("médio"), &json!("baixo"), &json!("médio")]);
    }

    #[test]
    fn test_group_by_case_alias() {
        let out = scan(
            "SELECT CASE WHEN total > 6 THEN 'high' END AS tier, COUNT(*) AS n, SUM(total) AS s FROM t GROUP BY tier ORDER BY n DESC",
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["tier"], json!("high"));
        assert_eq!(out[0]["n"], json!(3));
        assert_eq!(out[0]["s"], json!(37.5));
        assert_eq!(out[1]["tier"], json!(null));
    }

    #[test]
    fn test_group_by_written_out_case() {
        let out = scan(
            "SELECT COUNT(*) AS n FROM t GROUP BY CASE WHEN created_at < '2024-02-01' THEN 'jan' ELSE 'later' END",
        );
        let counts: Vec<&Value> = out.iter().map(|r| &r["n"]).collect();
        assert_eq!(counts, vec![&json!(2), &json!(2)]);
    }

    #[test]
    fn test_empty_table_aggregate_yields_row() {
        let sql = "SELECT COUNT(*) AS n FROM t";
        let clauses = split_clauses(sql).unwrap();
        let out = ScanPlan::from_clauses(sql, &clauses, "t".into())
            .unwrap()
            .run(Vec::new())
            .unwrap();
        assert_eq!(out, vec![json!({"n": 0}).as_object().cloned().unwrap()]);
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    #[test]
    fn test_ilike_filter_case_insensitive() {
        let out = scan("SELECT id FROM t WHERE city ILIKE 'rec%' ORDER BY id");
        assert_eq!(out.len(), 2);
        assert_eq!(out[1]["id"], json!(2));
    }

    #[test]
    fn test_distinct() {
        let out = scan("SELECT DISTINCT email FROM t WHERE email IS NOT NULL");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_unsupported_constructs() {
        for sql in [
            "SELECT * FROM t JOIN u ON t.id = u.id",
            "SELECT CASE city WHEN 'Natal' THEN 1 ELSE 0 END FROM t",
            "SELECT CASE WHEN total > 5 OR id = 1 THEN 1 END FROM t",
            "SELECT city FROM t WHERE a = 1 OR b = 2",
            "SELECT city, COUNT(*) FROM t GROUP BY city HAVING COUNT(*) > 1",
        ] {
            let clauses = split_clauses(sql).unwrap();
            assert!(
                matches!(
                    ScanPlan::from_clauses(sql, &clauses, "t".into()),
                    Err(TabulaError::Translation(_))
                ),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_like_matches() {
        assert!(like_matches("%ana%", "Mariana"));
        assert!(like_matches("a_c", "ABC"));
        assert!(!like_matches("a_c", "abbc"));
        assert!(like_matches("%", ""));
        assert!(!like_matches("x%", "yx"));
    }
}
