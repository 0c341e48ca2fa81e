// crates/tabula-server/src/sql/translator.rs
// Maps validated SELECT text onto backend calls

use super::parse::{
    Clauses, bare_identifier, from_table, guard_table, mask_literals, parse_condition,
    source_tables, split_alias, split_clauses, split_conjunction, split_top_level,
};
use super::scan::ScanPlan;
use super::validator::ValidatedSql;
use crate::error::{Result, TabulaError};
use crate::store::{Filter, OrderBy, QueryExecutor, Row, StructuredQuery};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, warn};

/// Rows returned by a structured select without an explicit LIMIT
pub const DEFAULT_LIMIT: usize = 100;

/// Constructs the structured builder cannot express
#[allow(clippy::expect_used)]
static COMPLEX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bgroup\s+by\b|\bhaving\b|\bcase\s+when\b|\bcount\s*\(\s*distinct\b|\bdate_trunc\b|\bilike\b|\bjoin\b|^\s*select\s+distinct\b|\(\s*select\b|\bunion\b|\bintersect\b|\bexcept\b",
    )
    .expect("valid complex-construct regex")
});

#[allow(clippy::expect_used)]
static COUNT_ALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^count\s*\(\s*(?:\*|1)\s*\)$").expect("valid count regex")
});

/// One executable step against the data store
#[derive(Debug, Clone, PartialEq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    /// Count-only call; the single output column is named `label`
    Count {
        table: String,
        filters: Vec<Filter>,
        label: String,
    },
    Select(StructuredQuery),
    /// The backend runs the statement as-is
    RawRead { table: String, sql: ValidatedSql },
    /// Whole-table pull evaluated client-side
    Scan(ScanPlan),
}

impl Operation {
    pub fn table(&self) -> &str {
        match self {
            Self::Count { table, .. } | Self::RawRead { table, .. } => table,
            Self::Select(query) => &query.table,
            Self::Scan(plan) => &plan.table,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.into()
    }

    /// Run against a backend
    pub async fn run(self, executor: &dyn QueryExecutor) -> Result<Vec<Row>> {
        match self {
            Self::Count {
                table,
                filters,
                label,
            } => {
                let n = executor.count(&table, &filters).await?;
                let mut row = Row::new();
                row.insert(label, Value::from(n));
                Ok(vec![row])
            }
            Self::Select(query) => executor.select(&query).await,
            Self::RawRead { sql, .. } => executor.raw_read(&sql).await,
            Self::Scan(plan) => {
                let started = Instant::now();
                let rows = executor
                    .select(&StructuredQuery {
                        limit: None,
                        ..StructuredQuery::table(plan.table.clone())
                    })
                    .await?;
                warn!(
                    table = %plan.table,
                    rows_scanned = rows.len(),
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Evaluating query client-side over the whole table"
                );
                plan.run(rows)
            }
        }
    }
}

/// Translate validated SQL into an operation. `raw_available` says whether the
/// backend accepts the statement verbatim for constructs the builder lacks.
pub fn translate(sql: &ValidatedSql, raw_available: bool) -> Result<Operation> {
    let masked = mask_literals(sql.as_str());

    let mut sources = Vec::new();
    for raw in source_tables(&masked) {
        sources.push(guard_table(&raw)?);
    }

    let clauses = split_clauses(sql.as_str())?;
    let complex = COMPLEX_RE.is_match(&masked);

    if !complex && let Some(op) = structured(&clauses)? {
        return Ok(op);
    }

    if raw_available {
        let table = sources
            .into_iter()
            .next()
            .ok_or_else(|| TabulaError::Translation("statement reads no table".into()))?;
        return Ok(Operation::RawRead {
            table,
            sql: sql.clone(),
        });
    }

    let table = from_table(&clauses.from)?;
    ScanPlan::from_clauses(sql.as_str(), &clauses, table).map(Operation::Scan)
}

/// Rows from an executed statement and the table it actually read
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub table: String,
    pub rows: Vec<Row>,
}

/// Translate and run in one step
pub async fn execute(sql: &ValidatedSql, executor: &dyn QueryExecutor) -> Result<Executed> {
    let op = translate(sql, executor.supports_raw_read())?;
    let table = op.table().to_string();
    debug!(kind = op.kind(), table = %table, "Executing operation");
    let rows = op.run(executor).await?;
    Ok(Executed { table, rows })
}

/// The builder path. `Ok(None)` means the statement needs raw read or scan.
fn structured(clauses: &Clauses) -> Result<Option<Operation>> {
    let table = from_table(&clauses.from)?;

    let filters = match &clauses.where_ {
        Some(body) => {
            let Some(parts) = split_conjunction(body) else {
                return Ok(None);
            };
            let parsed: Option<Vec<Filter>> = parts.iter().map(|p| parse_condition(p)).collect();
            match parsed {
                Some(filters) => filters,
                None => return Ok(None),
            }
        }
        None => Vec::new(),
    };

    let items = split_top_level(&clauses.select, ',');

    // Bare COUNT(*)
    if let [item] = items.as_slice() {
        let (expr, alias) = split_alias(item);
        if COUNT_ALL_RE.is_match(&expr) {
            return Ok(Some(Operation::Count {
                table,
                filters,
                label: alias.unwrap_or(expr),
            }));
        }
    }

    let mut columns = Vec::new();
    for item in &items {
        let (expr, alias) = split_alias(item);
        if alias.is_some() {
            return Ok(None);
        }
        if expr == "*" {
            continue;
        }
        match bare_identifier(&expr) {
            Some(column) if !expr.contains('(') => columns.push(column),
            _ => return Ok(None),
        }
    }
    if items.iter().any(|i| i.trim() == "*") && !columns.is_empty() {
        return Ok(None);
    }

    let mut order = Vec::new();
    if let Some(body) = &clauses.order_by {
        for item in split_top_level(body, ',') {
            let mut words = item.split_whitespace();
            let Some(column) = words.next().and_then(bare_identifier) else {
                return Ok(None);
            };
            let descending = match words.next().map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(_) => return Ok(None),
            };
            if words.next().is_some() {
                return Ok(None);
            }
            order.push(OrderBy { column, descending });
        }
    }

    let Some(limit) = parse_bound(clauses.limit.as_deref(), DEFAULT_LIMIT) else {
        return Ok(None);
    };
    let Some(offset) = parse_bound(clauses.offset.as_deref(), 0) else {
        return Ok(None);
    };

    Ok(Some(Operation::Select(StructuredQuery {
        table,
        columns,
        filters,
        order,
        limit: Some(limit),
        offset,
    })))
}

fn parse_bound(text: Option<&str>, default: usize) -> Option<usize> {
    match text {
        None => Some(default),
        Some(t) => t.trim().parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::validate;
    use crate::store::{DataStore, FilterOp};
    use serde_json::json;

    fn op(sql: &str, raw: bool) -> Result<Operation> {
        translate(&validate(sql).unwrap(), raw)
    }

    async fn seeded(raw_reads: bool) -> DataStore {
        let store = DataStore::open_in_memory().await.unwrap().with_raw_reads(raw_reads);
        store
            .execute_batch(
                "CREATE TABLE orders (id INTEGER PRIMARY KEY, status TEXT, total REAL, created_at TEXT);
                 INSERT INTO orders (status, total, created_at) VALUES
                    ('paid', 10.0, '2024-01-03'),
                    ('PAID', 15.5, '2024-01-28'),
                    ('open', 7.0, '2024-02-11'),
                    ('paid', 2.5, '2024-03-01');",
            )
            .await
            .unwrap();
        store
    }

    // ========================================================================
    // Structured path
    // ========================================================================

    #[test]
    fn test_bare_count() {
        let op = op("SELECT COUNT(*) FROM clients", true).unwrap();
        assert_eq!(
            op,
            Operation::Count {
                table: "clients".into(),
                filters: vec![],
                label: "COUNT(*)".into(),
            }
        );
    }

    #[test]
    fn test_count_with_filter_and_alias() {
        match op("select count(*) as total from orders where status = 'paid'", true).unwrap() {
            Operation::Count { filters, label, .. } => {
                assert_eq!(label, "total");
                assert_eq!(filters, vec![Filter::new("status", FilterOp::Eq, json!("paid"))]);
            }
            other => panic!("expected count, got {other:?}"),
        }
    }

    #[test]
    fn test_select_with_filters_order_limit() {
        let op = op(
            "SELECT id, total FROM orders WHERE total >= 5 AND status IN ('paid', 'open') ORDER BY total DESC LIMIT 10 OFFSET 20",
            true,
        )
        .unwrap();
        let Operation::Select(q) = op else {
            panic!("expected select");
        };
        assert_eq!(q.columns, vec!["id", "total"]);
        assert_eq!(q.filters.len(), 2);
        assert_eq!(q.filters[1].op, FilterOp::In);
        assert_eq!(q.order, vec![OrderBy { column: "total".into(), descending: true }]);
        assert_eq!(q.limit, Some(10));
        assert_eq!(q.offset, 20);
    }

    #[test]
    fn test_default_limit() {
        let Operation::Select(q) = op("SELECT * FROM orders", true).unwrap() else {
            panic!("expected select");
        };
        assert!(q.columns.is_empty());
        assert_eq!(q.limit, Some(DEFAULT_LIMIT));
    }

    // ========================================================================
    // Complex constructs
    // ========================================================================

    #[test]
    fn test_complex_prefers_raw_read() {
        for sql in [
            "SELECT status, COUNT(*) FROM orders GROUP BY status",
            "SELECT COUNT(DISTINCT status) FROM orders",
            "SELECT * FROM orders WHERE status ILIKE 'paid'",
            "SELECT o.id FROM orders o JOIN clients c ON c.id = o.client_id",
            "SELECT id FROM orders WHERE status = 'paid' OR total > 3",
        ] {
            assert_eq!(op(sql, true).unwrap().kind(), "raw_read", "{sql}");
        }
    }

    #[test]
    fn test_complex_without_raw_read_scans() {
        let op = op("SELECT status, COUNT(*) AS n FROM orders GROUP BY status", false).unwrap();
        assert_eq!(op.kind(), "scan");
        assert_eq!(op.table(), "orders");
    }

    #[test]
    fn test_join_without_raw_read_is_untranslatable() {
        let err = op("SELECT * FROM orders JOIN clients ON clients.id = orders.client_id", false)
            .unwrap_err();
        assert!(matches!(err, TabulaError::Translation(_)));
    }

    #[test]
    fn test_table_guard_on_every_path() {
        for (sql, raw) in [
            ("SELECT * FROM sqlite_master", true),
            ("SELECT COUNT(*) FROM main.orders", true),
            ("SELECT * FROM orders JOIN sqlite_schema ON 1 = 1", true),
            ("SELECT * FROM orders WHERE id IN (SELECT id FROM pg_user)", true),
            ("SELECT * FROM information_schema", false),
        ] {
            assert!(
                matches!(op(sql, raw), Err(TabulaError::Translation(_))),
                "{sql}"
            );
        }
    }

    #[test]
    fn test_table_guard_covers_comma_joined_from() {
        for sql in [
            "SELECT tbl_name, sql, COUNT(*) FROM clients, sqlite_master GROUP BY tbl_name",
            "SELECT * FROM orders, main.clients WHERE orders.id = 1",
            "SELECT COUNT(*) FROM orders WHERE id IN (SELECT rowid FROM orders, sqlite_schema)",
        ] {
            for raw in [true, false] {
                assert!(
                    matches!(op(sql, raw), Err(TabulaError::Translation(_))),
                    "{sql} raw={raw}"
                );
            }
        }
    }

    #[test]
    fn test_comma_joined_user_tables_read_raw() {
        let op = op("SELECT COUNT(*) FROM orders, orders AS o2 GROUP BY orders.status", true).unwrap();
        assert_eq!(op.kind(), "raw_read");
        assert_eq!(op.table(), "orders");
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[tokio::test]
    async fn test_execute_refuses_catalog_in_from_list() {
        let store = seeded(true).await;
        let sql = validate("SELECT tbl_name, sql, COUNT(*) FROM orders, sqlite_master GROUP BY tbl_name")
            .unwrap();
        assert!(matches!(
            execute(&sql, &store).await,
            Err(TabulaError::Translation(_))
        ));
    }

    #[tokio::test]
    async fn test_execute_count() {
        let store = seeded(true).await;
        let executed = execute(&validate("SELECT COUNT(*) FROM orders").unwrap(), &store)
            .await
            .unwrap();
        assert_eq!(executed.table, "orders");
        assert_eq!(executed.rows[0]["COUNT(*)"], json!(4));
    }

    #[tokio::test]
    async fn test_raw_and_scan_agree() {
        let sql = validate(
            "SELECT status, COUNT(*) AS n FROM orders WHERE status ILIKE 'paid' GROUP BY status ORDER BY status",
        )
        .unwrap();
        let raw = execute(&sql, &seeded(true).await).await.unwrap().rows;
        let scanned = execute(&sql, &seeded(false).await).await.unwrap().rows;

        let total = |rows: &[Row]| rows.iter().filter_map(|r| r["n"].as_u64()).sum::<u64>();
        assert_eq!(total(&raw), 3);
        assert_eq!(total(&scanned), 3);
    }

    #[tokio::test]
    async fn test_scan_date_bucketing() {
        let sql = validate(
            "SELECT date_trunc('month', created_at) AS month, SUM(total) AS revenue FROM orders GROUP BY month ORDER BY month",
        )
        .unwrap();
        let rows = execute(&sql, &seeded(false).await).await.unwrap().rows;
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["month"], json!("2024-01-01"));
        assert_eq!(rows[0]["revenue"], json!(25.5));
    }

    #[tokio::test]
    async fn test_scan_counts_every_row_of_large_table() {
        let store = DataStore::open_in_memory().await.unwrap().with_raw_reads(false);
        store
            .execute_batch(
                "CREATE TABLE visits (id INTEGER PRIMARY KEY, city TEXT);
                 WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 60000)
                 INSERT INTO visits (city) SELECT CASE n % 3 WHEN 0 THEN 'Natal' ELSE 'Recife' END FROM seq;",
            )
            .await
            .unwrap();

        let sql = validate("SELECT city, COUNT(*) AS n FROM visits GROUP BY city ORDER BY city").unwrap();
        let executed = execute(&sql, &store).await.unwrap();
        assert_eq!(executed.table, "visits");
        assert_eq!(executed.rows.len(), 2);
        assert_eq!(executed.rows[0]["city"], json!("Natal"));
        assert_eq!(executed.rows[0]["n"], json!(20000));
        assert_eq!(executed.rows[1]["n"], json!(40000));
    }
}
