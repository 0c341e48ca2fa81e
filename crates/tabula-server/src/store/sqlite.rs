// crates/tabula-server/src/store/sqlite.rs
// SQLite-backed data store using deadpool-sqlite
//
// All access goes through `interact()`, which runs the closure on the pool's
// blocking thread. File databases are opened with `PRAGMA query_only`; raw
// statements are additionally checked with `Statement::readonly()`.
//
// In-memory stores use a shared-cache URI so every pooled connection sees the
// same data (`file:tabula_<uuid>?mode=memory&cache=shared`).

use super::{Filter, FilterOp, QueryExecutor, Row, SchemaIntrospector, StructuredQuery};
use crate::error::{Result, TabulaError};
use crate::sql::ValidatedSql;
use async_trait::async_trait;
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use regex::Regex;
use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Upper bound on rows materialized by a raw read or a limited select.
/// Unlimited selects feed client-side evaluation and are never truncated.
const MAX_ROWS: usize = 50_000;

#[allow(clippy::expect_used)]
static ILIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bilike\b").expect("valid ilike regex"));

#[allow(clippy::expect_used)]
static DATE_TRUNC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdate_trunc\s*\(\s*'(\w+)'\s*,\s*([^()]+?)\s*\)").expect("valid date_trunc regex")
});

/// Pooled SQLite store implementing both data-store capabilities.
pub struct DataStore {
    pool: Pool,
    path: Option<PathBuf>,
    raw_reads: bool,
}

enum Storage {
    File(PathBuf),
    InMemory,
}

impl DataStore {
    /// Open an existing database file read-only.
    pub async fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TabulaError::Config(format!(
                "database not found: {}",
                path.display()
            )));
        }
        Self::open_internal(Storage::File(path.to_path_buf()))
    }

    /// Open an empty in-memory database. Writable, so callers can seed it.
    pub async fn open_in_memory() -> Result<Self> {
        Self::open_internal(Storage::InMemory)
    }

    fn open_internal(storage: Storage) -> Result<Self> {
        let (conn_str, path, hook) = match storage {
            Storage::File(p) => {
                let s = p.to_string_lossy().into_owned();
                (s, Some(p), make_post_create_hook(true))
            }
            Storage::InMemory => {
                let uri = format!(
                    "file:tabula_{}?mode=memory&cache=shared",
                    uuid::Uuid::new_v4().simple()
                );
                (uri, None, make_post_create_hook(false))
            }
        };

        let pool = Config::new(&conn_str)
            .builder(Runtime::Tokio1)
            .map_err(|e| TabulaError::Config(format!("failed to create pool builder: {e}")))?
            .max_size(8)
            .post_create(hook)
            .build()
            .map_err(|e| TabulaError::Config(format!("failed to build connection pool: {e}")))?;

        Ok(Self {
            pool,
            path,
            raw_reads: true,
        })
    }

    /// Enable or disable the raw-read escape hatch
    pub fn with_raw_reads(mut self, enabled: bool) -> Self {
        self.raw_reads = enabled;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a batch of statements. Fails on read-only file databases.
    pub async fn execute_batch(&self, sql: &str) -> Result<()> {
        let sql = sql.to_string();
        self.interact(move |conn| Ok(conn.execute_batch(&sql)?)).await
    }

    /// Run a closure with a pooled connection on the blocking thread pool.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| TabulaError::Execution(format!("failed to get connection: {e}")))?;

        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| TabulaError::Execution(format!("interact failed: {e}")))?
    }
}

fn make_post_create_hook(read_only: bool) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        Box::pin(async move {
            conn.interact(move |conn| {
                conn.execute_batch("PRAGMA busy_timeout=5000;")?;
                if read_only {
                    conn.execute_batch("PRAGMA query_only=ON;")?;
                }
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
            })?
            .map_err(|e| {
                deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into())
            })
        })
    })
}

// ============================================================================
// Sync helpers (run inside interact)
// ============================================================================

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
         ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Resolve a table name case-insensitively against the live inventory
fn ensure_table(conn: &Connection, table: &str) -> Result<String> {
    table_names(conn)?
        .into_iter()
        .find(|t| t.eq_ignore_ascii_case(table))
        .ok_or_else(|| TabulaError::UnknownTable(table.to_string()))
}

/// Resolve a column name case-insensitively against the table's columns
fn ensure_column(columns: &[String], table: &str, column: &str) -> Result<String> {
    columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(column))
        .cloned()
        .ok_or_else(|| TabulaError::Execution(format!("unknown column {column} in {table}")))
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

/// Build `WHERE ...` for conjunctive filters, pushing bound parameters
fn where_clause(
    filters: &[Filter],
    columns: &[String],
    table: &str,
    params: &mut Vec<SqlValue>,
) -> Result<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }

    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = quote_ident(&ensure_column(columns, table, &filter.column)?);
        let part = match filter.op {
            FilterOp::In => {
                let values = filter.value.as_array().cloned().unwrap_or_else(|| vec![filter.value.clone()]);
                if values.is_empty() {
                    "1 = 0".to_string()
                } else {
                    let placeholders = vec!["?"; values.len()].join(", ");
                    params.extend(values.iter().map(json_to_sql));
                    format!("{column} IN ({placeholders})")
                }
            }
            FilterOp::Is => {
                let negated = filter
                    .value
                    .as_str()
                    .is_some_and(|s| s.trim().eq_ignore_ascii_case("not null"));
                if negated {
                    format!("{column} IS NOT NULL")
                } else {
                    format!("{column} IS NULL")
                }
            }
            FilterOp::Ilike => {
                params.push(json_to_sql(&filter.value));
                format!("LOWER({column}) LIKE LOWER(?)")
            }
            op => {
                params.push(json_to_sql(&filter.value));
                format!("{column} {} ?", op.sql())
            }
        };
        parts.push(part);
    }

    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn collect_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[SqlValue],
    cap: Option<usize>,
) -> Result<Vec<Row>> {
    let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        if let Some(cap) = cap
            && out.len() >= cap
        {
            warn!(max_rows = cap, "Row cap reached, truncating result");
            break;
        }
        let mut map = Row::new();
        for (idx, name) in names.iter().enumerate() {
            map.insert(name.clone(), sql_to_json(row.get_ref(idx)?));
        }
        out.push(map);
    }

    Ok(out)
}

/// Map Postgres-flavoured constructs models like to emit onto SQLite
pub fn sqlite_dialect(sql: &str) -> String {
    let sql = ILIKE_RE.replace_all(sql, "LIKE");
    DATE_TRUNC_RE
        .replace_all(&sql, |caps: &regex::Captures<'_>| {
            let expr = &caps[2];
            match caps[1].to_ascii_lowercase().as_str() {
                "year" => format!("strftime('%Y-01-01', {expr})"),
                "month" => format!("strftime('%Y-%m-01', {expr})"),
                "week" => format!("date({expr}, 'weekday 0', '-6 days')"),
                "hour" => format!("strftime('%Y-%m-%d %H:00:00', {expr})"),
                _ => format!("date({expr})"),
            }
        })
        .into_owned()
}

// ============================================================================
// Capabilities
// ============================================================================

#[async_trait]
impl SchemaIntrospector for DataStore {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.interact(table_names).await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        let table = table.to_string();
        self.interact(move |conn| {
            let table = ensure_table(conn, &table)?;
            column_names(conn, &table)
        })
        .await
    }

    async fn sample(&self, table: &str, n: usize) -> Result<Vec<Row>> {
        let table = table.to_string();
        self.interact(move |conn| {
            let table = ensure_table(conn, &table)?;
            let sql = format!("SELECT * FROM {} LIMIT ?", quote_ident(&table));
            let mut stmt = conn.prepare(&sql)?;
            collect_rows(&mut stmt, &[SqlValue::Integer(n as i64)], Some(MAX_ROWS))
        })
        .await
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        self.count(table, &[]).await
    }
}

#[async_trait]
impl QueryExecutor for DataStore {
    async fn select(&self, query: &StructuredQuery) -> Result<Vec<Row>> {
        let query = query.clone();
        self.interact(move |conn| {
            let table = ensure_table(conn, &query.table)?;
            let columns = column_names(conn, &table)?;

            let projection = if query.columns.is_empty() {
                "*".to_string()
            } else {
                query
                    .columns
                    .iter()
                    .map(|c| ensure_column(&columns, &table, c).map(|c| quote_ident(&c)))
                    .collect::<Result<Vec<_>>>()?
                    .join(", ")
            };

            let mut params = Vec::new();
            let mut sql = format!("SELECT {} FROM {}", projection, quote_ident(&table));
            sql.push_str(&where_clause(&query.filters, &columns, &table, &mut params)?);

            if !query.order.is_empty() {
                let order = query
                    .order
                    .iter()
                    .map(|o| {
                        ensure_column(&columns, &table, &o.column).map(|c| {
                            format!("{} {}", quote_ident(&c), if o.descending { "DESC" } else { "ASC" })
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                sql.push_str(" ORDER BY ");
                sql.push_str(&order.join(", "));
            }

            let cap = match query.limit {
                Some(limit) => {
                    sql.push_str(" LIMIT ? OFFSET ?");
                    params.push(SqlValue::Integer(limit as i64));
                    Some(MAX_ROWS)
                }
                None => {
                    sql.push_str(" LIMIT -1 OFFSET ?");
                    None
                }
            };
            params.push(SqlValue::Integer(query.offset as i64));

            debug!(table = %table, sql = %sql, "Structured select");
            let mut stmt = conn.prepare(&sql)?;
            collect_rows(&mut stmt, &params, cap)
        })
        .await
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        let table = table.to_string();
        let filters = filters.to_vec();
        self.interact(move |conn| {
            let table = ensure_table(conn, &table)?;
            let columns = column_names(conn, &table)?;
            let mut params = Vec::new();
            let sql = format!(
                "SELECT COUNT(*) FROM {}{}",
                quote_ident(&table),
                where_clause(&filters, &columns, &table, &mut params)?
            );
            let count: i64 = conn.query_row(
                &sql,
                rusqlite::params_from_iter(params.iter()),
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    fn supports_raw_read(&self) -> bool {
        self.raw_reads
    }

    async fn raw_read(&self, sql: &ValidatedSql) -> Result<Vec<Row>> {
        if !self.raw_reads {
            return Err(TabulaError::Execution("raw reads are disabled".into()));
        }
        let sql = sqlite_dialect(sql.as_str());
        self.interact(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            if !stmt.readonly() {
                warn!(target: "security", "Validated statement is not read-only, refusing");
                return Err(TabulaError::Security {
                    keyword: "readonly".into(),
                });
            }
            debug!(sql = %sql, "Raw read");
            collect_rows(&mut stmt, &[], Some(MAX_ROWS))
        })
        .await
    }
}
