// crates/tabula-server/src/store/mod.rs
// Data-store capabilities consumed by the pipeline

mod sqlite;

pub use sqlite::DataStore;

use crate::error::Result;
use crate::sql::ValidatedSql;
use async_trait::async_trait;
use serde_json::Value;

pub use tabula_types::Row;

/// Structured filter operators supported by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
    In,
    Is,
}

impl FilterOp {
    /// SQL operator text
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            // SQLite LIKE is already case-insensitive for ASCII
            Self::Ilike => "LIKE",
            Self::In => "IN",
            Self::Is => "IS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    /// Scalar for most operators, array for `In`, null for `Is`
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: Value) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

/// A query-builder call: one table, optional projection, conjunctive filters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredQuery {
    pub table: String,
    /// Empty means all columns
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<OrderBy>,
    /// `None` pulls every row (scan path)
    pub limit: Option<usize>,
    pub offset: usize,
}

impl StructuredQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }
}

/// Schema discovery
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<String>>;
    async fn list_columns(&self, table: &str) -> Result<Vec<String>>;
    async fn sample(&self, table: &str, n: usize) -> Result<Vec<Row>>;
    async fn row_count(&self, table: &str) -> Result<u64>;
}

/// Read execution
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn select(&self, query: &StructuredQuery) -> Result<Vec<Row>>;
    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64>;

    /// Whether validated SQL may be run as-is
    fn supports_raw_read(&self) -> bool {
        false
    }

    async fn raw_read(&self, sql: &ValidatedSql) -> Result<Vec<Row>>;
}

/// Both capabilities behind one handle
pub trait DataBackend: SchemaIntrospector + QueryExecutor {}

impl<T: SchemaIntrospector + QueryExecutor> DataBackend for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_filter_op_parse() {
        assert_eq!(FilterOp::from_str("gte").unwrap(), FilterOp::Gte);
        assert_eq!(FilterOp::from_str("ILIKE").unwrap(), FilterOp::Ilike);
        assert!(FilterOp::from_str("between").is_err());
    }

    #[test]
    fn test_filter_op_sql() {
        assert_eq!(FilterOp::Neq.sql(), "!=");
        assert_eq!(FilterOp::Ilike.sql(), "LIKE");
        assert_eq!(FilterOp::Is.sql(), "IS");
    }

    #[test]
    fn test_structured_query_defaults() {
        let q = StructuredQuery::table("orders");
        assert_eq!(q.table, "orders");
        assert!(q.columns.is_empty());
        assert_eq!(q.limit, None);
        assert_eq!(q.offset, 0);
    }
}
