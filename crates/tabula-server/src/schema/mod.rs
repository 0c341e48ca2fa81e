// crates/tabula-server/src/schema/mod.rs
// Time-bounded memoization of table schemas and the table inventory

use crate::error::{Result, TabulaError};
use crate::store::{Row, SchemaIntrospector};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default freshness window
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of sample rows kept per table
pub const DEFAULT_SAMPLE_ROWS: usize = 3;

const MAX_TABLES: u64 = 1024;

/// Cached description of one table
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaCacheEntry {
    pub table_name: String,
    pub column_names: Vec<String>,
    pub row_count_hint: u64,
    /// At most `sample_rows` rows
    pub sample_rows: Vec<Row>,
    pub cached_at: DateTime<Utc>,
}

impl SchemaCacheEntry {
    /// Compact text form used in prompts
    pub fn describe(&self) -> String {
        let mut out = format!(
            "table {} (~{} rows): {}",
            self.table_name,
            self.row_count_hint,
            self.column_names.join(", ")
        );
        for row in &self.sample_rows {
            out.push_str("\n  sample: ");
            out.push_str(&serde_json::Value::Object(row.clone()).to_string());
        }
        out
    }
}

/// Schema cache over a [`SchemaIntrospector`].
///
/// Entries expire after the TTL and are never served stale. Concurrent
/// misses for the same table share one load.
#[derive(Clone)]
pub struct SchemaCache {
    introspector: Arc<dyn SchemaIntrospector>,
    entries: Cache<String, Arc<SchemaCacheEntry>>,
    inventory: Cache<(), Arc<Vec<String>>>,
    sample_rows: usize,
}

impl SchemaCache {
    pub fn new(introspector: Arc<dyn SchemaIntrospector>) -> Self {
        Self::with_settings(introspector, DEFAULT_TTL, DEFAULT_SAMPLE_ROWS)
    }

    pub fn with_settings(
        introspector: Arc<dyn SchemaIntrospector>,
        ttl: Duration,
        sample_rows: usize,
    ) -> Self {
        Self {
            introspector,
            entries: Cache::builder()
                .max_capacity(MAX_TABLES)
                .time_to_live(ttl)
                .build(),
            inventory: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            sample_rows,
        }
    }

    /// Table names, cached under the same TTL
    pub async fn tables(&self) -> Result<Vec<String>> {
        let introspector = self.introspector.clone();
        let tables = self
            .inventory
            .try_get_with((), async move {
                debug!("Loading table inventory");
                introspector.list_tables().await.map(Arc::new)
            })
            .await
            .map_err(unshare)?;
        Ok(tables.as_ref().clone())
    }

    /// Fresh entry for `table`, loading it on miss or expiry
    pub async fn get(&self, table: &str) -> Result<Arc<SchemaCacheEntry>> {
        let introspector = self.introspector.clone();
        let sample_rows = self.sample_rows;
        let name = table.to_string();

        self.entries
            .try_get_with(table.to_string(), async move {
                debug!(table = %name, "Loading table schema");
                let column_names = introspector.list_columns(&name).await?;
                let row_count_hint = introspector.row_count(&name).await?;
                let mut sample = introspector.sample(&name, sample_rows).await?;
                sample.truncate(sample_rows);
                Ok::<_, TabulaError>(Arc::new(SchemaCacheEntry {
                    table_name: name,
                    column_names,
                    row_count_hint,
                    sample_rows: sample,
                    cached_at: Utc::now(),
                }))
            })
            .await
            .map_err(unshare)
    }

    /// Drop everything (e.g. after the underlying data changed)
    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
        self.inventory.invalidate_all();
    }
}

/// Loader errors come back shared; rebuild an owned error
fn unshare(err: Arc<TabulaError>) -> TabulaError {
    match err.as_ref() {
        TabulaError::UnknownTable(t) => TabulaError::UnknownTable(t.clone()),
        TabulaError::NoProviders => TabulaError::NoProviders,
        other => TabulaError::Execution(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        column_calls: AtomicUsize,
        table_calls: AtomicUsize,
    }

    #[async_trait]
    impl SchemaIntrospector for Counting {
        async fn list_tables(&self) -> Result<Vec<String>> {
            self.table_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["orders".into()])
        }

        async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
            self.column_calls.fetch_add(1, Ordering::SeqCst);
            if table == "orders" {
                Ok(vec!["id".into(), "total".into()])
            } else {
                Err(TabulaError::UnknownTable(table.into()))
            }
        }

        async fn sample(&self, _table: &str, _n: usize) -> Result<Vec<Row>> {
            let row = json!({"id": 1, "total": 10.5});
            Ok(vec![row.as_object().cloned().unwrap_or_default(); 5])
        }

        async fn row_count(&self, _table: &str) -> Result<u64> {
            Ok(5)
        }
    }

    #[tokio::test]
    async fn test_two_calls_within_ttl_introspect_once() {
        let counting = Arc::new(Counting::default());
        let cache = SchemaCache::new(counting.clone());

        let first = cache.get("orders").await.unwrap();
        let second = cache.get("orders").await.unwrap();

        assert_eq!(counting.column_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.cached_at, second.cached_at);
        assert_eq!(first.sample_rows.len(), DEFAULT_SAMPLE_ROWS);
        assert_eq!(first.row_count_hint, 5);
    }

    #[tokio::test]
    async fn test_expired_entry_is_reloaded() {
        let counting = Arc::new(Counting::default());
        let cache = SchemaCache::with_settings(counting.clone(), Duration::from_millis(50), 1);

        cache.get("orders").await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        cache.get("orders").await.unwrap();

        assert_eq!(counting.column_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_table_error_is_preserved() {
        let cache = SchemaCache::new(Arc::new(Counting::default()));
        assert!(matches!(
            cache.get("missing").await,
            Err(TabulaError::UnknownTable(t)) if t == "missing"
        ));
    }

    #[tokio::test]
    async fn test_inventory_cached() {
        let counting = Arc::new(Counting::default());
        let cache = SchemaCache::new(counting.clone());
        assert_eq!(cache.tables().await.unwrap(), vec!["orders"]);
        cache.tables().await.unwrap();
        assert_eq!(counting.table_calls.load(Ordering::SeqCst), 1);

        cache.invalidate_all();
        cache.tables().await.unwrap();
        assert_eq!(counting.table_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_describe() {
        let entry = SchemaCacheEntry {
            table_name: "orders".into(),
            column_names: vec!["id".into(), "total".into()],
            row_count_hint: 12,
            sample_rows: vec![],
            cached_at: Utc::now(),
        };
        assert_eq!(entry.describe(), "table orders (~12 rows): id, total");
    }
}
