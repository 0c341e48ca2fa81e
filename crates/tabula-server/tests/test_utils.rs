//! Test utilities for Tabula integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tabula::config::TabulaConfig;
use tabula::llm::{Completion, CompletionRequest, LlmClient, Provider, ProviderChain};
use tabula::sql::ValidatedSql;
use tabula::store::{DataStore, Filter, QueryExecutor, Row, SchemaIntrospector, StructuredQuery};
use tabula::{DataAssistant, Result};

/// Rows seeded into `clients`
pub const CLIENT_ROWS: u64 = 42;

/// LLM double answering by pipeline stage (read from the system prompt)
pub struct FakeLlm {
    provider: Provider,
    replies: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeLlm {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            replies: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, stage: &str, reply: &str) -> Self {
        self.replies.insert(stage.to_string(), reply.to_string());
        self
    }

    /// Provider that errors on every call
    pub fn failing(provider: Provider) -> Arc<Self> {
        Arc::new(Self::new(provider))
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, request: CompletionRequest) -> anyhow::Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let stage = request
            .messages
            .first()
            .and_then(|m| m.content.split("Stage: ").nth(1))
            .and_then(|rest| rest.split('.').next())
            .unwrap_or_default()
            .to_string();
        let content = self
            .replies
            .get(&stage)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("{} unavailable for stage {}", self.provider, stage))?;
        Ok(Completion {
            request_id: format!("fake-{stage}"),
            content,
            usage: None,
            duration_ms: 1,
        })
    }

    fn provider_type(&self) -> Provider {
        self.provider
    }

    fn model_name(&self) -> String {
        "fake".into()
    }
}

pub fn chain(clients: Vec<Arc<FakeLlm>>) -> ProviderChain {
    ProviderChain::new(
        clients.into_iter().map(|c| c as Arc<dyn LlmClient>).collect(),
        Duration::from_secs(2),
    )
}

/// Data store wrapper that counts introspection and records every statement
/// that reaches execution
pub struct RecordingBackend {
    pub inner: DataStore,
    pub column_loads: AtomicUsize,
    pub executed: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn column_loads(&self) -> usize {
        self.column_loads.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn record(&self, entry: String) {
        self.executed.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl SchemaIntrospector for RecordingBackend {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.inner.list_tables().await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<String>> {
        self.column_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.list_columns(table).await
    }

    async fn sample(&self, table: &str, n: usize) -> Result<Vec<Row>> {
        self.inner.sample(table, n).await
    }

    async fn row_count(&self, table: &str) -> Result<u64> {
        self.inner.row_count(table).await
    }
}

#[async_trait]
impl QueryExecutor for RecordingBackend {
    async fn select(&self, query: &StructuredQuery) -> Result<Vec<Row>> {
        self.record(format!("select {}", query.table));
        self.inner.select(query).await
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64> {
        self.record(format!("count {table}"));
        self.inner.count(table, filters).await
    }

    fn supports_raw_read(&self) -> bool {
        self.inner.supports_raw_read()
    }

    async fn raw_read(&self, sql: &ValidatedSql) -> Result<Vec<Row>> {
        self.record(format!("raw {sql}"));
        self.inner.raw_read(sql).await
    }
}

/// In-memory store with 42 `clients` and a handful of `orders`
pub async fn seeded_backend() -> Arc<RecordingBackend> {
    let store = DataStore::open_in_memory()
        .await
        .expect("Failed to create in-memory store");
    store
        .execute_batch(
            "CREATE TABLE clients (id INTEGER PRIMARY KEY, name TEXT, city TEXT, email TEXT);
             WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 42)
             INSERT INTO clients (name, city, email)
             SELECT 'client ' || n,
                    CASE WHEN n % 2 = 0 THEN 'Recife' ELSE 'Natal' END,
                    'c' || n || '@example.com'
             FROM seq;
             CREATE TABLE orders (id INTEGER PRIMARY KEY, client_id INTEGER, total REAL, created_at TEXT);
             INSERT INTO orders (client_id, total, created_at) VALUES
                (1, 120.0, '2026-01-05'), (2, 80.5, '2026-01-20'), (2, 42.0, '2026-02-11');",
        )
        .await
        .expect("Failed to seed store");

    Arc::new(RecordingBackend {
        inner: store,
        column_loads: AtomicUsize::new(0),
        executed: Mutex::new(Vec::new()),
    })
}

pub fn assistant(backend: Arc<RecordingBackend>, clients: Vec<Arc<FakeLlm>>) -> DataAssistant {
    DataAssistant::new(backend, chain(clients), &TabulaConfig::default())
}
