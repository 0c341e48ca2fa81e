// crates/tabula-server/src/orchestrator/mod.rs
// Five sequential stages: Coordinator -> Schema -> Query -> Analyst -> Formatter
//
// Every stage has a deterministic fallback, so a dead or confused provider
// degrades the answer instead of failing the turn. Only schema and execution
// errors propagate.

pub mod analyst;
pub mod coordinator;
pub mod formatter;
pub mod query;
pub mod types;

pub use coordinator::Coordination;
pub use types::{IntentResult, QueryFailure, SqlStrategy, StatementKind, classify_statement};

use crate::context::{ConversationContext, OfferedOption};
use crate::error::{Result, TabulaError};
use crate::llm::{Provider, ProviderChain};
use crate::schema::SchemaCache;
use crate::sql::translator;
use crate::store::{QueryExecutor, Row};
use crate::utils::Locale;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Confidence ceiling when the last-resort count replaced the real query
pub const DEGRADED_CONFIDENCE: u8 = 30;

/// Confidence reported with a clarification question
pub const CLARIFICATION_CONFIDENCE: u8 = 40;

/// Default number of rows rendered in a reply table
pub const DEFAULT_MAX_ROWS: usize = 20;

/// Result of one pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub content: String,
    pub intent: Option<IntentResult>,
    pub sql_used: Option<String>,
    pub statement_kind: Option<StatementKind>,
    pub table_used: Option<String>,
    pub rows: Option<Vec<Row>>,
    pub confidence: u8,
    /// Provider that produced the query (or the last stage that used one)
    pub provider: Option<Provider>,
    pub suggestions: Vec<String>,
    pub requires_clarification: bool,
    pub clarification_question: Option<String>,
    /// Choices offered in `content`
    pub options: Vec<OfferedOption>,
    /// The last-resort count stood in for the real query
    pub degraded: bool,
}

pub struct Orchestrator {
    chain: ProviderChain,
    schema: SchemaCache,
    executor: Arc<dyn QueryExecutor>,
    locale: Locale,
    max_rows: usize,
}

impl Orchestrator {
    pub fn new(chain: ProviderChain, schema: SchemaCache, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            chain,
            schema,
            executor,
            locale: Locale::default(),
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows.max(1);
        self
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn schema(&self) -> &SchemaCache {
        &self.schema
    }

    pub fn chain(&self) -> &ProviderChain {
        &self.chain
    }

    /// Run every stage for one (already context-resolved) message
    #[instrument(skip(self, context), fields(message_len = message.len()))]
    pub async fn run(&self, message: &str, context: Option<&ConversationContext>) -> Result<Outcome> {
        let started = Instant::now();
        let tables = self.schema.tables().await?;

        // 1. Coordinator
        let (intent, mut provider) =
            match coordinator::coordinate(&self.chain, message, context, &tables).await {
                Coordination::Proceed { intent, provider } => (intent, provider),
                Coordination::Clarify { question, options } => {
                    info!(stage = "coordinator", options = options.len(), "Asking for clarification");
                    return Ok(Outcome {
                        content: question.clone(),
                        confidence: CLARIFICATION_CONFIDENCE,
                        requires_clarification: true,
                        clarification_question: Some(question),
                        options,
                        ..Default::default()
                    });
                }
            };
        debug!(
            stage = "coordinator",
            category = intent.category.as_str(),
            tables = ?intent.tables_needed,
            "Intent resolved"
        );

        if intent.skip_query {
            return Ok(self.direct_reply(message, intent, provider).await);
        }

        // 2. Schema
        let mut schemas = Vec::with_capacity(intent.tables_needed.len());
        for table in &intent.tables_needed {
            schemas.push(self.schema.get(table).await?);
        }

        // 3. Query
        let (statement, kind, degraded) =
            match query::plan(&self.chain, message, &intent, &schemas, context).await {
                Ok(attempted) => {
                    provider = Some(attempted.provider);
                    (attempted.value.statement, attempted.value.kind, false)
                }
                Err(QueryFailure {
                    fallback: Some(sql),
                    ..
                }) => (sql, StatementKind::SimpleCount, true),
                Err(QueryFailure { reason, .. }) => return Err(TabulaError::Llm(reason)),
            };

        let executed = translator::execute(&statement, self.executor.as_ref()).await?;
        let rows = executed.rows;
        let table_used = Some(executed.table);
        info!(
            stage = "query",
            table = table_used.as_deref().unwrap_or("-"),
            kind = <&'static str>::from(kind),
            rows = rows.len(),
            degraded,
            "Query executed"
        );

        // 4. Analyst, only for a real query result
        let insights = if degraded || rows.is_empty() {
            Vec::new()
        } else {
            analyst::analyze(&self.chain, message, &rows, self.locale)
                .await
                .insights
        };

        // 5. Formatter
        let mut content = if rows.is_empty() {
            let facts = format!(
                "The query `{}` returned no rows from table {}.",
                statement,
                table_used.as_deref().unwrap_or("?")
            );
            let template = formatter::empty_result(table_used.as_deref(), self.locale);
            formatter::compose(&self.chain, message, &facts, template).await.0
        } else {
            formatter::tabular_reply(
                &rows,
                Some(kind),
                table_used.as_deref(),
                &insights,
                self.locale,
                self.max_rows,
            )
        };
        if degraded {
            content = format!("{}\n\n{}", degraded_note(table_used.as_deref(), self.locale), content);
        }

        let confidence = if degraded {
            intent.confidence.min(DEGRADED_CONFIDENCE)
        } else {
            intent.confidence
        };

        debug!(duration_ms = started.elapsed().as_millis() as u64, "Pipeline complete");
        Ok(Outcome {
            content,
            suggestions: formatter::suggestions(&intent, table_used.as_deref(), self.locale),
            intent: Some(intent),
            sql_used: Some(statement.into_inner()),
            statement_kind: Some(kind),
            table_used,
            rows: Some(rows),
            confidence,
            provider,
            degraded,
            ..Default::default()
        })
    }

    /// The coordinator decided no data is needed
    async fn direct_reply(
        &self,
        message: &str,
        intent: IntentResult,
        provider: Option<Provider>,
    ) -> Outcome {
        let (content, provider) = match intent.direct_answer {
            Some(ref answer) => (formatter::limit_reply(answer), provider),
            None => {
                let template = match self.locale {
                    Locale::PtBr => "Posso responder perguntas sobre as suas tabelas. Pergunte, por exemplo, quantos registros uma tabela tem.",
                    Locale::EnUs => "I can answer questions about your tables. Try asking how many records a table has.",
                };
                let (content, composed_by) = formatter::compose(
                    &self.chain,
                    message,
                    "No data query is needed for this message.",
                    template.to_string(),
                )
                .await;
                (content, composed_by.or(provider))
            }
        };

        Outcome {
            content,
            confidence: intent.confidence,
            provider,
            suggestions: formatter::suggestions(&intent, None, self.locale),
            intent: Some(intent),
            ..Default::default()
        }
    }
}

fn degraded_note(table: Option<&str>, locale: Locale) -> String {
    let table = table.unwrap_or("?");
    match locale {
        Locale::PtBr => format!(
            "Não consegui montar a consulta exata. Mostro a contagem total de **{table}**."
        ),
        Locale::EnUs => format!(
            "I could not build the exact query. Here is the total count for **{table}**."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use crate::store::DataStore;
    use std::time::Duration;

    async fn store() -> Arc<DataStore> {
        let store = DataStore::open_in_memory().await.unwrap();
        store
            .execute_batch(
                "CREATE TABLE clients (id INTEGER PRIMARY KEY, name TEXT, city TEXT);
                 INSERT INTO clients (name, city) VALUES ('Ana', 'Recife'), ('Bruno', 'Natal'), ('Caio', 'Recife');
                 CREATE TABLE orders (id INTEGER PRIMARY KEY, client_id INTEGER, total REAL);",
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    async fn orchestrator(clients: Vec<Arc<ScriptedClient>>) -> Orchestrator {
        let store = store().await;
        let chain = ProviderChain::new(
            clients.into_iter().map(|c| c as Arc<dyn crate::llm::LlmClient>).collect(),
            Duration::from_secs(1),
        );
        Orchestrator::new(chain, SchemaCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_full_run() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "aggregation", "tables": ["clients"], "confidence": 92}"#)
            .reply("query", r#"{"sql": "SELECT COUNT(*) FROM clients", "kind": "simpleCount"}"#)
            .reply("analyst", r#"{"insights": ["Três clientes cadastrados"]}"#)
            .build();
        let out = orchestrator(vec![client]).await.run("quantos clientes?", None).await.unwrap();

        assert_eq!(out.sql_used.as_deref(), Some("SELECT COUNT(*) FROM clients"));
        assert_eq!(out.statement_kind, Some(StatementKind::SimpleCount));
        assert_eq!(out.table_used.as_deref(), Some("clients"));
        assert_eq!(out.confidence, 92);
        assert_eq!(out.provider, Some(Provider::DeepSeek));
        assert!(out.content.contains("**3**"));
        assert!(out.content.contains("Três clientes cadastrados"));
        assert!(!out.degraded);
    }

    #[tokio::test]
    async fn test_query_failure_degrades_to_count() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "retrieval", "tables": ["clients"]}"#)
            .reply("query", r#"{"sql": "DROP TABLE clients"}"#)
            .reply("analyst", r#"{"insights": ["should not run"]}"#)
            .build();
        let out = orchestrator(vec![client.clone()])
            .await
            .run("liste clientes", None)
            .await
            .unwrap();

        assert!(out.degraded);
        assert_eq!(out.sql_used.as_deref(), Some("SELECT COUNT(*) FROM clients"));
        assert!(out.confidence <= DEGRADED_CONFIDENCE);
        assert!(out.content.contains("**3**"));
        assert_eq!(client.calls("analyst"), 0);
    }

    #[tokio::test]
    async fn test_clarification_when_no_table() {
        let client = ScriptedClient::new(Provider::Gemini)
            .reply("coordinator", r#"{"category": "retrieval", "tables": []}"#)
            .build();
        let out = orchestrator(vec![client]).await.run("qual o total?", None).await.unwrap();
        assert!(out.requires_clarification);
        assert_eq!(out.options.len(), 2);
        assert!(out.content.contains("(A) clients (B) orders"));
    }

    #[tokio::test]
    async fn test_empty_result_uses_template() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "retrieval", "tables": ["orders"]}"#)
            .reply("query", r#"{"sql": "SELECT * FROM orders LIMIT 10"}"#)
            .build();
        let out = orchestrator(vec![client]).await.run("liste pedidos", None).await.unwrap();
        assert_eq!(out.rows.as_deref().map(<[Row]>::len), Some(0));
        assert!(out.content.starts_with("Nenhum registro encontrado em **orders**"));
    }

    #[tokio::test]
    async fn test_table_used_follows_executed_sql() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "retrieval", "tables": ["clients", "orders"]}"#)
            .reply("query", r#"{"sql": "SELECT * FROM orders LIMIT 5"}"#)
            .build();
        let out = orchestrator(vec![client]).await.run("pedidos dos clientes", None).await.unwrap();
        assert_eq!(out.intent.as_ref().and_then(|i| i.primary_table()), Some("clients"));
        assert_eq!(out.table_used.as_deref(), Some("orders"));
        assert!(out.content.contains("**orders**"));
    }

    #[tokio::test]
    async fn test_direct_answer_skips_query() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply(
                "coordinator",
                r#"{"category": "conversational", "skip_query": true, "direct_answer": "Sou o Tabula."}"#,
            )
            .build();
        let out = orchestrator(vec![client.clone()]).await.run("quem é você?", None).await.unwrap();
        assert_eq!(out.content, "Sou o Tabula.");
        assert!(out.sql_used.is_none());
        assert_eq!(client.calls("query"), 0);
    }
}
