// crates/tabula-server/src/assistant.rs
// Request-level facade: fast path, context resolution, pipeline, session log

use crate::config::TabulaConfig;
use crate::context::{ContextMemory, Turn, extract_options};
use crate::error::{Result, TabulaError};
use crate::fast_path::{FastPathReply, match_fast_path};
use crate::llm::ProviderChain;
use crate::orchestrator::{Orchestrator, Outcome};
use crate::patterns::CONFIRMATION_RE;
use crate::schema::SchemaCache;
use crate::session::{SessionStore, spawn_sweeper};
use crate::store::{DataBackend, QueryExecutor, SchemaIntrospector};
use crate::utils::{Locale, now_rfc3339};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tabula_types::{
    ChatMessage, ChatRequest, ChatResponse, FieldError, MessageMetadata, MessageRole,
    SessionDetail, SessionStats, SessionSummary,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Longest accepted question, in characters
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Longest accepted client-supplied session id
pub const MAX_SESSION_ID_CHARS: usize = 128;

/// `col = 'value'` in the executed statement becomes the turn's reference value
#[allow(clippy::expect_used)]
static REFERENCE_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bwhere\b.*?=\s*'([^']{1,80})'"#).expect("valid reference value regex")
});

/// Field-level problems with an inbound request; empty when it is acceptable.
pub fn validate_request(request: &ChatRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let message = request.message.trim();
    if message.is_empty() {
        errors.push(FieldError {
            field: "message".into(),
            message: "must not be empty".into(),
        });
    } else if message.chars().count() > MAX_MESSAGE_CHARS {
        errors.push(FieldError {
            field: "message".into(),
            message: format!("must be at most {MAX_MESSAGE_CHARS} characters"),
        });
    }

    if let Some(ref id) = request.session_id
        && (id.chars().count() > MAX_SESSION_ID_CHARS || id.chars().any(char::is_whitespace))
    {
        errors.push(FieldError {
            field: "session_id".into(),
            message: format!("must be at most {MAX_SESSION_ID_CHARS} characters without whitespace"),
        });
    }
    errors
}

/// Everything a chat turn touches, behind one handle
pub struct DataAssistant {
    orchestrator: Orchestrator,
    context: Arc<ContextMemory>,
    sessions: Arc<SessionStore>,
    locale: Locale,
}

impl DataAssistant {
    pub fn new(backend: Arc<dyn DataBackend>, chain: ProviderChain, config: &TabulaConfig) -> Self {
        let introspector: Arc<dyn SchemaIntrospector> = backend.clone();
        let executor: Arc<dyn QueryExecutor> = backend;
        let schema = SchemaCache::with_settings(
            introspector,
            config.schema_ttl(),
            config.schema.sample_rows,
        );
        let locale = Locale::parse(&config.format.locale);
        let orchestrator = Orchestrator::new(chain, schema, executor)
            .with_locale(locale)
            .with_max_rows(config.format.max_rows);

        Self {
            orchestrator,
            context: Arc::new(ContextMemory::new()),
            sessions: Arc::new(SessionStore::new(
                config.session_ttl(),
                config.session.max_messages,
            )),
            locale,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn context(&self) -> &Arc<ContextMemory> {
        &self.context
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start the idle-session sweeper; it stops when `shutdown` turns true.
    pub fn spawn_sweeper(&self, interval: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        spawn_sweeper(self.sessions.clone(), self.context.clone(), interval, shutdown)
    }

    /// Answer one message
    #[instrument(skip(self, request), fields(session = request.session_id.as_deref().unwrap_or("-")))]
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let errors = validate_request(&request);
        if !errors.is_empty() {
            let detail: Vec<String> = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(TabulaError::InvalidInput(detail.join("; ")));
        }

        let started = Instant::now();
        let message = request.message.trim().to_string();
        let session_id = self.sessions.create_or_get(request.session_id.as_deref());
        let tables = self.orchestrator.schema().tables().await.unwrap_or_else(|e| {
            warn!(error = %e, "Table inventory unavailable");
            Vec::new()
        });

        if let Some(reply) = match_fast_path(&message, &tables) {
            info!(kind = <&'static str>::from(reply.kind), "Fast path reply");
            let response = self.fast_path_response(&session_id, reply, started);
            self.log_exchange(&session_id, &message, &response);
            return Ok(response);
        }

        // A bare confirmation replays the previous intent in the coordinator
        let resolved = if CONFIRMATION_RE.is_match(&message) {
            message.clone()
        } else {
            match self.context.resolve_option_choice(&session_id, &message) {
                Some(choice) => choice.message,
                None => self.context.resolve_references(&session_id, &message, &tables),
            }
        };
        if resolved != message {
            info!(resolved = %resolved, "Rewrote follow-up");
        }

        let context = self.context.snapshot(&session_id);
        let response = match self.orchestrator.run(&resolved, context.as_ref()).await {
            Ok(outcome) => {
                self.remember(&session_id, &resolved, &outcome, &tables);
                self.respond(&session_id, outcome, started)
            }
            Err(e) => {
                let best_table = context
                    .as_ref()
                    .and_then(|c| c.last_table.clone())
                    .or_else(|| tables.first().cloned());
                warn!(
                    error = %e,
                    table = best_table.as_deref().unwrap_or("-"),
                    "Pipeline failed, answering with apology"
                );
                self.apology(&session_id, best_table.as_deref(), started)
            }
        };

        self.log_exchange(&session_id, &message, &response);
        Ok(response)
    }

    /// Update context after a completed pipeline run
    fn remember(&self, session_id: &str, question: &str, outcome: &Outcome, tables: &[String]) {
        if outcome.requires_clarification {
            self.context
                .set_offered_options(session_id, outcome.options.clone());
            return;
        }

        let operation = outcome
            .statement_kind
            .map(|k| <&'static str>::from(k).to_string())
            .or_else(|| outcome.intent.as_ref().map(|i| i.category.as_str().to_string()));
        let reference_value = outcome
            .sql_used
            .as_deref()
            .and_then(|sql| REFERENCE_VALUE_RE.captures(sql))
            .map(|c| c[1].to_string());

        self.context.record_turn(
            session_id,
            Turn {
                question: question.to_string(),
                table: outcome.table_used.clone(),
                operation,
                reference_value,
                sql: outcome.sql_used.clone(),
            },
            outcome.intent.clone(),
        );
        self.context
            .set_offered_options(session_id, extract_options(&outcome.content, tables));
    }

    fn respond(&self, session_id: &str, outcome: Outcome, started: Instant) -> ChatResponse {
        ChatResponse {
            session_id: session_id.to_string(),
            content: outcome.content,
            sql_used: outcome.sql_used,
            table_used: outcome.table_used,
            confidence: outcome.confidence,
            suggestions: outcome.suggestions,
            requires_clarification: outcome.requires_clarification,
            clarification_question: outcome.clarification_question,
            provider: outcome.provider.map(|p| p.to_string()),
            rows: outcome.rows,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    fn fast_path_response(&self, session_id: &str, reply: FastPathReply, started: Instant) -> ChatResponse {
        ChatResponse {
            session_id: session_id.to_string(),
            confidence: reply.confidence(),
            content: reply.content,
            suggestions: reply.suggestions,
            latency_ms: started.elapsed().as_millis() as u64,
            ..Default::default()
        }
    }

    fn apology(&self, session_id: &str, table: Option<&str>, started: Instant) -> ChatResponse {
        let (content, suggestions) = match (self.locale, table) {
            (Locale::PtBr, Some(t)) => (
                format!("Desculpe, não consegui responder essa pergunta. Tente perguntar sobre a tabela **{t}**."),
                vec![format!("Quantos registros tem na tabela {t}?")],
            ),
            (Locale::PtBr, None) => (
                "Desculpe, não consegui responder essa pergunta. Pergunte quais tabelas existem.".to_string(),
                vec!["Quais tabelas existem?".to_string()],
            ),
            (Locale::EnUs, Some(t)) => (
                format!("Sorry, I could not answer that. Try asking about the **{t}** table."),
                vec![format!("How many records are in the {t} table?")],
            ),
            (Locale::EnUs, None) => (
                "Sorry, I could not answer that. Ask which tables exist.".to_string(),
                vec!["Which tables exist?".to_string()],
            ),
        };
        ChatResponse {
            session_id: session_id.to_string(),
            content,
            table_used: table.map(String::from),
            suggestions,
            latency_ms: started.elapsed().as_millis() as u64,
            ..Default::default()
        }
    }

    /// Append the user message and the reply to the session transcript
    /// Append both sides of a turn. False when the session is gone, e.g.
    /// deleted or swept while the turn was running.
    fn log_exchange(&self, session_id: &str, question: &str, response: &ChatResponse) -> bool {
        let logged = self.sessions.append(
            session_id,
            ChatMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::User,
                content: question.to_string(),
                timestamp: now_rfc3339(),
                metadata: MessageMetadata::default(),
            },
        );
        if !logged {
            debug!(session = session_id, "Session missing, exchange not logged");
            return false;
        }
        self.sessions.append(
            session_id,
            ChatMessage {
                id: Uuid::new_v4().to_string(),
                role: MessageRole::Assistant,
                content: response.content.clone(),
                timestamp: now_rfc3339(),
                metadata: MessageMetadata {
                    sql_used: response.sql_used.clone(),
                    table_used: response.table_used.clone(),
                    confidence: Some(response.confidence),
                    latency_ms: Some(response.latency_ms),
                    provider: response.provider.clone(),
                },
            },
        )
    }

    pub fn session(&self, id: &str) -> Option<SessionDetail> {
        self.sessions.get(id)
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.sessions.list()
    }

    pub fn stats(&self) -> SessionStats {
        self.sessions.stats()
    }

    /// Drop the transcript and the conversational context together
    pub fn delete_session(&self, id: &str) -> bool {
        let existed = self.sessions.delete(id);
        self.context.clear(id);
        existed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedClient;
    use crate::llm::{LlmClient, Provider};
    use crate::store::DataStore;

    async fn assistant(clients: Vec<Arc<ScriptedClient>>) -> DataAssistant {
        let store = DataStore::open_in_memory().await.unwrap();
        store
            .execute_batch(
                "CREATE TABLE clients (id INTEGER PRIMARY KEY, name TEXT, city TEXT);
                 INSERT INTO clients (name, city) VALUES ('Ana', 'Recife'), ('Bruno', 'Natal');
                 CREATE TABLE orders (id INTEGER PRIMARY KEY, client_id INTEGER, total REAL);
                 INSERT INTO orders (client_id, total) VALUES (1, 10.5);",
            )
            .await
            .unwrap();
        let chain = ProviderChain::new(
            clients.into_iter().map(|c| c as Arc<dyn LlmClient>).collect(),
            Duration::from_secs(1),
        );
        DataAssistant::new(Arc::new(store), chain, &TabulaConfig::default())
    }

    fn request(message: &str, session: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            session_id: session.map(String::from),
        }
    }

    // ============================================================================
    // Validation
    // ============================================================================

    #[test]
    fn test_validate_request() {
        assert!(validate_request(&request("quantos clientes?", None)).is_empty());

        let errors = validate_request(&request("   ", Some("has space")));
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["message", "session_id"]);

        let long = "a".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(validate_request(&request(&long, None)).len(), 1);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let assistant = assistant(vec![]).await;
        let err = assistant.chat(request("", None)).await.unwrap_err();
        assert!(matches!(err, TabulaError::InvalidInput(_)));
        assert_eq!(assistant.stats().total_sessions, 0);
    }

    // ============================================================================
    // Fast path
    // ============================================================================

    #[tokio::test]
    async fn test_fast_path_skips_pipeline() {
        let client = ScriptedClient::new(Provider::DeepSeek).build();
        let assistant = assistant(vec![client.clone()]).await;

        let response = assistant.chat(request("oi", None)).await.unwrap();
        assert_eq!(response.confidence, 100);
        assert!(response.sql_used.is_none());
        assert_eq!(client.total_calls(), 0);
        assert!(assistant.context().snapshot(&response.session_id).is_none());

        let detail = assistant.session(&response.session_id).unwrap();
        assert_eq!(detail.messages.len(), 2);
        assert_eq!(detail.messages[0].role, MessageRole::User);
    }

    // ============================================================================
    // Pipeline turns
    // ============================================================================

    #[tokio::test]
    async fn test_pipeline_turn_updates_context_and_session() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "aggregation", "tables": ["clients"], "confidence": 90}"#)
            .reply("query", r#"{"sql": "SELECT COUNT(*) FROM clients WHERE city = 'Recife'"}"#)
            .reply("analyst", r#"{"insights": []}"#)
            .build();
        let assistant = assistant(vec![client]).await;

        let response = assistant
            .chat(request("quantos clientes em Recife?", Some("s1")))
            .await
            .unwrap();
        assert_eq!(response.session_id, "s1");
        assert_eq!(response.table_used.as_deref(), Some("clients"));
        assert_eq!(response.provider.as_deref(), Some("deepseek"));
        assert!(response.content.contains('1'));

        let ctx = assistant.context().snapshot("s1").unwrap();
        assert_eq!(ctx.last_table.as_deref(), Some("clients"));
        assert_eq!(ctx.last_reference_value.as_deref(), Some("Recife"));
        assert_eq!(ctx.recent_turns.len(), 1);

        let summary = assistant.list_sessions().remove(0);
        assert_eq!(summary.query_count, 1);
        assert_eq!(summary.tables_touched, vec!["clients"]);
    }

    #[tokio::test]
    async fn test_confirmation_replays_previous_intent() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "retrieval", "tables": ["clients"], "confidence": 85}"#)
            .reply("query", r#"{"sql": "SELECT name FROM clients WHERE city = 'Recife'"}"#)
            .reply("analyst", r#"{"insights": []}"#)
            .build();
        let assistant = assistant(vec![client.clone()]).await;

        assistant
            .chat(request("quais clientes moram em Recife?", Some("s3")))
            .await
            .unwrap();
        let before = client.total_calls();

        let second = assistant.chat(request("mostre", Some("s3"))).await.unwrap();
        assert_eq!(client.total_calls() - before, 2);
        assert_eq!(client.calls("coordinator"), 1);
        assert_eq!(client.calls("query"), 2);
        assert_eq!(second.table_used.as_deref(), Some("clients"));
        assert_eq!(second.confidence, 85);

        let ctx = assistant.context().snapshot("s3").unwrap();
        assert_eq!(ctx.recent_turns.front().map(|t| t.question.as_str()), Some("mostre"));
    }

    #[tokio::test]
    async fn test_clarification_then_choice() {
        // Coordinator names no table, so the reply offers lettered options
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "aggregation", "tables": [], "confidence": 70}"#)
            .reply("query", r#"{"sql": "SELECT COUNT(*) FROM orders"}"#)
            .reply("analyst", r#"{"insights": []}"#)
            .build();
        let assistant = assistant(vec![client]).await;

        let first = assistant.chat(request("quantos registros?", Some("s2"))).await.unwrap();
        assert!(first.requires_clarification);
        let ctx = assistant.context().snapshot("s2").unwrap();
        assert_eq!(ctx.pending_options.len(), 2);

        let second = assistant.chat(request("B", Some("s2"))).await.unwrap();
        assert!(!second.requires_clarification);
        assert_eq!(second.table_used.as_deref(), Some("orders"));
        let ctx = assistant.context().snapshot("s2").unwrap();
        assert!(ctx.pending_options.is_empty());
    }

    #[tokio::test]
    async fn test_no_provider_still_answers() {
        let assistant = assistant(vec![]).await;
        let response = assistant
            .chat(request("quantos registros tem na tabela clients?", None))
            .await
            .unwrap();
        assert_eq!(response.table_used.as_deref(), Some("clients"));
        assert!(response.confidence <= crate::orchestrator::DEGRADED_CONFIDENCE);
        assert!(response.content.contains('2'));
    }

    #[tokio::test]
    async fn test_exchange_for_missing_session_not_logged() {
        let assistant = assistant(vec![]).await;
        let response = ChatResponse {
            session_id: "gone".into(),
            content: "ok".into(),
            ..Default::default()
        };
        assert!(!assistant.log_exchange("gone", "oi", &response));
        assert!(assistant.session("gone").is_none());
        assert_eq!(assistant.stats().total_sessions, 0);

        let id = assistant.sessions().create_or_get(None);
        assert!(assistant.log_exchange(&id, "oi", &response));
        assert_eq!(assistant.session(&id).unwrap().messages.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_session_clears_context() {
        let client = ScriptedClient::new(Provider::DeepSeek)
            .reply("coordinator", r#"{"category": "retrieval", "tables": ["orders"], "confidence": 90}"#)
            .reply("query", r#"{"sql": "SELECT * FROM orders"}"#)
            .reply("analyst", r#"{"insights": []}"#)
            .build();
        let assistant = assistant(vec![client]).await;
        let response = assistant.chat(request("liste os pedidos de orders", None)).await.unwrap();
        let id = response.session_id;

        assert!(assistant.context().snapshot(&id).is_some());
        assert!(assistant.delete_session(&id));
        assert!(assistant.context().snapshot(&id).is_none());
        assert!(assistant.session(&id).is_none());
    }
}
