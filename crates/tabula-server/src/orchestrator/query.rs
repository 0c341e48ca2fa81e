// crates/tabula-server/src/orchestrator/query.rs
// Query stage: intent + schemas -> validated SqlStrategy

use super::types::{IntentResult, QueryFailure, SqlDraft, SqlStrategy};
use crate::context::ConversationContext;
use crate::error::TabulaError;
use crate::llm::{Attempted, CompletionRequest, PromptBuilder, ProviderChain, extract_json};
use crate::schema::SchemaCacheEntry;
use std::sync::Arc;
use tracing::warn;

const MAX_TOKENS: u32 = 600;
const TEMPERATURE: f32 = 0.0;

/// Ask for a statement and validate it. Each provider gets the identical
/// prompt once; malformed output and safety rejections count as failures.
pub async fn plan(
    chain: &ProviderChain,
    message: &str,
    intent: &IntentResult,
    schemas: &[Arc<SchemaCacheEntry>],
    context: Option<&ConversationContext>,
) -> Result<Attempted<SqlStrategy>, QueryFailure> {
    let request = CompletionRequest::new(
        PromptBuilder::for_query().build_messages(prompt_content(message, intent, schemas, context)),
        MAX_TOKENS,
        TEMPERATURE,
    );

    chain
        .attempt("query", &request, |raw| {
            extract_json::<SqlDraft>(raw)
                .ok_or_else(|| TabulaError::Llm("query output was not JSON".into()))?
                .into_strategy()
        })
        .await
        .map_err(|e| {
            warn!(error = %e, "Query stage failed, using last-resort count");
            QueryFailure::new(e.to_string(), intent.primary_table())
        })
}

fn prompt_content(
    message: &str,
    intent: &IntentResult,
    schemas: &[Arc<SchemaCacheEntry>],
    context: Option<&ConversationContext>,
) -> String {
    let mut content = String::from("Schema:\n");
    for entry in schemas {
        content.push_str(&entry.describe());
        content.push('\n');
    }
    content.push_str(&format!(
        "Intent: {} (operations: {})\n",
        intent.category,
        if intent.operations.is_empty() {
            "none".to_string()
        } else {
            intent.operations.join(", ")
        }
    ));
    if let Some(ctx) = context {
        if let Some(ref value) = ctx.last_reference_value {
            content.push_str(&format!("Value referenced earlier: {value}\n"));
        }
        if let Some(sql) = ctx.recent_turns.front().and_then(|t| t.sql.as_ref()) {
            content.push_str(&format!("Previous query: {sql}\n"));
        }
    }
    content.push_str("Question: ");
    content.push_str(message);
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentCategory;
    use crate::llm::Provider;
    use crate::llm::testing::ScriptedClient;
    use crate::orchestrator::types::StatementKind;
    use chrono::Utc;
    use std::time::Duration;

    fn schemas() -> Vec<Arc<SchemaCacheEntry>> {
        vec![Arc::new(SchemaCacheEntry {
            table_name: "clients".into(),
            column_names: vec!["id".into(), "name".into()],
            row_count_hint: 42,
            sample_rows: vec![],
            cached_at: Utc::now(),
        })]
    }

    fn intent() -> IntentResult {
        IntentResult::new(IntentCategory::Aggregation, 90).with_table("clients")
    }

    #[tokio::test]
    async fn test_valid_statement_from_primary() {
        let primary = ScriptedClient::new(Provider::DeepSeek)
            .reply("query", r#"{"sql": "SELECT COUNT(*) FROM clients", "kind": "simpleCount"}"#)
            .build();
        let chain = ProviderChain::new(vec![primary], Duration::from_secs(1));

        let out = plan(&chain, "quantos clientes?", &intent(), &schemas(), None)
            .await
            .unwrap();
        assert_eq!(out.provider, Provider::DeepSeek);
        assert_eq!(out.value.kind, StatementKind::SimpleCount);
    }

    #[tokio::test]
    async fn test_rejected_statement_retries_secondary() {
        let primary = ScriptedClient::new(Provider::DeepSeek)
            .reply("query", r#"{"sql": "DELETE FROM clients"}"#)
            .build();
        let secondary = ScriptedClient::new(Provider::Gemini)
            .reply("query", "{'sql': 'SELECT name FROM clients LIMIT 5'}")
            .build();
        let chain = ProviderChain::new(vec![primary.clone(), secondary.clone()], Duration::from_secs(1));

        let out = plan(&chain, "liste clientes", &intent(), &schemas(), None)
            .await
            .unwrap();
        assert_eq!(out.provider, Provider::Gemini);
        assert_eq!(out.value.kind, StatementKind::List);
        assert_eq!(primary.calls("query"), 1);
        assert_eq!(secondary.calls("query"), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_carries_last_resort_count() {
        let primary = ScriptedClient::new(Provider::DeepSeek)
            .reply("query", "I cannot help with that")
            .build();
        let secondary = ScriptedClient::new(Provider::Gemini).build();
        let chain = ProviderChain::new(vec![primary, secondary], Duration::from_secs(1));

        let failure = plan(&chain, "?", &intent(), &schemas(), None).await.unwrap_err();
        assert_eq!(
            failure.fallback.map(|s| s.into_inner()).as_deref(),
            Some("SELECT COUNT(*) FROM clients")
        );
        assert!(failure.reason.contains("query stage exhausted"));
    }

    #[test]
    fn test_prompt_includes_schema_and_context() {
        let ctx = ConversationContext {
            last_reference_value: Some("ana@x.com".into()),
            ..Default::default()
        };
        let content = prompt_content("quantos?", &intent(), &schemas(), Some(&ctx));
        assert!(content.contains("table clients (~42 rows): id, name"));
        assert!(content.contains("Intent: aggregation"));
        assert!(content.contains("ana@x.com"));
        assert!(content.ends_with("Question: quantos?"));
    }
}
