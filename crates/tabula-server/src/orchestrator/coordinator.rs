// crates/tabula-server/src/orchestrator/coordinator.rs
// Coordinator stage: question -> IntentResult

use super::types::IntentResult;
use crate::context::{ConversationContext, OfferedOption};
use crate::error::{Result, TabulaError};
use crate::intent::{self, IntentCategory};
use crate::llm::{CompletionRequest, PromptBuilder, Provider, ProviderChain, extract_json};
use crate::patterns::{CONFIRMATION_RE, EMAIL_RE, contains_word};
use regex::Regex;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, info};

const MAX_TOKENS: u32 = 400;
const TEMPERATURE: f32 = 0.0;

/// Letters used for clarification menus
const OPTION_KEYS: &[char] = &['A', 'B', 'C', 'D', 'E', 'F'];

/// Table-name fragments that hold a given kind of entity
const EMAIL_TABLE_HINTS: &[&str] = &["lead", "client", "cliente", "customer", "contact", "contato", "user", "usuario"];

#[allow(clippy::expect_used)]
static COUNT_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(quant[oa]s|quantidade|contar|conte|total|how many|count|number of)\b")
        .expect("valid count hint regex")
});

#[allow(clippy::expect_used)]
static LIST_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(mostr[ae]r?|list[ae]r?|liste|exib[ae]|tra[zg]a|show|list|display|top \d+|primeir[oa]s|[úu]ltim[oa]s)\b")
        .expect("valid list hint regex")
});

#[allow(clippy::expect_used)]
static SEARCH_HINT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(busc[ae]r?|busqu[ei]|procur[ae]r?|encontr[ae]r?|ach[ae]r?|find|search|look up|lookup)\b")
        .expect("valid search hint regex")
});

/// Coordinator output
#[derive(Debug, Clone, PartialEq)]
pub enum Coordination {
    /// Proceed with this intent. `provider` is `None` for replays and heuristics.
    Proceed {
        intent: IntentResult,
        provider: Option<Provider>,
    },
    /// No table could be chosen; ask the user
    Clarify {
        question: String,
        options: Vec<OfferedOption>,
    },
}

/// What the model returns
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CoordinatorDraft {
    category: String,
    tables: Vec<String>,
    operations: Vec<String>,
    confidence: Option<u8>,
    skip_query: bool,
    direct_answer: Option<String>,
}

/// Run the coordinator stage
pub async fn coordinate(
    chain: &ProviderChain,
    message: &str,
    context: Option<&ConversationContext>,
    tables: &[String],
) -> Coordination {
    if CONFIRMATION_RE.is_match(message.trim())
        && let Some(intent) = context.and_then(|c| c.last_intent.clone())
    {
        debug!(category = intent.category.as_str(), "Confirmation replays previous intent");
        return Coordination::Proceed {
            intent,
            provider: None,
        };
    }

    let request = CompletionRequest::new(
        PromptBuilder::for_coordinator().build_messages(prompt_content(message, context, tables)),
        MAX_TOKENS,
        TEMPERATURE,
    );

    match chain
        .attempt("coordinator", &request, |raw| parse_draft(raw, tables))
        .await
    {
        Ok(attempted) => {
            let mut intent = attempted.value;
            if !intent.skip_query && intent.tables_needed.is_empty() {
                match pick_table(message, context, tables, false) {
                    Some(table) => intent = intent.with_table(table),
                    None => return clarify(message, tables),
                }
            }
            Coordination::Proceed {
                intent,
                provider: Some(attempted.provider),
            }
        }
        Err(e) => {
            info!(error = %e, "Coordinator falling back to heuristics");
            fallback(message, context, tables)
        }
    }
}

fn prompt_content(message: &str, context: Option<&ConversationContext>, tables: &[String]) -> String {
    let mut content = format!("Available tables: {}\n", tables.join(", "));
    if let Some(summary) = context.map(ConversationContext::summary).filter(|s| !s.is_empty()) {
        content.push_str("Conversation so far:\n");
        content.push_str(&summary);
        content.push('\n');
    }
    content.push_str("Question: ");
    content.push_str(message);
    content
}

/// Accept model output only when it names known tables or explicitly skips the query
fn parse_draft(raw: &str, tables: &[String]) -> Result<IntentResult> {
    let draft: CoordinatorDraft = extract_json(raw)
        .ok_or_else(|| TabulaError::Llm("coordinator output was not JSON".into()))?;

    let category = IntentCategory::from_str(draft.category.trim())
        .map_err(|_| TabulaError::Llm(format!("unknown category '{}'", draft.category)))?;

    let mut intent = IntentResult::new(category, draft.confidence.unwrap_or(intent::MATCHED_CONFIDENCE));
    intent.operations = draft.operations;
    intent.skip_query = draft.skip_query || category == IntentCategory::Conversational;
    intent.direct_answer = draft.direct_answer.filter(|a| !a.trim().is_empty());

    for name in &draft.tables {
        if let Some(known) = canonical_table(name, tables) {
            intent = intent.with_table(known);
        }
    }
    if !draft.tables.is_empty() && intent.tables_needed.is_empty() {
        return Err(TabulaError::Llm(format!(
            "coordinator named unknown tables: {}",
            draft.tables.join(", ")
        )));
    }
    Ok(intent)
}

fn canonical_table(name: &str, tables: &[String]) -> Option<String> {
    let name = name.trim().trim_matches('"');
    tables.iter().find(|t| t.eq_ignore_ascii_case(name)).cloned()
}

/// Keyword heuristics used when no provider produced a usable answer
pub fn fallback(message: &str, context: Option<&ConversationContext>, tables: &[String]) -> Coordination {
    let classification = intent::classify(message);
    let mut intent = IntentResult::new(classification.category, classification.confidence);
    intent.operations = operations(message);

    match pick_table(message, context, tables, true) {
        Some(table) => {
            intent = intent.with_table(table);
            Coordination::Proceed {
                intent,
                provider: None,
            }
        }
        None => clarify(message, tables),
    }
}

/// Operation tags from count / list / search indicators
pub fn operations(message: &str) -> Vec<String> {
    let mut ops = Vec::new();
    if COUNT_HINT_RE.is_match(message) {
        ops.push("count".to_string());
    }
    if LIST_HINT_RE.is_match(message) {
        ops.push("list".to_string());
    }
    if SEARCH_HINT_RE.is_match(message) {
        ops.push("search".to_string());
    }
    ops
}

/// Table choice: explicitly named, then entity match, then the context's last
/// table, then (when `allow_first`) the first table in the inventory.
pub fn pick_table(
    message: &str,
    context: Option<&ConversationContext>,
    tables: &[String],
    allow_first: bool,
) -> Option<String> {
    if let Some(named) = tables.iter().find(|t| contains_word(message, t)) {
        return Some(named.clone());
    }

    if EMAIL_RE.is_match(message) {
        for hint in EMAIL_TABLE_HINTS {
            if let Some(table) = tables.iter().find(|t| t.to_lowercase().contains(hint)) {
                return Some(table.clone());
            }
        }
    }

    if let Some(last) = context.and_then(|c| c.last_table.as_ref())
        && tables.iter().any(|t| t.eq_ignore_ascii_case(last))
    {
        return Some(last.clone());
    }

    if allow_first || tables.len() == 1 {
        return tables.first().cloned();
    }
    None
}

fn clarify(message: &str, tables: &[String]) -> Coordination {
    let options: Vec<OfferedOption> = tables
        .iter()
        .zip(OPTION_KEYS)
        .map(|(table, key)| OfferedOption {
            key: key.to_string(),
            description: table.clone(),
            related_table: Some(table.clone()),
        })
        .collect();

    let menu = options
        .iter()
        .map(|o| format!("({}) {}", o.key, o.description))
        .collect::<Vec<_>>()
        .join(" ");

    let english = crate::patterns::ENGLISH_MARKER_RE.is_match(message);
    let question = if options.is_empty() {
        if english {
            "There are no tables available to query yet.".to_string()
        } else {
            "Ainda não há tabelas disponíveis para consulta.".to_string()
        }
    } else if english {
        format!("Which table do you mean? {menu}")
    } else {
        format!("Qual tabela você quer consultar? {menu}")
    };

    Coordination::Clarify { question, options }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Turn;
    use crate::llm::testing::ScriptedClient;
    use std::sync::Arc;
    use std::time::Duration;

    fn tables() -> Vec<String> {
        vec!["orders".into(), "leads".into(), "products".into()]
    }

    fn chain(reply: Option<&str>) -> (ProviderChain, Arc<ScriptedClient>) {
        let mut client = ScriptedClient::new(Provider::DeepSeek);
        if let Some(reply) = reply {
            client = client.reply("coordinator", reply);
        }
        let client = client.build();
        (
            ProviderChain::new(vec![client.clone()], Duration::from_secs(1)),
            client,
        )
    }

    fn proceed(c: Coordination) -> IntentResult {
        match c {
            Coordination::Proceed { intent, .. } => intent,
            other => panic!("expected proceed, got {other:?}"),
        }
    }

    // ========================================================================
    // LLM path
    // ========================================================================

    #[tokio::test]
    async fn test_llm_intent_accepted() {
        let (chain, _) = chain(Some(
            r#"```json
{"category": "aggregation", "tables": ["Orders"], "operations": ["count"], "confidence": 88, "skip_query": false}
```"#,
        ));
        let c = coordinate(&chain, "quantos pedidos?", None, &tables()).await;
        let Coordination::Proceed { intent, provider } = c else {
            panic!("expected proceed");
        };
        assert_eq!(provider, Some(Provider::DeepSeek));
        assert_eq!(intent.category, IntentCategory::Aggregation);
        assert_eq!(intent.tables_needed, vec!["orders"]);
        assert_eq!(intent.confidence, 88);
    }

    #[tokio::test]
    async fn test_unknown_tables_fall_back() {
        let (chain, _) = chain(Some(r#"{"category": "retrieval", "tables": ["invoices"]}"#));
        let intent = proceed(coordinate(&chain, "mostre os leads", None, &tables()).await);
        assert_eq!(intent.tables_needed, vec!["leads"]);
    }

    #[tokio::test]
    async fn test_no_table_offers_options() {
        let (chain, _) = chain(Some(r#"{"category": "retrieval", "tables": []}"#));
        match coordinate(&chain, "qual o total?", None, &tables()).await {
            Coordination::Clarify { question, options } => {
                assert!(question.contains("(A) orders (B) leads (C) products"));
                assert_eq!(options.len(), 3);
                assert_eq!(options[1].related_table.as_deref(), Some("leads"));
            }
            other => panic!("expected clarification, got {other:?}"),
        }
    }

    // ========================================================================
    // Replay and heuristics
    // ========================================================================

    #[tokio::test]
    async fn test_confirmation_replays_without_llm() {
        let (chain, client) = chain(Some(r#"{"category": "retrieval", "tables": ["leads"]}"#));
        let previous = IntentResult::new(IntentCategory::Trend, 90).with_table("orders");
        let ctx = ConversationContext {
            last_intent: Some(previous.clone()),
            ..Default::default()
        };
        let c = coordinate(&chain, "sim", Some(&ctx), &tables()).await;
        assert_eq!(
            c,
            Coordination::Proceed {
                intent: previous,
                provider: None
            }
        );
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_heuristics_when_providers_fail() {
        let (chain, client) = chain(None);
        let intent = proceed(coordinate(&chain, "quantos orders existem?", None, &tables()).await);
        assert_eq!(client.calls("coordinator"), 1);
        assert_eq!(intent.category, IntentCategory::Aggregation);
        assert_eq!(intent.tables_needed, vec!["orders"]);
        assert_eq!(intent.operations, vec!["count"]);
    }

    #[test]
    fn test_pick_table_order() {
        let t = tables();
        let mut ctx = ConversationContext::default();
        ctx.recent_turns.push_front(Turn::default());
        ctx.last_table = Some("products".into());

        assert_eq!(pick_table("mostre leads", Some(&ctx), &t, true).as_deref(), Some("leads"));
        assert_eq!(
            pick_table("busque ana@example.com", Some(&ctx), &t, true).as_deref(),
            Some("leads")
        );
        assert_eq!(pick_table("mostre tudo", Some(&ctx), &t, true).as_deref(), Some("products"));
        assert_eq!(pick_table("mostre tudo", None, &t, true).as_deref(), Some("orders"));
        assert_eq!(pick_table("mostre tudo", None, &t, false), None);
    }

    #[test]
    fn test_operations_tags() {
        assert_eq!(operations("quantos clientes?"), vec!["count"]);
        assert_eq!(operations("liste e busque joão"), vec!["list", "search"]);
        assert!(operations("bom dia").is_empty());
    }
}
