// crates/tabula-server/src/orchestrator/analyst.rs
// Analyst stage: short insights drawn only from returned rows

use crate::error::TabulaError;
use crate::llm::{CompletionRequest, PromptBuilder, Provider, ProviderChain, extract_json};
use crate::store::Row;
use crate::utils::{Locale, format_integer, truncate};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const MAX_INSIGHTS: usize = 3;

const MAX_TOKENS: u32 = 300;
const TEMPERATURE: f32 = 0.2;
/// Rows shown to the model
const PROMPT_ROWS: usize = 20;
const MAX_INSIGHT_CHARS: usize = 200;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AnalystDraft {
    insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub insights: Vec<String>,
    /// `None` when the local fallback produced the insight
    pub provider: Option<Provider>,
}

pub async fn analyze(chain: &ProviderChain, message: &str, rows: &[Row], locale: Locale) -> Analysis {
    if rows.is_empty() {
        return local(rows, locale);
    }

    let shown: Vec<Value> = rows
        .iter()
        .take(PROMPT_ROWS)
        .map(|r| Value::Object(r.clone()))
        .collect();
    let content = format!(
        "Question: {}\nRows returned: {}\nRows (first {}):\n{}",
        message,
        rows.len(),
        shown.len(),
        Value::Array(shown)
    );
    let request = CompletionRequest::new(
        PromptBuilder::for_analyst().build_messages(content),
        MAX_TOKENS,
        TEMPERATURE,
    );

    let parsed = chain
        .attempt("analyst", &request, |raw| {
            let draft: AnalystDraft = extract_json(raw)
                .ok_or_else(|| TabulaError::Llm("analyst output was not JSON".into()))?;
            let insights: Vec<String> = draft
                .insights
                .into_iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .take(MAX_INSIGHTS)
                .map(|i| truncate(&i, MAX_INSIGHT_CHARS))
                .collect();
            if insights.is_empty() {
                return Err(TabulaError::Llm("analyst returned no insights".into()));
            }
            Ok(insights)
        })
        .await;

    match parsed {
        Ok(attempted) => Analysis {
            insights: attempted.value,
            provider: Some(attempted.provider),
        },
        Err(e) => {
            debug!(error = %e, "Analyst using local insight");
            local(rows, locale)
        }
    }
}

fn local(rows: &[Row], locale: Locale) -> Analysis {
    Analysis {
        insights: vec![total_records(rows.len(), locale)],
        provider: None,
    }
}

/// The one insight that needs no model
pub fn total_records(n: usize, locale: Locale) -> String {
    let n = format_integer(n as i64, locale);
    match locale {
        Locale::PtBr => format!("Total de registros retornados: {n}"),
        Locale::EnUs => format!("Total records returned: {n}"),
    }
}
