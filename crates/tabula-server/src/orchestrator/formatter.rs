// crates/tabula-server/src/orchestrator/formatter.rs
// Formatter stage: deterministic tables, model-written replies otherwise

use super::types::{IntentResult, StatementKind};
use crate::error::TabulaError;
use crate::intent::IntentCategory;
use crate::llm::{CompletionRequest, PromptBuilder, Provider, ProviderChain, extract_json};
use crate::store::Row;
use crate::utils::{Locale, format_integer, format_value, truncate};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

pub const MAX_REPLY_CHARS: usize = 800;
pub const MAX_EMOJI: usize = 3;
pub const MAX_SUGGESTIONS: usize = 3;

const MAX_TOKENS: u32 = 350;
const TEMPERATURE: f32 = 0.4;
const MAX_CELL_CHARS: usize = 60;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FormatterDraft {
    reply: String,
}

// ============================================================================
// Tabular results
// ============================================================================

/// Summary line, markdown table and insights for a non-empty result
pub fn tabular_reply(
    rows: &[Row],
    kind: Option<StatementKind>,
    table: Option<&str>,
    insights: &[String],
    locale: Locale,
    max_rows: usize,
) -> String {
    let mut out = summarize(rows, kind, table, locale, max_rows);
    out.push_str("\n\n");
    out.push_str(&render_table(rows, locale, max_rows));

    if !insights.is_empty() {
        out.push_str(match locale {
            Locale::PtBr => "\n\n**Observações**",
            Locale::EnUs => "\n\n**Insights**",
        });
        for insight in insights {
            out.push_str("\n- ");
            out.push_str(insight);
        }
    }
    out
}

/// One-line local summary of a result
pub fn summarize(
    rows: &[Row],
    kind: Option<StatementKind>,
    table: Option<&str>,
    locale: Locale,
    max_rows: usize,
) -> String {
    let table = table.unwrap_or("?");

    if let [row] = rows
        && row.len() == 1
        && let Some((label, value)) = row.iter().next()
    {
        let shown = format_value(value, locale);
        return match (kind, locale) {
            (Some(StatementKind::SimpleCount), Locale::PtBr) => {
                format!("Contagem em **{table}**: **{shown}** registros.")
            }
            (Some(StatementKind::SimpleCount), Locale::EnUs) => {
                format!("Count in **{table}**: **{shown}** records.")
            }
            (Some(StatementKind::CountDistinct), Locale::PtBr) => {
                format!("Valores distintos em **{table}**: **{shown}**.")
            }
            (Some(StatementKind::CountDistinct), Locale::EnUs) => {
                format!("Distinct values in **{table}**: **{shown}**.")
            }
            _ => format!("{label}: **{shown}**"),
        };
    }

    let n = format_integer(rows.len() as i64, locale);
    let mut line = match locale {
        Locale::PtBr => format!("{n} registro(s) retornado(s) de **{table}**."),
        Locale::EnUs => format!("{n} record(s) returned from **{table}**."),
    };
    if rows.len() > max_rows {
        line.push_str(&match locale {
            Locale::PtBr => format!(" Mostrando os primeiros {max_rows}."),
            Locale::EnUs => format!(" Showing the first {max_rows}."),
        });
    }
    line
}

/// Markdown table: header plus at most `max_rows` rows
pub fn render_table(rows: &[Row], locale: Locale, max_rows: usize) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows.iter().take(max_rows) {
        for key in row.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }
    if columns.is_empty() {
        return String::new();
    }

    let mut out = format!("| {} |\n", columns.iter().map(|c| cell(c)).collect::<Vec<_>>().join(" | "));
    out.push_str(&format!("|{}\n", " --- |".repeat(columns.len())));
    for row in rows.iter().take(max_rows) {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| cell(&format_value(row.get(*c).unwrap_or(&Value::Null), locale)))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out.trim_end().to_string()
}

fn cell(text: &str) -> String {
    truncate(&text.replace(['\n', '\r'], " ").replace('|', "\\|"), MAX_CELL_CHARS)
}

// ============================================================================
// Non-tabular results
// ============================================================================

/// Model-written reply for results that are not a table. Falls back to
/// `template` when no provider produces a usable reply.
pub async fn compose(
    chain: &ProviderChain,
    message: &str,
    facts: &str,
    template: String,
) -> (String, Option<Provider>) {
    let content = format!("Question: {message}\nFacts:\n{facts}");
    let request = CompletionRequest::new(
        PromptBuilder::for_formatter().build_messages(content),
        MAX_TOKENS,
        TEMPERATURE,
    );

    let parsed = chain
        .attempt("formatter", &request, |raw| {
            let draft: FormatterDraft = extract_json(raw)
                .ok_or_else(|| TabulaError::Llm("formatter output was not JSON".into()))?;
            let reply = draft.reply.trim();
            if reply.is_empty() {
                return Err(TabulaError::Llm("formatter returned an empty reply".into()));
            }
            Ok(limit_reply(reply))
        })
        .await;

    match parsed {
        Ok(attempted) => (attempted.value, Some(attempted.provider)),
        Err(e) => {
            debug!(error = %e, "Formatter using template");
            (template, None)
        }
    }
}

/// Reply for a query that matched nothing
pub fn empty_result(table: Option<&str>, locale: Locale) -> String {
    match (table, locale) {
        (Some(t), Locale::PtBr) => format!("Nenhum registro encontrado em **{t}** para essa pergunta."),
        (Some(t), Locale::EnUs) => format!("No records in **{t}** match that question."),
        (None, Locale::PtBr) => "Nenhum registro encontrado para essa pergunta.".to_string(),
        (None, Locale::EnUs) => "No records match that question.".to_string(),
    }
}

fn is_emoji(c: char) -> bool {
    matches!(c, '\u{1F000}'..='\u{1FAFF}' | '\u{2600}'..='\u{27BF}')
}

/// Enforce the reply bounds: at most [`MAX_EMOJI`] emoji and
/// [`MAX_REPLY_CHARS`] characters.
pub fn limit_reply(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut emoji = 0;
    let mut dropped = false;
    for c in text.chars() {
        if is_emoji(c) {
            emoji += 1;
            dropped = emoji > MAX_EMOJI;
            if dropped {
                continue;
            }
        } else if c == '\u{FE0F}' && dropped {
            continue;
        } else {
            dropped = false;
        }
        out.push(c);
    }
    if out.chars().count() > MAX_REPLY_CHARS {
        out = truncate(&out, MAX_REPLY_CHARS - 3);
    }
    out
}

// ============================================================================
// Follow-up suggestions
// ============================================================================

/// Up to three follow-up questions for the intent and table
pub fn suggestions(intent: &IntentResult, table: Option<&str>, locale: Locale) -> Vec<String> {
    let Some(t) = table else {
        return match locale {
            Locale::PtBr => vec!["Quais tabelas existem?".into(), "O que você pode fazer?".into()],
            Locale::EnUs => vec!["Which tables exist?".into(), "What can you do?".into()],
        };
    };

    let list: Vec<String> = match (intent.category, locale) {
        (IntentCategory::Aggregation | IntentCategory::Comparison, Locale::PtBr) => vec![
            format!("Mostre 10 registros de {t}"),
            format!("Qual a evolução por mês em {t}?"),
            format!("Quais colunas tem {t}?"),
        ],
        (IntentCategory::Aggregation | IntentCategory::Comparison, Locale::EnUs) => vec![
            format!("Show 10 records from {t}"),
            format!("How does {t} trend per month?"),
            format!("Which columns does {t} have?"),
        ],
        (IntentCategory::Trend, Locale::PtBr) => vec![
            format!("Quantos registros tem {t}?"),
            format!("Compare os dois últimos meses em {t}"),
        ],
        (IntentCategory::Trend, Locale::EnUs) => vec![
            format!("How many records are in {t}?"),
            format!("Compare the last two months in {t}"),
        ],
        (_, Locale::PtBr) => vec![
            format!("Quantos registros tem {t}?"),
            format!("Mostre 10 registros de {t}"),
            format!("Quais colunas tem {t}?"),
        ],
        (_, Locale::EnUs) => vec![
            format!("How many records are in {t}?"),
            format!("Show 10 records from {t}"),
            format!("Which columns does {t} have?"),
        ],
    };
    list.into_iter().take(MAX_SUGGESTIONS).collect()
}
