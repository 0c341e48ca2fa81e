// crates/tabula-server/src/context/resolve.rs
// Rewrites ambiguous follow-ups into self-contained requests

use super::{ContextMemory, OfferedOption};
use crate::patterns::{
    CHOICE_TOKEN_RE, LETTERED_OPTION_RE, NUMBERED_OPTION_RE, ORDINAL_RE, ORDINALS, PRONOUN_RE,
    QUERY_VERB_START_RE, SAME_TABLE_RE, SAME_VALUE_RE, contains_word,
};
use tracing::debug;

/// Connectors left dangling between inline options
const TRAILING_CONNECTORS: &[&str] = &[" ou", " or", " e", " and"];

/// An option picked by a bare choice token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChoice {
    /// Replaces the user's message
    pub message: String,
    pub related_table: Option<String>,
}

impl ContextMemory {
    /// Annotate a follow-up with the current table (and value) when it refers
    /// back to them. Returns the message unchanged when there is no context,
    /// no reference, or the message already names a known table.
    pub fn resolve_references(&self, session: &str, message: &str, tables: &[String]) -> String {
        let Some(ctx) = self.snapshot(session) else {
            return message.to_string();
        };
        let Some(table) = ctx.last_table else {
            return message.to_string();
        };

        let names_table = tables.iter().any(|t| contains_word(message, t));
        let trimmed = message.trim();

        let same_table = SAME_TABLE_RE.is_match(trimmed);
        let same_value = SAME_VALUE_RE.is_match(trimmed);
        let pronoun = PRONOUN_RE.is_match(trimmed);
        let verb_first = QUERY_VERB_START_RE.is_match(trimmed) && !names_table;

        if names_table && !same_table {
            return message.to_string();
        }
        if !(same_table || same_value || pronoun || verb_first) {
            return message.to_string();
        }

        let mut resolved = format!("{trimmed} (table: {table})");
        if (same_value || pronoun)
            && let Some(value) = ctx.last_reference_value
        {
            resolved.push_str(&format!(" (value: {value})"));
        }
        debug!(session, table = %table, "Resolved contextual reference");
        resolved
    }

    /// If options are pending and the message is a bare choice, return the
    /// chosen option and clear the pending list.
    pub fn resolve_option_choice(&self, session: &str, message: &str) -> Option<ResolvedChoice> {
        let mut sessions = self.guard();
        let ctx = sessions.get_mut(session)?;
        if ctx.pending_options.is_empty() {
            return None;
        }

        let index = choice_index(message.trim(), &ctx.pending_options)?;
        let option = ctx.pending_options.get(index)?.clone();
        ctx.pending_options.clear();
        if let Some(ref table) = option.related_table {
            ctx.last_table = Some(table.clone());
        }

        debug!(session, key = %option.key, "Resolved option choice");
        Some(ResolvedChoice {
            message: option.description,
            related_table: option.related_table,
        })
    }
}

/// Position of the option a choice token picks
fn choice_index(message: &str, options: &[OfferedOption]) -> Option<usize> {
    if let Some(caps) = CHOICE_TOKEN_RE.captures(message) {
        let token = &caps[1];
        if let Some(i) = options.iter().position(|o| o.key.eq_ignore_ascii_case(token)) {
            return Some(i);
        }
        if let Ok(n) = token.parse::<usize>() {
            return n.checked_sub(1).filter(|i| *i < options.len());
        }
        return None;
    }

    let caps = ORDINAL_RE.captures(message)?;
    let word = caps[1].to_lowercase();
    let (_, position) = ORDINALS.iter().find(|(w, _)| *w == word)?;
    match *position {
        usize::MAX => options.len().checked_sub(1),
        i if i < options.len() => Some(i),
        _ => None,
    }
}

/// Find lettered `(A) ... (B) ...` or numbered `1. ...` options in a reply.
/// Descriptions that name a known table carry it as `related_table`.
pub fn extract_options(text: &str, tables: &[String]) -> Vec<OfferedOption> {
    let lettered: Vec<_> = LETTERED_OPTION_RE.captures_iter(text).collect();
    let mut options = Vec::new();

    if lettered.len() >= 2 {
        for (idx, caps) in lettered.iter().enumerate() {
            let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let end = lettered
                .get(idx + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(text.len());
            let raw = &text[whole.end()..end];
            let raw = raw.lines().next().unwrap_or("");
            options.push(option(key.as_str().to_ascii_uppercase(), clean_description(raw), tables));
        }
    } else {
        for caps in NUMBERED_OPTION_RE.captures_iter(text) {
            options.push(option(caps[1].to_string(), clean_description(&caps[2]), tables));
        }
        if options.len() < 2 {
            options.clear();
        }
    }

    options.retain(|o| !o.description.is_empty());
    options
}

fn option(key: String, description: String, tables: &[String]) -> OfferedOption {
    let related_table = tables
        .iter()
        .find(|t| t.eq_ignore_ascii_case(&description) || contains_word(&description, t))
        .cloned();
    OfferedOption {
        key,
        description,
        related_table,
    }
}

fn clean_description(raw: &str) -> String {
    let mut text = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, ',' | ';' | '?' | '.' | '!'))
        .trim_end()
        .to_string();
    for connector in TRAILING_CONNECTORS {
        if text.to_lowercase().ends_with(connector) {
            text.truncate(text.len() - connector.len());
        }
    }
    text.trim()
        .trim_end_matches(|c: char| matches!(c, ',' | ';'))
        .trim()
        .to_string()
}
