// crates/tabula-server/src/fast_path.rs
// Zero-latency replies for purely conversational input
//
// Runs before anything else. Never fires on a message that names a table,
// except the canonical "which tables exist" question, which is answered from
// the live inventory.

use crate::patterns::{
    ENGLISH_MARKER_RE, FAREWELL_RE, GREETING_RE, HELP_RE, TABLE_REFERENCE_RE, TABLES_LIST_RE,
    THANKS_RE, contains_word,
};

/// Longest message (in characters) the fast path will consider
pub const MAX_FAST_PATH_CHARS: usize = 60;

/// Canned replies always carry full confidence
pub const FAST_PATH_CONFIDENCE: u8 = 100;

const MAX_SUGGESTIONS: usize = 3;

/// Which canned family answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum FastPathKind {
    Greeting,
    Thanks,
    Farewell,
    Help,
    Tables,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FastPathReply {
    pub kind: FastPathKind,
    pub content: String,
    pub suggestions: Vec<String>,
}

impl FastPathReply {
    pub fn confidence(&self) -> u8 {
        FAST_PATH_CONFIDENCE
    }
}

/// Try to answer `message` without touching the pipeline.
///
/// Pure: no context or session is read or written.
pub fn match_fast_path(message: &str, tables: &[String]) -> Option<FastPathReply> {
    let text = message.trim();
    if text.is_empty() || text.chars().count() > MAX_FAST_PATH_CHARS {
        return None;
    }

    let asks_tables = TABLES_LIST_RE.is_match(text);
    if !asks_tables && names_table(text, tables) {
        return None;
    }

    let english = ENGLISH_MARKER_RE.is_match(text);
    let kind = if asks_tables {
        FastPathKind::Tables
    } else if HELP_RE.is_match(text) {
        FastPathKind::Help
    } else if THANKS_RE.is_match(text) {
        FastPathKind::Thanks
    } else if FAREWELL_RE.is_match(text) {
        FastPathKind::Farewell
    } else if GREETING_RE.is_match(text) {
        FastPathKind::Greeting
    } else {
        return None;
    };

    Some(FastPathReply {
        kind,
        content: canned_content(kind, tables, english),
        suggestions: suggestions(kind, tables, english),
    })
}

/// True when the message contains a table phrase or a known table name
fn names_table(text: &str, tables: &[String]) -> bool {
    TABLE_REFERENCE_RE.is_match(text) || tables.iter().any(|t| contains_word(text, t))
}

fn canned_content(kind: FastPathKind, tables: &[String], english: bool) -> String {
    match (kind, english) {
        (FastPathKind::Greeting, false) => {
            "Olá! Posso responder perguntas sobre os seus dados. Pergunte, por exemplo, quantos registros existem em uma tabela.".into()
        }
        (FastPathKind::Greeting, true) => {
            "Hi! I can answer questions about your data. Try asking how many records a table has.".into()
        }
        (FastPathKind::Thanks, false) => "Por nada! Quer consultar mais alguma coisa?".into(),
        (FastPathKind::Thanks, true) => "You're welcome! Anything else you want to look up?".into(),
        (FastPathKind::Farewell, false) => "Até logo! Suas conversas ficam salvas por 24 horas.".into(),
        (FastPathKind::Farewell, true) => "Bye! Your conversation is kept for 24 hours.".into(),
        (FastPathKind::Help, false) => {
            "Eu transformo perguntas em consultas de leitura sobre as suas tabelas: contagens, listagens, filtros, comparações e tendências. Nunca altero dados.".into()
        }
        (FastPathKind::Help, true) => {
            "I turn questions into read-only queries over your tables: counts, listings, filters, comparisons and trends. I never change data.".into()
        }
        (FastPathKind::Tables, english) => tables_content(tables, english),
    }
}

fn tables_content(tables: &[String], english: bool) -> String {
    match (tables.is_empty(), english) {
        (true, false) => "Nenhuma tabela disponível no momento.".into(),
        (true, true) => "No tables are available right now.".into(),
        (false, false) => format!(
            "Tabelas disponíveis ({}): {}.",
            tables.len(),
            tables.join(", ")
        ),
        (false, true) => format!("Available tables ({}): {}.", tables.len(), tables.join(", ")),
    }
}

fn suggestions(kind: FastPathKind, tables: &[String], english: bool) -> Vec<String> {
    let mut out = Vec::with_capacity(MAX_SUGGESTIONS);
    if kind != FastPathKind::Tables {
        out.push(if english {
            "Which tables exist?".to_string()
        } else {
            "Quais tabelas existem?".to_string()
        });
    }
    for table in tables.iter().take(2) {
        out.push(if english {
            format!("How many records are in table {}?", table)
        } else {
            format!("Quantos registros tem na tabela {}?", table)
        });
    }
    out.truncate(MAX_SUGGESTIONS);
    out
}
