// crates/tabula-server/src/context/mod.rs
// Per-session conversational state
//
// One ConversationContext per session, created on the first classified turn
// and discarded when the session is deleted or expires.

mod resolve;

pub use resolve::{ResolvedChoice, extract_options};

use crate::orchestrator::IntentResult;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Recent turns kept per session
pub const MAX_RECENT_TURNS: usize = 5;

/// A multiple-choice option offered in an assistant reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferedOption {
    /// `A`, `B`, ... or `1`, `2`, ...
    pub key: String,
    pub description: String,
    pub related_table: Option<String>,
}

/// One completed exchange
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub question: String,
    pub table: Option<String>,
    pub operation: Option<String>,
    pub reference_value: Option<String>,
    pub sql: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationContext {
    pub last_table: Option<String>,
    pub last_reference_value: Option<String>,
    pub last_operation: Option<String>,
    /// Replayed when the user confirms with "sim", "ok", ...
    pub last_intent: Option<IntentResult>,
    /// Newest first, at most [`MAX_RECENT_TURNS`]
    pub recent_turns: VecDeque<Turn>,
    pub pending_options: Vec<OfferedOption>,
}

impl ConversationContext {
    fn push_turn(&mut self, turn: Turn) {
        self.recent_turns.push_front(turn);
        while self.recent_turns.len() > MAX_RECENT_TURNS {
            self.recent_turns.pop_back();
        }
    }

    /// Short text form for prompts
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref table) = self.last_table {
            lines.push(format!("current table: {table}"));
        }
        if let Some(ref value) = self.last_reference_value {
            lines.push(format!("last referenced value: {value}"));
        }
        if let Some(ref op) = self.last_operation {
            lines.push(format!("last operation: {op}"));
        }
        for turn in self.recent_turns.iter().rev() {
            match turn.sql {
                Some(ref sql) => lines.push(format!("earlier question: {} -> {}", turn.question, sql)),
                None => lines.push(format!("earlier question: {}", turn.question)),
            }
        }
        lines.join("\n")
    }
}

/// Session-keyed store of conversational context
#[derive(Debug, Default)]
pub struct ContextMemory {
    sessions: Mutex<HashMap<String, ConversationContext>>,
}

impl ContextMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, ConversationContext>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of a session's context, if any turn was recorded
    pub fn snapshot(&self, session: &str) -> Option<ConversationContext> {
        self.guard().get(session).cloned()
    }

    /// Record a completed turn. Creates the context on first use.
    pub fn record_turn(&self, session: &str, turn: Turn, intent: Option<IntentResult>) {
        let mut sessions = self.guard();
        let ctx = sessions.entry(session.to_string()).or_default();

        if let Some(ref table) = turn.table {
            ctx.last_table = Some(table.clone());
        }
        if let Some(ref value) = turn.reference_value {
            ctx.last_reference_value = Some(value.clone());
        }
        if turn.operation.is_some() {
            ctx.last_operation = turn.operation.clone();
        }
        if intent.is_some() {
            ctx.last_intent = intent;
        }
        ctx.push_turn(turn);
        debug!(session, turns = ctx.recent_turns.len(), "Recorded turn");
    }

    pub fn set_current_table(&self, session: &str, table: impl Into<String>) {
        self.guard()
            .entry(session.to_string())
            .or_default()
            .last_table = Some(table.into());
    }

    /// Replace the pending options. An empty list clears them.
    pub fn set_offered_options(&self, session: &str, options: Vec<OfferedOption>) {
        let mut sessions = self.guard();
        if options.is_empty() {
            if let Some(ctx) = sessions.get_mut(session) {
                ctx.pending_options.clear();
            }
            return;
        }
        sessions.entry(session.to_string()).or_default().pending_options = options;
    }

    /// Drop a session's context
    pub fn clear(&self, session: &str) -> bool {
        self.guard().remove(session).is_some()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::IntentCategory;

    fn turn(question: &str, table: Option<&str>) -> Turn {
        Turn {
            question: question.into(),
            table: table.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_recent_turns_bounded_newest_first() {
        let memory = ContextMemory::new();
        for i in 0..8 {
            memory.record_turn("s", turn(&format!("q{i}"), None), None);
        }
        let ctx = memory.snapshot("s").unwrap();
        assert_eq!(ctx.recent_turns.len(), MAX_RECENT_TURNS);
        assert_eq!(ctx.recent_turns.front().unwrap().question, "q7");
        assert_eq!(ctx.recent_turns.back().unwrap().question, "q3");
    }

    #[test]
    fn test_record_turn_keeps_last_table() {
        let memory = ContextMemory::new();
        memory.record_turn("s", turn("a", Some("orders")), None);
        memory.record_turn("s", turn("b", None), None);
        assert_eq!(memory.snapshot("s").unwrap().last_table.as_deref(), Some("orders"));
    }

    #[test]
    fn test_record_turn_stores_intent() {
        let memory = ContextMemory::new();
        let intent = IntentResult::new(IntentCategory::Aggregation, 90).with_table("orders");
        memory.record_turn("s", turn("a", Some("orders")), Some(intent.clone()));
        assert_eq!(memory.snapshot("s").unwrap().last_intent, Some(intent));
    }

    #[test]
    fn test_sessions_isolated_and_clear() {
        let memory = ContextMemory::new();
        memory.set_current_table("a", "orders");
        memory.set_current_table("b", "clients");
        assert_eq!(memory.len(), 2);

        assert!(memory.clear("a"));
        assert!(memory.snapshot("a").is_none());
        assert_eq!(memory.snapshot("b").unwrap().last_table.as_deref(), Some("clients"));
        assert!(!memory.clear("a"));
    }

    #[test]
    fn test_empty_options_clear_pending() {
        let memory = ContextMemory::new();
        memory.set_offered_options(
            "s",
            vec![OfferedOption {
                key: "A".into(),
                description: "orders".into(),
                related_table: Some("orders".into()),
            }],
        );
        assert_eq!(memory.snapshot("s").unwrap().pending_options.len(), 1);
        memory.set_offered_options("s", Vec::new());
        assert!(memory.snapshot("s").unwrap().pending_options.is_empty());
        // No context is created just to clear nothing
        memory.set_offered_options("other", Vec::new());
        assert!(memory.snapshot("other").is_none());
    }

    #[test]
    fn test_summary_lists_oldest_turn_first() {
        let memory = ContextMemory::new();
        memory.record_turn("s", turn("first", Some("orders")), None);
        memory.record_turn(
            "s",
            Turn {
                sql: Some("SELECT COUNT(*) FROM orders".into()),
                ..turn("second", None)
            },
            None,
        );
        let summary = memory.snapshot("s").unwrap().summary();
        let first = summary.find("first").unwrap();
        let second = summary.find("second -> SELECT").unwrap();
        assert!(first < second);
        assert!(summary.starts_with("current table: orders"));
    }
}
