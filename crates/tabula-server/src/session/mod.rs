// crates/tabula-server/src/session/mod.rs
// In-memory conversation store with TTL eviction and capped history

mod sweeper;

pub use sweeper::spawn_sweeper;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tabula_types::{ChatMessage, SessionDetail, SessionStats, SessionSummary};
use tracing::{debug, info};
use uuid::Uuid;

/// Idle time after which a session is evicted
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// History cap; exceeding it trims to the newest 80%
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

#[derive(Debug, Clone)]
struct Session {
    id: String,
    messages: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
    query_count: u64,
    /// First-seen order
    tables_touched: Vec<String>,
}

impl Session {
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            messages: Vec::new(),
            created_at: now,
            last_activity_at: now,
            query_count: 0,
            tables_touched: Vec::new(),
        }
    }

    fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            message_count: self.messages.len(),
            created_at: self.created_at.to_rfc3339(),
            last_activity_at: self.last_activity_at.to_rfc3339(),
            query_count: self.query_count,
            tables_touched: self.tables_touched.clone(),
        }
    }
}

pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    ttl: chrono::Duration,
    max_messages: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_MESSAGES)
    }
}

impl SessionStore {
    pub fn new(ttl: Duration, max_messages: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            max_messages: max_messages.max(1),
        }
    }

    fn guard(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return `id` if it exists (creating it when given but unknown), or a
    /// fresh id when none is given.
    pub fn create_or_get(&self, id: Option<&str>) -> String {
        let id = id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut sessions = self.guard();
        sessions.entry(id.clone()).or_insert_with(|| {
            debug!(session = %id, "Session created");
            Session::new(id.clone())
        });
        id
    }

    /// Append a message. Returns false when the session does not exist.
    pub fn append(&self, id: &str, message: ChatMessage) -> bool {
        let mut sessions = self.guard();
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };

        if message.metadata.sql_used.is_some() {
            session.query_count += 1;
        }
        if let Some(ref table) = message.metadata.table_used
            && !session.tables_touched.contains(table)
        {
            session.tables_touched.push(table.clone());
        }
        session.messages.push(message);
        session.last_activity_at = Utc::now();

        if session.messages.len() > self.max_messages {
            let keep = self.max_messages * 4 / 5;
            let dropped = session.messages.len() - keep;
            session.messages.drain(..dropped);
            debug!(session = %id, dropped, kept = keep, "Trimmed session history");
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<SessionDetail> {
        self.guard().get(id).map(|s| SessionDetail {
            summary: s.summary(),
            messages: s.messages.clone(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.guard().contains_key(id)
    }

    pub fn delete(&self, id: &str) -> bool {
        self.guard().remove(id).is_some()
    }

    /// Newest activity first
    pub fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.guard();
        let mut all: Vec<&Session> = sessions.values().collect();
        all.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        all.into_iter().map(Session::summary).collect()
    }

    pub fn stats(&self) -> SessionStats {
        let sessions = self.guard();
        SessionStats {
            total_sessions: sessions.len(),
            total_messages: sessions.values().map(|s| s.messages.len()).sum(),
            total_queries: sessions.values().map(|s| s.query_count).sum(),
            oldest_activity: sessions
                .values()
                .map(|s| s.last_activity_at)
                .min()
                .map(|t| t.to_rfc3339()),
        }
    }

    /// Evict sessions idle longer than the TTL. Returns the evicted ids.
    pub fn sweep_expired(&self) -> Vec<String> {
        self.sweep_idle_since(Utc::now() - self.ttl)
    }

    /// Evict sessions whose last activity is before `cutoff`
    pub fn sweep_idle_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.guard();
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.last_activity_at < cutoff)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            info!(evicted = expired.len(), remaining = sessions.len(), "Swept idle sessions");
        }
        expired
    }
}
