// crates/tabula-types/src/lib.rs
// Shared wire types for Tabula
// No native-only dependencies allowed here

use serde::{Deserialize, Serialize};

/// A single result row, column order preserved
pub type Row = serde_json::Map<String, serde_json::Value>;

// ═══════════════════════════════════════
// CHAT
// ═══════════════════════════════════════

/// Inbound chat request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Structured reply produced for every turn
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    pub session_id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_used: Option<String>,
    /// 0-100
    pub confidence: u8,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub requires_clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    /// LLM provider that produced the query, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    #[serde(default)]
    pub latency_ms: u64,
}

// ═══════════════════════════════════════
// SESSION HISTORY
// ═══════════════════════════════════════

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// One stored message of a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// RFC 3339
    pub timestamp: String,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

/// Session listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub message_count: usize,
    pub created_at: String,
    pub last_activity_at: String,
    pub query_count: u64,
    pub tables_touched: Vec<String>,
}

/// Full session with history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub messages: Vec<ChatMessage>,
}

/// Aggregate store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStats {
    pub total_sessions: usize,
    pub total_messages: usize,
    pub total_queries: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_activity: Option<String>,
}

// ═══════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════

/// Field-level validation problem on an inbound request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error body returned by the HTTP layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}
