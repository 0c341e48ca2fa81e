// crates/tabula-server/src/llm/prompt.rs
// PromptBuilder for consistent per-stage prompt construction

use super::Message;

/// Shared prefix for every stage prompt. Kept identical across calls so
/// providers with prefix caching can reuse it.
const STATIC_PREFIX: &str = r#"You are Tabula, an assistant that answers questions about tabular data.
Core rules:
- Only use tables and columns that appear in the provided context
- Never invent rows, counts, or values
- Queries are read-only: a single SELECT statement, nothing else
- Answer in the language the user wrote in
"#;

/// Appended to stages that must answer with a JSON object
const JSON_GUIDANCE: &str = r#"Respond with ONE JSON object and nothing else.
No markdown fences, no comments, no trailing text. Use double quotes."#;

/// PromptBuilder constructs prompts with a funnel structure:
/// 1. Static shared prefix
/// 2. Stage-specific instructions
/// 3. Dynamic user content (question, schema, rows)
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    role_instructions: String,
    json_output: bool,
}

impl PromptBuilder {
    pub fn new(role_instructions: impl Into<String>) -> Self {
        Self {
            role_instructions: role_instructions.into(),
            json_output: false,
        }
    }

    /// Require a single JSON object as output
    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }

    pub fn build_system_prompt(&self) -> String {
        let mut prompt = STATIC_PREFIX.to_string();
        prompt.push('\n');
        prompt.push_str(&self.role_instructions);

        if self.json_output {
            prompt.push_str("\n\n");
            prompt.push_str(JSON_GUIDANCE);
        }

        prompt
    }

    pub fn build_messages(&self, user_content: impl Into<String>) -> Vec<Message> {
        vec![
            Message::system(self.build_system_prompt()),
            Message::user(user_content),
        ]
    }

    /// Coordinator: classify the question and pick tables
    pub fn for_coordinator() -> Self {
        let instructions = r#"Stage: coordinator. Classify the user's question and choose the tables needed.

Categories: retrieval, aggregation, filter, trend, comparison, exploratory, conversational.

Output shape:
{
  "category": "aggregation",
  "tables": ["orders"],
  "operations": ["count"],
  "confidence": 85,
  "skip_query": false,
  "direct_answer": null
}

Set skip_query to true and fill direct_answer only when no data is needed."#;
        Self::new(instructions).with_json_output()
    }

    /// Query: write one SELECT for the chosen tables
    pub fn for_query() -> Self {
        let instructions = r#"Stage: query. Write exactly one SQL SELECT that answers the question.

Statement kinds:
- countDistinct: SELECT COUNT(DISTINCT col) ...
- simpleCount: SELECT COUNT(*) FROM t [WHERE ...]
- list: SELECT cols FROM t [WHERE ...] [ORDER BY ...] [LIMIT n]
- aggregation: GROUP BY queries
- complex: anything else (CASE WHEN, joins, date bucketing)

Prefer the simplest kind that answers the question. Always add LIMIT to list queries.

Output shape:
{
  "sql": "SELECT COUNT(*) FROM clients",
  "kind": "simpleCount",
  "explanation": "Counts every client",
  "expected_shape": "single number"
}"#;
        Self::new(instructions).with_json_output()
    }

    /// Analyst: insights strictly from returned rows
    pub fn for_analyst() -> Self {
        let instructions = r#"Stage: analyst. Read the query result and give at most 3 short insights.
Every insight must be directly supported by the rows shown. No speculation.

Output shape:
{"insights": ["..."]}"#;
        Self::new(instructions).with_json_output()
    }

    /// Formatter: compose a short conversational reply for non-tabular results
    pub fn for_formatter() -> Self {
        let instructions = r#"Stage: formatter. Write the final reply to the user.
At most 800 characters and at most 3 emoji. Mention the key number or fact first.

Output shape:
{"reply": "..."}"#;
        Self::new(instructions).with_json_output()
    }
}
