// crates/tabula-server/src/cli/ask.rs
// One-shot question from the command line

use super::build_assistant;
use anyhow::Result;
use tabula::config::{EnvConfig, TabulaConfig};
use tabula_types::ChatRequest;

pub async fn run_ask(question: String, session: Option<String>) -> Result<()> {
    let env = EnvConfig::load();
    let config = TabulaConfig::load();
    let assistant = build_assistant(&env, &config).await?;

    let response = assistant
        .chat(ChatRequest {
            message: question,
            session_id: session,
        })
        .await?;

    println!("{}", response.content);
    if let Some(ref sql) = response.sql_used {
        println!("\nSQL: {}", sql);
    }
    if !response.suggestions.is_empty() {
        println!();
        for s in &response.suggestions {
            println!("  - {}", s);
        }
    }
    eprintln!(
        "[confidence {} | {} | {} ms]",
        response.confidence,
        response.provider.as_deref().unwrap_or("local"),
        response.latency_ms
    );
    Ok(())
}
