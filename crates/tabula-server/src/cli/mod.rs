// crates/tabula-server/src/cli/mod.rs
// CLI module for Tabula commands

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tabula::assistant::DataAssistant;
use tabula::config::{EnvConfig, TabulaConfig};
use tabula::llm::ProviderFactory;
use tabula::store::DataStore;

pub mod ask;
pub mod check;
pub mod serve;

pub use ask::run_ask;
pub use check::run_check;
pub use serve::run_server;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Ask questions about tabular data in plain language")]
#[command(version)]
pub struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000", env = "TABULA_PORT")]
        port: u16,
    },

    /// Ask a single question and print the reply
    Ask {
        /// The question, in Portuguese or English
        #[arg(index = 1)]
        question: String,

        /// Reuse a session id (only meaningful within one process)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Validate environment, config file and database
    Check,
}

/// Database path: TABULA_DATABASE wins over `[database] path`
pub fn database_path(env: &EnvConfig, config: &TabulaConfig) -> Result<PathBuf> {
    env.database
        .clone()
        .or_else(|| config.database.path.clone())
        .context("no database configured; set TABULA_DATABASE or [database] path in config.toml")
}

/// Open the store, build the provider chain and wire the assistant.
/// Fails when no LLM provider is configured.
pub async fn build_assistant(env: &EnvConfig, config: &TabulaConfig) -> Result<DataAssistant> {
    let validation = env.validate();
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if !validation.is_valid() {
        bail!("configuration invalid:\n{}", validation.report());
    }

    let chain = ProviderFactory::from_config(env, config).chain(config.llm_timeout())?;

    let path = database_path(env, config)?;
    let store = DataStore::open(&path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))?
        .with_raw_reads(config.database.raw_reads);
    tracing::info!(path = %path.display(), raw_reads = config.database.raw_reads, "Data store opened");

    Ok(DataAssistant::new(Arc::new(store), chain, config))
}
