// crates/tabula-server/src/main.rs
// Tabula - ask questions about tabular data in plain language

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env files (global first, then project - project overrides)
    if let Some(home) = dirs::home_dir() {
        let _ = dotenvy::from_path(home.join(".tabula/.env"));
    }
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        match &cli.command {
            Commands::Serve { .. } => Level::INFO,
            Commands::Ask { .. } | Commands::Check => Level::WARN,
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { port } => cli::run_server(port).await?,
        Commands::Ask { question, session } => cli::run_ask(question, session).await?,
        Commands::Check => cli::run_check().await?,
    }

    Ok(())
}
