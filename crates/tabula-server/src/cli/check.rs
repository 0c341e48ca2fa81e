// crates/tabula-server/src/cli/check.rs
// Read-only validation of environment, config file and database

use super::database_path;
use anyhow::Result;
use tabula::config::{EnvConfig, TabulaConfig};
use tabula::llm::ProviderFactory;
use tabula::store::{DataStore, SchemaIntrospector};

pub async fn run_check() -> Result<()> {
    let env = EnvConfig::load();
    let config = TabulaConfig::load();
    let mut ok = true;

    println!("Config file: {}", TabulaConfig::config_path().display());
    println!("API keys:    {}", env.api_keys.summary());

    let validation = env.validate();
    println!("{}", validation.report());
    ok &= validation.is_valid();

    let order = ProviderFactory::from_config(&env, &config).order();
    if !order.is_empty() {
        let names: Vec<String> = order.iter().map(|p| p.to_string()).collect();
        println!("Providers:   {}", names.join(" -> "));
    }

    match database_path(&env, &config) {
        Ok(path) => match DataStore::open(&path).await {
            Ok(store) => match store.list_tables().await {
                Ok(tables) => {
                    println!("Database:    {} ({} tables)", path.display(), tables.len());
                    for t in &tables {
                        println!("  - {}", t);
                    }
                }
                Err(e) => {
                    ok = false;
                    println!("Database:    {} unreadable: {}", path.display(), e);
                }
            },
            Err(e) => {
                ok = false;
                println!("Database:    {}", e);
            }
        },
        Err(e) => {
            ok = false;
            println!("Database:    {}", e);
        }
    }

    if ok {
        println!("\nReady.");
        Ok(())
    } else {
        anyhow::bail!("configuration incomplete")
    }
}
