// crates/tabula-server/src/config/file.rs
// File-based configuration from ~/.tabula/config.toml

use crate::llm::Provider;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TabulaConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub schema: SchemaConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub format: FormatConfig,
}

/// LLM configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub primary: Option<String>,
    pub secondary: Option<String>,
    /// Upper bound for a single provider call
    pub timeout_secs: u64,
    pub deepseek_model: Option<String>,
    pub gemini_model: Option<String>,
    pub ollama_model: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: None,
            secondary: None,
            timeout_secs: 30,
            deepseek_model: None,
            gemini_model: None,
            ollama_model: None,
        }
    }
}

/// Session store section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: u64,
    pub sweep_interval_secs: u64,
    pub max_messages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            sweep_interval_secs: 3600,
            max_messages: 1000,
        }
    }
}

/// Schema cache section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub ttl_secs: u64,
    pub sample_rows: usize,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            sample_rows: 3,
        }
    }
}

/// Data store section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    /// Allow the validated arbitrary-read path; when off, complex statements
    /// are answered by scanning the table in memory
    pub raw_reads: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            raw_reads: true,
        }
    }
}

/// Reply rendering section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// "pt-BR" or "en-US"
    pub locale: String,
    pub max_rows: usize,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            locale: "pt-BR".to_string(),
            max_rows: 20,
        }
    }
}

impl TabulaConfig {
    /// Load config from ~/.tabula/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// ~/.tabula
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tabula")
    }

    pub fn primary_provider(&self) -> Option<Provider> {
        self.llm.primary.as_deref().and_then(Provider::parse)
    }

    pub fn secondary_provider(&self) -> Option<Provider> {
        self.llm.secondary.as_deref().and_then(Provider::parse)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs.max(1))
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session.ttl_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs.max(1))
    }

    pub fn schema_ttl(&self) -> Duration {
        Duration::from_secs(self.schema.ttl_secs)
    }
}
