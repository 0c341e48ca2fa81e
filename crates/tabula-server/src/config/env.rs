// crates/tabula-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use crate::llm::Provider;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// LLM credentials loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// DeepSeek API key (DEEPSEEK_API_KEY)
    pub deepseek: Option<String>,
    /// Gemini/Google API key (GEMINI_API_KEY or GOOGLE_API_KEY)
    pub gemini: Option<String>,
    /// Ollama base URL (OLLAMA_HOST); no key needed
    pub ollama_host: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables
    ///
    /// Set `TABULA_DISABLE_LLM=1` to suppress all providers. Startup refuses to
    /// serve in that state, which is useful to check the fail-fast path.
    pub fn from_env() -> Self {
        if parse_bool_env("TABULA_DISABLE_LLM").unwrap_or(false) {
            info!("TABULA_DISABLE_LLM is set, LLM providers disabled");
            return Self::default();
        }

        let keys = Self {
            deepseek: Self::read_key("DEEPSEEK_API_KEY"),
            gemini: Self::read_key("GEMINI_API_KEY").or_else(|| Self::read_key("GOOGLE_API_KEY")),
            ollama_host: Self::read_key("OLLAMA_HOST"),
        };
        keys.log_status();
        keys
    }

    /// Read a single value from environment, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Providers with credentials, in declaration order
    pub fn available(&self) -> Vec<Provider> {
        let mut providers = Vec::new();
        if self.deepseek.is_some() {
            providers.push(Provider::DeepSeek);
        }
        if self.gemini.is_some() {
            providers.push(Provider::Gemini);
        }
        if self.ollama_host.is_some() {
            providers.push(Provider::Ollama);
        }
        providers
    }

    /// Log which providers are configured (without exposing values)
    fn log_status(&self) {
        let available = self.available();
        if available.is_empty() {
            warn!("No LLM credentials configured");
        } else {
            debug!(providers = ?available, "LLM credentials loaded");
        }
    }

    /// Check if any LLM provider is available
    pub fn has_llm_provider(&self) -> bool {
        !self.available().is_empty()
    }

    /// Get a summary of available providers
    pub fn summary(&self) -> String {
        let providers: Vec<String> = self.available().iter().map(|p| p.to_string()).collect();
        if providers.is_empty() {
            "None".to_string()
        } else {
            providers.join(", ")
        }
    }
}

/// Configuration validation result
#[derive(Debug)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl Default for ConfigValidation {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    /// Primary provider override (TABULA_PRIMARY_PROVIDER)
    pub primary_provider: Option<String>,
    /// Secondary provider override (TABULA_SECONDARY_PROVIDER)
    pub secondary_provider: Option<String>,
    /// Database path override (TABULA_DATABASE)
    pub database: Option<PathBuf>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");

        Self {
            api_keys: ApiKeys::from_env(),
            primary_provider: non_empty_var("TABULA_PRIMARY_PROVIDER"),
            secondary_provider: non_empty_var("TABULA_SECONDARY_PROVIDER"),
            database: non_empty_var("TABULA_DATABASE").map(PathBuf::from),
        }
    }

    /// Validate the configuration. A missing provider is an error: the
    /// pipeline cannot serve without at least one.
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if !self.api_keys.has_llm_provider() {
            validation.add_error(
                "No LLM provider configured. Set DEEPSEEK_API_KEY, GEMINI_API_KEY or OLLAMA_HOST.",
            );
        } else if self.api_keys.available().len() < 2 {
            validation.add_warning(
                "Only one LLM provider configured; stage retries will have no secondary.",
            );
        }

        for (var, value) in [
            ("TABULA_PRIMARY_PROVIDER", &self.primary_provider),
            ("TABULA_SECONDARY_PROVIDER", &self.secondary_provider),
        ] {
            if let Some(name) = value
                && Provider::parse(name).is_none()
            {
                validation.add_warning(format!(
                    "Unknown {} '{}'. Valid options: deepseek, gemini, ollama",
                    var, name
                ));
            }
        }

        validation
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys_summary_empty() {
        let keys = ApiKeys::default();
        assert!(!keys.has_llm_provider());
        assert_eq!(keys.summary(), "None");
    }

    #[test]
    fn test_api_keys_available_order() {
        let keys = ApiKeys {
            deepseek: None,
            gemini: Some("g".into()),
            ollama_host: Some("http://localhost:11434".into()),
        };
        assert_eq!(keys.available(), vec![Provider::Gemini, Provider::Ollama]);
        assert_eq!(keys.summary(), "gemini, ollama");
    }

    #[test]
    fn test_validation_no_keys_is_error() {
        let config = EnvConfig::default();
        let validation = config.validate();
        assert!(!validation.is_valid());
        assert!(validation.report().contains("No LLM provider"));
    }

    #[test]
    fn test_validation_single_provider_warns() {
        let config = EnvConfig {
            api_keys: ApiKeys {
                deepseek: Some("k".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let validation = config.validate();
        assert!(validation.is_valid());
        assert_eq!(validation.warnings.len(), 1);
    }

    #[test]
    fn test_validation_unknown_provider_name() {
        let config = EnvConfig {
            api_keys: ApiKeys {
                deepseek: Some("k".into()),
                gemini: Some("g".into()),
                ollama_host: None,
            },
            primary_provider: Some("claude".into()),
            ..Default::default()
        };
        let validation = config.validate();
        assert!(validation.is_valid());
        assert!(validation.report().contains("TABULA_PRIMARY_PROVIDER"));
    }

    #[test]
    fn test_report_ok() {
        assert_eq!(ConfigValidation::new().report(), "Configuration OK");
    }
}
