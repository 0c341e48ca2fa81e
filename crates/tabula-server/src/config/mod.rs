// crates/tabula-server/src/config/mod.rs
// Configuration: environment variables and ~/.tabula/config.toml

pub mod env;
pub mod file;

pub use env::{ApiKeys, ConfigValidation, EnvConfig};
pub use file::{
    DatabaseConfig, FormatConfig, LlmConfig, SchemaConfig, SessionConfig, TabulaConfig,
};
