// crates/tabula-server/src/lib.rs
// Tabula - ask questions about tabular data in plain language

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod assistant;
pub mod config;
pub mod context;
pub mod error;
pub mod fast_path;
pub mod http;
pub mod intent;
pub mod llm;
pub mod orchestrator;
pub mod patterns;
pub mod schema;
pub mod session;
pub mod sql;
pub mod store;
pub mod utils;
pub mod web;

pub use assistant::DataAssistant;
pub use error::{Result, TabulaError};
