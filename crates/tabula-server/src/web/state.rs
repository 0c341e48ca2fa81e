// crates/tabula-server/src/web/state.rs
// Web server state

use crate::assistant::DataAssistant;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<DataAssistant>,
}

impl AppState {
    pub fn new(assistant: Arc<DataAssistant>) -> Self {
        Self { assistant }
    }
}
