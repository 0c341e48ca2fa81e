// crates/tabula-server/src/error.rs
// Standardized error types for Tabula

use thiserror::Error;

/// Main error type for the Tabula library
#[derive(Error, Debug)]
pub enum TabulaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generated SQL tripped the safety gate. Never shown to users verbatim.
    #[error("unsafe SQL rejected (keyword `{keyword}`)")]
    Security { keyword: String },

    #[error("translation error: {0}")]
    Translation(String),

    #[error("execution error: {0}")]
    Execution(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("no LLM providers configured")]
    NoProviders,

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("task cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using TabulaError
pub type Result<T> = std::result::Result<T, TabulaError>;

impl TabulaError {
    /// Convert to a user-facing string. Security rejections stay generic so the
    /// rejected statement is never echoed back.
    pub fn to_user_string(&self) -> String {
        match self {
            Self::Security { .. } => "could not build a safe query".to_string(),
            other => other.to_string(),
        }
    }

    /// Whether this error came from the data store rather than the pipeline
    pub fn is_execution(&self) -> bool {
        matches!(
            self,
            Self::Execution(_) | Self::UnknownTable(_) | Self::Translation(_) | Self::Db(_)
        )
    }
}

impl From<String> for TabulaError {
    fn from(s: String) -> Self {
        TabulaError::Other(s)
    }
}

impl From<tokio::task::JoinError> for TabulaError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            TabulaError::Cancelled
        } else {
            TabulaError::Other(err.to_string())
        }
    }
}

impl From<TabulaError> for String {
    fn from(err: TabulaError) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // TabulaError construction tests
    // ============================================================================

    #[test]
    fn test_invalid_input_error() {
        let err = TabulaError::InvalidInput("bad data".to_string());
        assert!(err.to_string().contains("invalid input"));
        assert!(err.to_string().contains("bad data"));
    }

    #[test]
    fn test_security_error_carries_keyword() {
        let err = TabulaError::Security {
            keyword: "drop".into(),
        };
        assert!(err.to_string().contains("drop"));
    }

    #[test]
    fn test_security_error_user_string_is_generic() {
        let err = TabulaError::Security {
            keyword: "delete".into(),
        };
        let msg = err.to_user_string();
        assert!(!msg.contains("delete"));
        assert!(msg.contains("safe query"));
    }

    #[test]
    fn test_llm_error() {
        let err = TabulaError::Llm("rate limited".to_string());
        assert!(err.to_string().contains("LLM error"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn test_is_execution() {
        assert!(TabulaError::UnknownTable("x".into()).is_execution());
        assert!(TabulaError::Translation("x".into()).is_execution());
        assert!(!TabulaError::Llm("x".into()).is_execution());
    }

    // ============================================================================
    // From implementations tests
    // ============================================================================

    #[test]
    fn test_from_string() {
        let err: TabulaError = "some error".to_string().into();
        assert!(matches!(err, TabulaError::Other(_)));
    }

    #[test]
    fn test_into_string() {
        let err = TabulaError::Config("missing key".to_string());
        let s: String = err.into();
        assert!(s.contains("configuration error"));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<i32>("not json").unwrap_err();
        let err: TabulaError = json_err.into();
        assert!(matches!(err, TabulaError::Json(_)));
    }
}
