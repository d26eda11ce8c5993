//! Error kinds shared across the runtime.
//!
//! One enum per the whole crate rather than one per subsystem: callers
//! almost always either surface the message to the user or convert the
//! failure into a `ToolResult` / notification, so fine-grained types
//! would buy nothing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArcError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("{message}")]
    Llm {
        message: String,
        /// Whether the caller may retry (rate limits, transient network).
        retryable: bool,
    },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("skill error: {0}")]
    Skill(String),

    #[error("security error: {0}")]
    Security(String),

    #[error("memory error: {0}")]
    Memory(String),

    #[error("platform error: {0}")]
    Platform(String),
}

impl ArcError {
    /// Non-retryable LLM failure.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            retryable: false,
        }
    }

    /// Retryable LLM failure (rate limit, transient network error).
    pub fn llm_retryable(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
            retryable: true,
        }
    }
}

impl From<rusqlite::Error> for ArcError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<std::io::Error> for ArcError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}
