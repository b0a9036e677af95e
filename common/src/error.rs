use async_openai::error::OpenAIError;
use thiserror::Error;
use tokio::task::JoinError;

// Core internal errors
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Dependency error: {0}")]
    Dependency(String),
    #[error("LLM parsing error: {0}")]
    LLMParsing(String),
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Input rejected: {0}")]
    InputRejected(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error("OpenAI error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Task join error: {0}")]
    Join(#[from] JoinError),
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
    #[error("Sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("IoError: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Wrap a downstream capability failure with the name of the dependency.
    pub fn dependency(name: &str, err: impl std::fmt::Display) -> Self {
        Self::Dependency(format!("{name}: {err}"))
    }
}
