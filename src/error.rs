use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tool gateway error: {0}")]
    Gateway(String),

    #[error("tool gateway is shut down")]
    GatewayClosed,

    #[error("Issue tracker error: {0}")]
    Tracker(String),

    #[error("no new finding to process")]
    NoFinding,

    #[error("missing pipeline state: {0}")]
    MissingState(&'static str),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Model inference error: {0}")]
    Llm(String),

    #[error("Review request error: {0}")]
    ReviewRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<git2::Error> for AppError {
    fn from(e: git2::Error) -> Self {
        AppError::Git(e.message().to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
