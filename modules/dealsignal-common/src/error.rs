use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate signal for key: {0}")]
    Duplicate(String),

    #[error("Invalid processing transition for signal {signal_id}: {from} -> {to}")]
    InvalidTransition {
        signal_id: i64,
        from: String,
        to: String,
    },

    #[error("Transient error after {attempts} attempts: {message}")]
    Transient { attempts: u32, message: String },

    #[error("Permanent error: {0}")]
    Permanent(String),

    #[error("CRM schema invalid:\n{0}")]
    SchemaInvalid(String),

    #[error("No canonical key derivable from the available evidence")]
    InsufficientEvidence,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Whether the HTTP retry loop should try again on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Transient { .. })
    }
}
