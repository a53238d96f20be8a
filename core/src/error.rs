use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state transition for {resource}: {from} -> {to}")]
    InvalidStateTransition {
        resource: String,
        from: String,
        to: String,
    },

    #[error("Audit chain integrity violation at seq {seq}: {detail}")]
    IntegrityViolation { seq: i64, detail: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ComplianceResult<T> = Result<T, ComplianceError>;
