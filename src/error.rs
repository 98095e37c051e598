//! Error types for RFP Assist.

use crate::rfp::status::RfpStatus;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input. Maps to HTTP 400, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown identifier.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An inbound message could not be matched to an RFP.
    /// Logged, the message is skipped, the batch continues.
    #[error("Correlation failed: {0}")]
    Correlation(String),

    /// The text-generation service returned no usable structured payload.
    #[error("Extraction failed: {0}")]
    Extraction(String),

    /// The evaluation capability returned malformed output.
    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    /// Illegal lifecycle transition attempted.
    #[error("Illegal status transition for {operation}: {from} -> {to}")]
    State {
        operation: &'static str,
        from: RfpStatus,
        to: RfpStatus,
    },

    /// Mailbox or dispatch I/O failure. Retry policy belongs to the caller.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl Error {
    /// Short machine-readable kind, used in per-message outcome reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::NotFound { .. } => "not_found",
            Error::Correlation(_) => "correlation",
            Error::Extraction(_) => "extraction",
            Error::Evaluation(_) => "evaluation",
            Error::State { .. } => "state",
            Error::Transport(_) => "transport",
            Error::Database(_) => "database",
            Error::Config(_) => "config",
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
