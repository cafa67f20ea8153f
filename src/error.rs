//! Error types for the onboarding wizard.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Unique constraint violated on column {column}")]
    UniqueViolation { column: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures of a remote call made by the wizard client.
///
/// Any of these leaves the wizard exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Could not decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// Errors surfaced by the client-side wizard state machine.
#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    #[error("A request is already in flight")]
    Busy,

    #[error("Unable to reach the server, try again: {0}")]
    Transport(#[from] TransportError),

    #[error("Submission rejected: invalid anti-forgery token")]
    Forbidden,

    #[error("Submission is only possible from the review step")]
    NotAtReview,

    #[error("Wizard already completed for user {user_id}")]
    Completed { user_id: i64 },
}
