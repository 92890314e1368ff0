//! Error types for complaint-desk.
//!
//! One enum per pipeline component. The pipeline decides per kind whether a
//! failure skips the current message or aborts the whole cycle.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for a processing cycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail access error: {0}")]
    MailAccess(#[from] MailAccessError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Transcription error: {0}")]
    Transcription(#[from] TranscriptionError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Could not read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not parse {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Inbox access errors. Any of these aborts the current cycle.
#[derive(Debug, thiserror::Error)]
pub enum MailAccessError {
    #[error("Could not connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("IMAP login failed for {user}")]
    AuthFailed { user: String },

    #[error("IMAP protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound mail errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build email: {0}")]
    Build(String),

    #[error("SMTP transport failed: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Errors a later attempt cannot fix. Only transport failures are worth
    /// retrying.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Speech-to-text errors.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("No transcription backend configured")]
    Unavailable,

    #[error("Transcription request failed: {0}")]
    Request(String),

    #[error("Transcription service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Invalid transcription response: {0}")]
    InvalidResponse(String),
}

/// Complaint field extraction errors. The message is skipped, not the cycle.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Unparseable extraction output: {0}")]
    Malformed(String),

    #[error("Extraction is missing required field `{0}`")]
    MissingField(&'static str),
}

/// Reply formatting errors. The draft is queued for manual review.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("No JSON object in generator output")]
    NoJsonObject,

    #[error("Draft does not match the subject/body schema: {0}")]
    Malformed(String),

    #[error("Draft field `{0}` is empty")]
    EmptyField(&'static str),
}

/// Database errors. Any of these aborts the current cycle.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
