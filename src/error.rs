//! Error types for Lead Assist.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),

    #[error("Intake error: {0}")]
    Intake(#[from] IntakeError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

/// Telegram transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to chat {chat_id}: {reason}")]
    SendFailed { chat_id: i64, reason: String },

    #[error("Telegram API call {method} failed: {reason}")]
    ApiFailed { method: String, reason: String },

    #[error("Invalid update payload: {0}")]
    InvalidUpdate(String),
}

/// Field-extraction errors.
///
/// These never abort lead creation — callers degrade to empty fields.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Extraction request failed: {0}")]
    RequestFailed(String),

    #[error("Extraction returned unparseable output: {0}")]
    InvalidResponse(String),
}

/// Intake (coalescing / attribution) errors.
#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("No pending decision for user {owner} in chat {chat_id}")]
    NoPendingDecision { owner: i64, chat_id: i64 },

    #[error("Lead {lead_id} not found or not owned by user {owner}")]
    LeadNotFound { lead_id: i64, owner: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
