//! Error types for rulekeeper.
//!
//! This module defines all error types used throughout the rulekeeper crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for rulekeeper operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the postmortem database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Request Errors ===
    /// A project path segment could not be decoded.
    #[error("invalid project path encoding: {reason}")]
    InvalidProjectPath {
        /// Why decoding failed.
        reason: String,
    },

    /// A rule filename is unusable (empty, contains separators, ...).
    #[error("invalid rule filename '{filename}': {reason}")]
    InvalidFilename {
        /// The rejected filename.
        filename: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No postmortem exists with the given id.
    #[error("postmortem {id} not found")]
    PostmortemNotFound {
        /// The id that was looked up.
        id: i64,
    },

    /// An identical postmortem was already recorded for the project.
    #[error("duplicate postmortem (already recorded as {existing_id})")]
    DuplicatePostmortem {
        /// Id of the existing record.
        existing_id: i64,
    },

    // === Secret Errors ===
    /// No API key is stored and none was found in the environment.
    #[error("no API key configured; store one via the settings endpoint or set {env_var}")]
    MissingApiKey {
        /// Environment variable that was consulted.
        env_var: String,
    },

    /// Encrypting or decrypting the stored API key failed.
    #[error("credential store error: {0}")]
    Crypto(String),

    // === LLM Errors ===
    /// The HTTP request to the chat-completion API failed.
    #[error("LLM request failed: {0}")]
    LlmTransport(#[from] reqwest::Error),

    /// The chat-completion API answered with an error status.
    #[error("LLM API returned {status}: {message}")]
    LlmUpstream {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Error message extracted from the provider's body.
        message: String,
    },

    /// The chat-completion API answered without usable content.
    #[error("LLM returned no usable content: {0}")]
    LlmEmptyResponse(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A file could not be read or written.
    #[error("failed to access {path}: {source}")]
    FileAccess {
        /// Path of the file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for rulekeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new input validation error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a new credential store error.
    #[must_use]
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto(message.into())
    }

    /// Create a file access error for the given path.
    #[must_use]
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess {
            path: path.into(),
            source,
        }
    }

    /// Check if this error means the requested record does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PostmortemNotFound { .. })
    }

    /// Check if this error was caused by the caller's input rather than
    /// by the tool or an upstream service.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidProjectPath { .. }
                | Self::InvalidFilename { .. }
                | Self::InvalidInput(_)
                | Self::MissingApiKey { .. }
                | Self::PostmortemNotFound { .. }
                | Self::DuplicatePostmortem { .. }
        )
    }

    /// Check if this error came from the LLM provider.
    #[must_use]
    pub fn is_upstream_error(&self) -> bool {
        matches!(
            self,
            Self::LlmTransport(_) | Self::LlmUpstream { .. } | Self::LlmEmptyResponse(_)
        )
    }
}
