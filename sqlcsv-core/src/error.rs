//! Error types with credential-safe messages.
//!
//! No variant in this module ever carries a password. Connection strings are
//! reported through [`crate::connector::ConnectionDescriptor`]'s `Display`
//! implementation, which masks the `PWD` attribute.

use crate::connector::CandidateFailure;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sqlcsv operations.
#[derive(Debug, Error)]
pub enum SqlCsvError {
    /// Username or password absent while trusted authentication is disabled
    #[error("Missing credentials: {missing} is required unless trusted connection is enabled")]
    MissingCredentials { missing: &'static str },

    /// Every driver candidate was rejected
    #[error(
        "Database connection failed: all {} driver candidates were rejected",
        .attempts.len()
    )]
    ConnectionFailure { attempts: Vec<CandidateFailure> },

    /// Export attempted after the session was closed
    #[error("No open database session")]
    NoSession,

    /// The server rejected or failed the SQL text
    #[error("Query execution failed: {context}")]
    QueryExecution { context: String },

    /// Query file missing or unreadable
    #[error("Failed to read {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output file could not be created or written
    #[error("Failed to write {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration or validation error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Report serialization failed
    #[error("Serialization error: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results with SqlCsvError
pub type Result<T> = std::result::Result<T, SqlCsvError>;

impl SqlCsvError {
    /// Creates a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a query execution error
    pub fn query_failed(context: impl Into<String>) -> Self {
        Self::QueryExecution {
            context: context.into(),
        }
    }

    /// Creates a file read error for `path`
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a file write error for `path`
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }
}
