//! Error types for nnav.
//!
//! Errors are strongly typed using thiserror. Only user-supplied syntax
//! (filter terms, subject patterns, format tokens) and file I/O produce errors.
//! Matching, correlation and aggregation never fail; unexpected data degrades
//! to a `PUB` classification or a skipped record instead.

use std::path::PathBuf;

use thiserror::Error;

/// Subject pattern syntax errors.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("Subject pattern cannot be empty")]
    Empty,

    #[error("Subject pattern '{pattern}' contains whitespace")]
    Whitespace {
        pattern: String,
    },

    #[error("'>' must be the last token in subject pattern '{pattern}'")]
    MisplacedFullWildcard {
        pattern: String,
    },

    #[error("Token '{token}' in subject pattern '{pattern}' mixes wildcards with literal text")]
    MixedWildcardToken {
        pattern: String,
        token: String,
    },
}

/// Validation errors for user-supplied input.
#[allow(missing_docs)]
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Invalid regex /{pattern}/: {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("Invalid subject pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    #[error("Unknown message type '{value}' (expected PUB, REQ or RES)")]
    UnknownMessageKind {
        value: String,
    },

    #[error("Unknown export format '{value}' (expected json, json-compact or ndjson)")]
    UnknownExportFormat {
        value: String,
    },

    #[error("No subject '{path}' has been observed")]
    UnknownSubject {
        path: String,
    },

    #[error("Malformed record {index}: {reason}")]
    MalformedRecord {
        index: usize,
        reason: String,
    },
}

/// Errors from a single import or export operation.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize records: {message}")]
    Serialize {
        message: String,
    },
}

/// Ingestion queue errors.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("Ingestion queue is full (capacity {capacity})")]
    QueueFull {
        capacity: usize,
    },

    #[error("Ingestion worker has shut down")]
    Disconnected,
}

/// Top-level error type for nnav.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum NavError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl From<PatternError> for NavError {
    fn from(err: PatternError) -> Self {
        Self::Validation(ValidationError::InvalidPattern(err))
    }
}

impl NavError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a resource (I/O) error.
    #[must_use]
    pub const fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }

    /// Returns true if this is an ingestion error.
    #[must_use]
    pub const fn is_ingest(&self) -> bool {
        matches!(self, Self::Ingest(_))
    }
}

/// Result type alias for nnav operations.
pub type NavResult<T> = Result<T, NavError>;
