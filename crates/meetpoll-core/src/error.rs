//! Core error types for meetpoll-core.
//!
//! This module defines the error hierarchy using thiserror. Each request-facing
//! failure kind (validation, authorization, state, not-found, external) has its
//! own enum so callers can map them to a response without string matching.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core error type for meetpoll-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Credential or permission failures
    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthError),

    /// Operation not allowed in the poll's current state
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Unknown poll, option or meeting
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Collaborator failures (meeting store, notifier, calendar provider)
    #[error("External failure in '{service}': {message}")]
    External {
        service: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Build an [`CoreError::External`] without an underlying source.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        CoreError::External {
            service: service.into(),
            message: message.into(),
            source: None,
        }
    }
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Invalid time range
    #[error("Invalid time range: end ({end}) must be greater than start ({start})")]
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// A quantity that must be strictly positive was not
    #[error("'{field}' must be greater than zero (got {value})")]
    NonPositive { field: String, value: i64 },

    /// Unknown IANA time zone name
    #[error("Unknown time zone: {0}")]
    InvalidTimezone(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Authorization errors for vote/view access and organizer-only operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Token could not be decoded
    #[error("Malformed token")]
    MalformedToken,

    /// HMAC did not verify
    #[error("Token signature verification failed")]
    InvalidSignature,

    /// Token past its expiry
    #[error("Token expired at {0}")]
    TokenExpired(DateTime<Utc>),

    /// Token was issued for a different poll
    #[error("Token was issued for poll '{token_poll}', not '{poll}'")]
    PollMismatch { token_poll: String, poll: String },

    /// Two presented identities disagree
    #[error("Identity mismatch: token is for '{token}', caller is '{caller}'")]
    IdentityMismatch { token: String, caller: String },

    /// Identity is not among the poll's invited participants
    #[error("'{0}' is not invited to this poll")]
    NotInvited(String),

    /// No usable credential was presented
    #[error("No credentials presented")]
    MissingCredentials,

    /// Operation is reserved for the organizer
    #[error("Only the organizer may {0}")]
    OrganizerOnly(String),
}

/// Errors for operations that conflict with the poll lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Poll has already been finalized
    #[error("Poll '{0}' is closed")]
    PollClosed(String),

    /// Poll deadline has passed
    #[error("Poll '{poll_id}' deadline passed at {deadline}")]
    DeadlinePassed {
        poll_id: String,
        deadline: DateTime<Utc>,
    },
}

/// Lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("poll '{0}'")]
    Poll(String),

    #[error("option '{option_id}' in poll '{poll_id}'")]
    Option { poll_id: String, option_id: String },

    #[error("meeting '{0}'")]
    Meeting(String),
}

/// Per-participant calendar lookup failure.
///
/// Never escalated to a request error: the collector records it as the
/// participant's missing reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    /// Participant has no calendar connection
    #[error("calendar not connected")]
    NotConnected,

    /// Provider returned an error
    #[error("calendar provider error: {0}")]
    Provider(String),

    /// Lookup exceeded the per-participant timeout
    #[error("calendar lookup timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        CalendarError::Provider(err.to_string())
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,

    /// Stored row could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Compare-and-set on the poll version lost a race
    #[error("Poll '{poll_id}' was modified concurrently (expected version {expected})")]
    VersionConflict { poll_id: String, expected: u64 },

    /// Blocking task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _msg) => {
                if code.code == rusqlite::ErrorCode::DatabaseLocked {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for DatabaseError {
    fn from(err: tokio::task::JoinError) -> Self {
        DatabaseError::TaskFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
