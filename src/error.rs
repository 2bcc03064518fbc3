//! Error types for the EduReg CLI

use std::time::Duration;
use thiserror::Error;

/// Result type alias for EduReg operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Read attempted while offline with nothing usable in the cache
    #[error("No offline data available for {resource}. Reconnect and try again.")]
    NoCachedData { resource: String },

    /// A queued write used up its retry budget
    #[error("Queued {kind} ({id}) failed permanently after {attempts} attempts")]
    QueueExhausted {
        id: String,
        kind: String,
        attempts: u32,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// How an error should be treated by the retry policy and offline queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity lost, DNS failure or timeout. Retryable and queueable.
    Network,
    /// Remote hiccup (rate limit, 5xx). Retryable; queued only as a last resort.
    Transient,
    /// Session or token rejected. Never retried.
    Authorization,
    /// Malformed request payload. Never retried or queued.
    Validation,
    /// Anything else that retrying will not fix.
    Fatal,
}

impl ErrorClass {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Network | ErrorClass::Transient)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorClass::Network => "network",
            ErrorClass::Transient => "transient",
            ErrorClass::Authorization => "authorization",
            ErrorClass::Validation => "validation",
            ErrorClass::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Classify this error for retry/queue decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Api(api) => api.class(),
            // Offline with no data is a connectivity condition, not a server verdict
            Error::NoCachedData { .. } => ErrorClass::Network,
            _ => ErrorClass::Fatal,
        }
    }

    /// Whether the remote platform rejected the current session
    pub fn is_authorization(&self) -> bool {
        self.class() == ErrorClass::Authorization
    }
}

/// API-related errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Your session has expired or is invalid. Run `edureg login` to sign in again.")]
    Unauthorized,

    #[error("Access denied. Your role does not permit this operation.")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded. Retry after {0:?}")]
    RateLimit(Duration),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Access token is malformed or expired")]
    InvalidToken,
}

impl ApiError {
    /// Classify this API error
    pub fn class(&self) -> ErrorClass {
        match self {
            ApiError::Network(_) => ErrorClass::Network,
            ApiError::RateLimit(_) | ApiError::ServerError(_) => ErrorClass::Transient,
            ApiError::Unauthorized | ApiError::Forbidden | ApiError::InvalidToken => {
                ErrorClass::Authorization
            }
            ApiError::BadRequest(_) => ErrorClass::Validation,
            ApiError::NotFound(_) | ApiError::InvalidResponse(_) => ErrorClass::Fatal,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("Request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("Failed to connect to the registry platform".to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found. Run `edureg init` to set up.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),

    #[error("API URL not configured. Run `edureg init` to set up.")]
    MissingApiUrl,
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Durable local storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Could not determine a data directory")]
    NoHome,

    #[error("Local storage I/O error: {0}")]
    Io(String),

    #[error("Local storage database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Local storage is full: value for {key} is {size} bytes")]
    QuotaExceeded { key: String, size: usize },

    #[error("Corrupt local storage entry {key}: {reason}")]
    Corrupt { key: String, reason: String },
}
