//! Error types for the bridge.
//!
//! Only [`DecodeError`] ever crosses the webhook HTTP boundary. Delivery and
//! resolution failures are absorbed by the component that made the call and
//! turned into a log record.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn an inbound webhook request into a [`crate::WebhookEvent`].
///
/// Carries the HTTP status the boundary should answer with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct DecodeError {
    /// HTTP status code to propagate verbatim.
    pub status: u16,
    /// Human readable reason.
    pub message: String,
}

impl DecodeError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }
}

/// A single room delivery failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network or protocol failure talking to the homeserver.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The homeserver answered with a non-success status.
    #[error("homeserver returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The room id could not be turned into a request URL.
    #[error("invalid room id: {0}")]
    InvalidRoom(String),

    /// Any other transport specific failure.
    #[error("{0}")]
    Other(String),
}

/// Looking up an issue reference failed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API rejected credentials")]
    Unauthorized,

    #[error("GitHub API rate limit exceeded")]
    RateLimited,

    #[error("GitHub API returned {0}")]
    Status(u16),

    #[error("malformed GitHub API response: {0}")]
    Malformed(String),

    #[error("circuit breaker open")]
    CircuitOpen,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {path}")]
    FileNotFound { path: PathBuf },

    #[error("invalid TOML at line {line}, column {column}: {message}")]
    InvalidToml {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("missing required fields: {fields:?}")]
    MissingRequiredFields { fields: Vec<String> },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("I/O error reading configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry and construction errors.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    #[error("Service already registered: {0}")]
    DuplicateService(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// A specialized Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
