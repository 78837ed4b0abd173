//! Pipeline Error Types
//!
//! Error hierarchy for pipeline execution, credential acquisition and paging.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the HTTP pipeline core.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Pipeline exhausted: process() called after all {policy_count} policies and the transport ran")]
    Exhausted { policy_count: usize },

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Paging error: {0}")]
    Paging(#[from] PagingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Get error code for telemetry.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "PIPELINE_CONFIG",
            Self::Transport(_) => "PIPELINE_TRANSPORT",
            Self::Exhausted { .. } => "PIPELINE_EXHAUSTED",
            Self::Token(_) => "PIPELINE_TOKEN",
            Self::Paging(_) => "PIPELINE_PAGING",
            Self::Serialization(_) => "PIPELINE_SERIALIZATION",
            Self::UnexpectedStatus { .. } => "PIPELINE_STATUS",
            Self::Cancelled => "PIPELINE_CANCELLED",
        }
    }

    /// Check if error is transient and the request may be resubmitted.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::UnexpectedStatus { status, .. } => matches!(status, 408 | 429 | 500..=599),
            _ => false,
        }
    }
}

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
}

/// Network/transport error raised by the terminal pipeline stage.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Request timeout after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Request failed: {message}")]
    Request { message: String },

    #[error("Failed to read response body: {message}")]
    Body { message: String },
}

impl TransportError {
    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Request { .. })
    }
}

/// Credential token acquisition error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token acquisition failed: {message}")]
    AcquisitionFailed { message: String },

    #[error("Timed out after {timeout:?} waiting for a token")]
    Timeout { timeout: Duration },

    #[error("Token requested from the privileged thread; waiting there would deadlock")]
    PrivilegedThread,

    #[error("Token request was already resolved")]
    AlreadyResolved,

    #[error("Bearer tokens require an https URL, got scheme {scheme}")]
    InsecureTransport { scheme: String },
}

/// Paging error.
#[derive(Error, Debug)]
pub enum PagingError {
    #[error("No such page: {page_id}")]
    PageNotFound { page_id: String },

    #[error("Page visitor failed: {message}")]
    Visitor { message: String },
}

/// Serializer error.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("Failed to encode: {message}")]
    Encode { message: String },

    #[error("Failed to decode: {message}")]
    Decode { message: String },
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
