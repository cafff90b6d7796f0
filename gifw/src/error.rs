//! Error types used by the crate.

use gifw_types::error::GifwTypesError;
use thiserror::Error;

/// GIFW engine error type.
#[derive(Debug, Error)]
pub enum GifwError {
    /// Request could not be sent or the connection failed.
    #[error("network request failed: {0}")]
    Network(String),
    /// Server responded with an unsuccessful status code.
    #[error("request to {url} failed with status {status}")]
    Status {
        /// Requested url.
        url: String,
        /// HTTP status code.
        status: u16,
    },
    /// Error decoding data.
    #[error("failed to decode data: {0}")]
    Decoding(String),
    /// Item not found.
    #[error("{0} not found")]
    NotFound(String),
    /// The extent cannot be shown with the current background map.
    #[error("extent is not available in the current map")]
    ExtentUnavailable,
    /// User input did not pass validation.
    #[error("validation failed: {0:?}")]
    Validation(Vec<ValidationIssue>),
    /// Operation was cancelled through its abort handle.
    #[error("operation was aborted")]
    Aborted,
    /// Operation did not complete in time.
    #[error("operation timed out")]
    Timeout,
    /// Configuration document is invalid.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// Geometry could not be processed.
    #[error("geometry error: {0}")]
    Geometry(#[from] GifwTypesError),
    /// Permalink fragment is malformed.
    #[error("invalid permalink: {0}")]
    InvalidPermalink(String),
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
}

/// Validation message bound to an input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Name or path of the field.
    pub field: String,
    /// Human readable message.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a new issue.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for GifwError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Decoding(value.to_string())
        } else {
            Self::Network(value.to_string())
        }
    }
}

impl From<serde_json::Error> for GifwError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decoding(value.to_string())
    }
}

impl From<base64::DecodeError> for GifwError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Decoding(value.to_string())
    }
}

impl From<futures::future::Aborted> for GifwError {
    fn from(_value: futures::future::Aborted) -> Self {
        Self::Aborted
    }
}

impl From<tokio::time::error::Elapsed> for GifwError {
    fn from(_value: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
