// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for remote calls.

use thiserror::Error;

/// Errors raised while talking to a backend
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport or HTTP status error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered but reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// The answer did not have the expected shape
    #[error("Unexpected response: {0}")]
    Payload(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Base64 decoding error
    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Returned asset could not be imported
    #[error("Import error: {0}")]
    Import(#[from] atelier_scene::import::ImportError),

    /// Image encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl ClientError {
    /// Create a payload error
    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }
}

/// Result type for remote calls
pub type Result<T> = std::result::Result<T, ClientError>;
