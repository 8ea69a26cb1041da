use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for core operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur when talking to an upstream model provider.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream provider returned a server-side or transient error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The upstream provider rejected the call for quota or rate-limit reasons.
    #[error("Quota exhausted: {0}")]
    QuotaExhausted(String),

    /// Required API key was not found.
    #[error("API key not found: {0}")]
    MissingApiKey(String),

    /// Upstream returned a response that failed schema validation.
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Determines whether this error may succeed if retried.
    ///
    /// Returns `true` for transient failures like network errors, provider
    /// 5xx responses, and quota rejections (which may succeed against a
    /// different credential). Schema violations are never retryable at this
    /// layer.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Provider(_) | Self::QuotaExhausted(_)
        )
    }

    /// Returns `true` when the failure was a quota or rate-limit rejection.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExhausted(_))
    }
}
