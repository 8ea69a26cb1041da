//! Error taxonomy for the orchestration core.

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Error as JsonError;
use thiserror::Error;

use adlens_core::Error as CoreError;

use crate::registry::ModelId;

/// Result type for orchestration operations.
pub type Result<T> = StdResult<T, OrchestrationError>;

/// Errors surfaced by the orchestration core.
///
/// Only `Validation` and `BudgetExceeded` short-circuit before any upstream
/// cost is incurred; every other outcome is also written to provenance.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// Malformed caller input. Never retried, never logged as a model failure.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Governance denial. Zero cost incurred.
    #[error("Budget exceeded for {cost_class} class: {reason}")]
    BudgetExceeded {
        /// Cost class whose budget is exhausted.
        cost_class: String,
        /// Human-readable denial reason.
        reason: String,
        /// Remaining budget in the class at denial time.
        remaining: u64,
        /// Cheaper intent-affine model, when one exists.
        suggested_downgrade: Option<ModelId>,
    },

    /// Upstream rejected the call for quota or rate-limit reasons.
    #[error("Upstream quota error: {0}")]
    UpstreamQuota(String),

    /// Upstream failed transiently (network, 5xx).
    #[error("Upstream transient error: {0}")]
    UpstreamTransient(String),

    /// Upstream response failed schema validation. Not retried at this layer.
    #[error("Upstream output error: {0}")]
    UpstreamOutput(String),

    /// Upstream call exceeded the per-call timeout.
    #[error("Upstream call timed out after {0}ms")]
    Timeout(u64),

    /// An I/O operation failed (config load/save).
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] JsonError),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl OrchestrationError {
    /// Whether a retry against another key or the fallback model may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::UpstreamQuota(_) | Self::UpstreamTransient(_) | Self::Timeout(_)
        )
    }

    /// Classifies a provider-level error into the orchestration taxonomy.
    #[must_use]
    pub fn from_upstream(error: CoreError) -> Self {
        match error {
            CoreError::QuotaExhausted(message) => Self::UpstreamQuota(message),
            CoreError::InvalidResponse(message) => Self::UpstreamOutput(message),
            other => Self::UpstreamTransient(other.to_string()),
        }
    }
}
