use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, Result};

/// Trait for upstream model clients that can execute completion requests.
///
/// Implementations are stateless with respect to credentials: the caller
/// supplies the API key per call so a pool of interchangeable keys can be
/// rotated above this seam.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Returns the unique identifier for this client.
    fn name(&self) -> &'static str;

    /// Checks whether this client is currently able to process requests.
    async fn is_available(&self) -> bool;

    /// Executes one completion request against the upstream service.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::QuotaExhausted`] on rate-limit rejections,
    /// [`crate::Error::Provider`] on transient upstream failures, and
    /// [`crate::Error::InvalidResponse`] when the response body cannot be
    /// parsed.
    async fn complete(&self, api_key: &str, request: &CompletionRequest)
        -> Result<CompletionResponse>;
}
