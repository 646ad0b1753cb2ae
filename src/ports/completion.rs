use async_trait::async_trait;

use crate::domain::{DomainError, GenerationRequest, ModelEndpoint, SamplingConfig};

/// Port for model completions.
///
/// One call is one request to one endpoint. Failover across endpoints is the
/// orchestrator's job, so implementations must not retry.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send `request` to `endpoint` and return the generated text.
    ///
    /// A response without generated text is an error
    /// ([`DomainError::MissingCompletionText`]), never an empty string.
    async fn complete(
        &self,
        endpoint: &ModelEndpoint,
        request: &GenerationRequest,
        sampling: &SamplingConfig,
    ) -> Result<String, DomainError>;
}
