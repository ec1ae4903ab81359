//! Oracle round trip with bounded retry
//!
//! Wraps a shared [`LlmClient`] with the run's [`RetryConfig`]. A reply with
//! no text counts as a transient failure and is retried like a timeout.

use crate::llm::retry::{call_with_retry, RetryConfig, RetryError};
use crate::llm::{LlmClient, LlmError, LlmResponse, OracleRequest};
use std::sync::Arc;

/// Retrying oracle shared by every worker of a phase
#[derive(Clone)]
pub struct Oracle {
    client: Arc<dyn LlmClient>,
    retry: RetryConfig,
}

impl std::fmt::Debug for Oracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Oracle")
            .field("model", &self.client.model_name())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Oracle {
    pub fn new(client: Arc<dyn LlmClient>, retry: RetryConfig) -> Self {
        Self { client, retry }
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// One logical round trip: up to `max_attempts` provider calls
    pub async fn ask(&self, request: &OracleRequest) -> Result<LlmResponse, RetryError> {
        call_with_retry(
            || async {
                let response = self.client.generate(request).await?;
                if response.content.trim().is_empty() {
                    return Err(LlmError::EmptyResponse);
                }
                Ok(response)
            },
            &self.retry,
        )
        .await
    }
}
