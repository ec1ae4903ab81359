//! Oracle Provider Abstraction
//!
//! A single narrow async trait for one oracle round trip, so the dispatcher
//! and verifier stay provider-agnostic. Implementations: OpenAI-compatible
//! chat completions (including Azure deployments), Ollama, and a scripted
//! mock for tests.
//!
//! # Architecture
//!
//! ```text
//! RoundDispatcher / Verifier → Oracle (retry) → LlmClient → [OpenAiClient, OllamaClient, MockOracleClient]
//! ```

pub mod adapter;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod oracle;
pub mod retry;

pub use adapter::{create_provider, ProviderConfig, ProviderKind};
pub use mock::{MockOracleClient, MockReply};
pub use oracle::Oracle;
pub use retry::{call_with_retry, RetryConfig, RetryError};

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// One oracle request: persona, prompt and decoding hints
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    /// System persona framing the judgment
    pub persona: String,
    /// User prompt carrying the dialog
    pub prompt: String,
    /// Sampling temperature; `None` leaves the provider default
    pub temperature: Option<f64>,
    /// Ask the provider for a JSON object reply
    pub json_response: bool,
}

impl OracleRequest {
    /// Create a request with provider-default decoding
    pub fn new(persona: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            prompt: prompt.into(),
            temperature: None,
            json_response: false,
        }
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Request JSON-mode output
    pub fn json(mut self) -> Self {
        self.json_response = true;
        self
    }
}

/// Response from an oracle round trip
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    /// Generated text content
    pub content: String,
    /// Token usage reported by the provider
    pub tokens: TokenUsage,
    /// API call latency
    pub latency: Duration,
}

/// Token usage breakdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TokenUsage {
    /// Input/prompt tokens
    pub input: usize,
    /// Output/completion tokens
    pub output: usize,
}

impl TokenUsage {
    pub fn new(input: usize, output: usize) -> Self {
        Self { input, output }
    }

    /// Total tokens (input + output)
    pub fn total(&self) -> usize {
        self.input + self.output
    }
}

/// Errors that can occur during an oracle round trip
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// Rate limited by the API (429)
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Suggested retry delay from Retry-After header
        retry_after: Option<Duration>,
    },
    /// Request timed out
    #[error("Request timed out")]
    Timeout,
    /// Network connectivity issue
    #[error("Network error: {0}")]
    NetworkError(String),
    /// API returned an error response
    #[error("API error {status}: {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from API
        message: String,
    },
    /// Provider body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Provider answered with no content
    #[error("Empty response from oracle")]
    EmptyResponse,
}

impl LlmError {
    /// Check if this error is a transient oracle failure
    ///
    /// Retryable: RateLimited, Timeout, NetworkError, EmptyResponse, 5xx.
    /// Non-retryable: 4xx ApiErrors (except 429), InvalidResponse.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Timeout => true,
            LlmError::NetworkError(_) => true,
            LlmError::EmptyResponse => true,
            LlmError::ApiError { status, .. } => *status >= 500 || *status == 429,
            LlmError::InvalidResponse(_) => false,
        }
    }
}

/// Unified trait for oracle clients
///
/// Object-safe through explicit boxing of the async return type, so clients
/// are shared as `Arc<dyn LlmClient>` across workers.
///
/// # Example
///
/// ```rust,ignore
/// async fn ask(client: &dyn LlmClient, prompt: &str) -> Result<String, LlmError> {
///     let request = OracleRequest::new("You are a QA analyst.", prompt);
///     Ok(client.generate(&request).await?.content)
/// }
/// ```
pub trait LlmClient: Send + Sync {
    /// Perform one round trip for the request
    fn generate<'a>(
        &'a self,
        request: &'a OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>>;

    /// Get the model name/identifier
    fn model_name(&self) -> &str;
}
