//! OpenAI-Compatible Chat Client
//!
//! Client for the chat completions API, either on api.openai.com (or any
//! compatible proxy) or on an Azure OpenAI deployment.
//!
//! | Mode   | URL                                                              | Auth header      |
//! |--------|------------------------------------------------------------------|------------------|
//! | OpenAI | `{base}/chat/completions`                                        | `Authorization`  |
//! | Azure  | `{endpoint}/openai/deployments/{model}/chat/completions?api-version=…` | `api-key`  |
//!
//! The persona is sent as the system message, the prompt as the user message.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = OpenAiClient::with_api_key("gpt-4o-mini", &key)?;
//! let request = OracleRequest::new("You are a QA analyst.", prompt).json();
//! let response = client.generate(&request).await?;
//! ```

use crate::llm::{LlmClient, LlmError, LlmResponse, OracleRequest, TokenUsage};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Default OpenAI API URL
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Default Azure OpenAI API version
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Endpoint {
    OpenAi,
    Azure { api_version: String },
}

/// OpenAI-compatible chat client
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    /// Base URL (OpenAI) or resource endpoint (Azure)
    base_url: String,
    /// Model name, or deployment name on Azure
    model: String,
    /// Request timeout
    timeout: Duration,
    /// HTTP client with auth headers
    client: Client,
    endpoint: Endpoint,
}

impl OpenAiClient {
    /// Create an OpenAI client with explicit API key
    pub fn with_api_key(model: &str, api_key: &str) -> Result<Self, LlmError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| LlmError::InvalidResponse(format!("Invalid API key format: {}", e)))?;
        Self::build(model, DEFAULT_OPENAI_URL, AUTHORIZATION.as_str(), auth, Endpoint::OpenAi)
    }

    /// Create a client for an Azure OpenAI deployment
    pub fn azure(
        endpoint: &str,
        deployment: &str,
        api_key: &str,
        api_version: &str,
    ) -> Result<Self, LlmError> {
        let auth = HeaderValue::from_str(api_key)
            .map_err(|e| LlmError::InvalidResponse(format!("Invalid API key format: {}", e)))?;
        Self::build(
            deployment,
            endpoint,
            "api-key",
            auth,
            Endpoint::Azure {
                api_version: api_version.to_string(),
            },
        )
    }

    fn build(
        model: &str,
        base_url: &str,
        auth_header: &'static str,
        auth: HeaderValue,
        endpoint: Endpoint,
    ) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(auth_header, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::NetworkError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(120),
            client,
            endpoint,
        })
    }

    /// Set custom base URL (proxies, compatible APIs, test servers)
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_azure(&self) -> bool {
        matches!(self.endpoint, Endpoint::Azure { .. })
    }

    fn completions_url(&self) -> String {
        match &self.endpoint {
            Endpoint::OpenAi => format!("{}/chat/completions", self.base_url),
            Endpoint::Azure { api_version } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.base_url, self.model, api_version
            ),
        }
    }
}

/// Request body for chat completions
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl<'a> ChatRequest<'a> {
    fn from_oracle(model: &'a str, request: &'a OracleRequest) -> Self {
        Self {
            model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.persona,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            response_format: request.json_response.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

/// Response from chat completions
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

/// Error response body
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else if e.is_connect() {
        LlmError::NetworkError(format!("Connection failed: {}", e))
    } else {
        LlmError::NetworkError(e.to_string())
    }
}

impl LlmClient for OpenAiClient {
    fn generate<'a>(
        &'a self,
        request: &'a OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            let start = Instant::now();
            let body = ChatRequest::from_oracle(&self.model, request);

            let response = self
                .client
                .post(self.completions_url())
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status();

            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);

                return Err(LlmError::RateLimited { retry_after });
            }

            if !status.is_success() {
                let error_body: Result<ErrorResponse, _> = response.json().await;
                let message = error_body
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| "Unknown error".to_string());

                return Err(LlmError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat_response: ChatResponse = response.json().await.map_err(|e| {
                LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;

            let content = chat_response
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            let tokens = chat_response
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default();

            Ok(LlmResponse {
                content,
                tokens,
                latency: start.elapsed(),
            })
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
        })
    }

    async fn client_for(server: &MockServer) -> OpenAiClient {
        OpenAiClient::with_api_key("gpt-4o-mini", "test-key")
            .unwrap()
            .with_base_url(&server.uri())
    }

    // ==========================================
    // Client Configuration Tests
    // ==========================================

    #[test]
    fn test_client_defaults() {
        let client = OpenAiClient::with_api_key("gpt-4o-mini", "test-key").unwrap();
        assert_eq!(client.model_name(), "gpt-4o-mini");
        assert_eq!(client.completions_url(), "https://api.openai.com/v1/chat/completions");
        assert!(!client.is_azure());
    }

    #[test]
    fn test_azure_url() {
        let client = OpenAiClient::azure(
            "https://example.openai.azure.com/",
            "gpt-4o",
            "key",
            "2024-02-15-preview",
        )
        .unwrap();
        assert!(client.is_azure());
        assert_eq!(
            client.completions_url(),
            "https://example.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn test_request_serialization() {
        let request = OracleRequest::new("You are strict.", "Judge this.")
            .with_temperature(Some(0.0))
            .json();
        let body = serde_json::to_value(ChatRequest::from_oracle("gpt-4o", &request)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "You are strict."},
                    {"role": "user", "content": "Judge this."}
                ],
                "temperature": 0.0,
                "response_format": {"type": "json_object"}
            })
        );
    }

    #[test]
    fn test_request_omits_unset_hints() {
        let request = OracleRequest::new("p", "q");
        let body = serde_json::to_value(ChatRequest::from_oracle("m", &request)).unwrap();
        assert!(body.get("temperature").is_none());
        assert!(body.get("response_format").is_none());
    }

    // ==========================================
    // Mock HTTP Server Tests
    // ==========================================

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("ANSWER: {}")))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let response = client.generate(&OracleRequest::new("p", "q")).await.unwrap();
        assert_eq!(response.content, "ANSWER: {}");
        assert_eq!(response.tokens, TokenUsage::new(12, 4));
    }

    #[tokio::test]
    async fn test_generate_azure_deployment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/judge/chat/completions"))
            .and(query_param("api-version", "2024-06-01"))
            .and(header("api-key", "azure-key"))
            .and(body_partial_json(json!({"response_format": {"type": "json_object"}})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion("{\"intent\":\"refund\"}")),
            )
            .mount(&server)
            .await;

        let client =
            OpenAiClient::azure(&server.uri(), "judge", "azure-key", "2024-06-01").unwrap();
        let request = OracleRequest::new("auditor", "dialog").json();
        let response = client.generate(&request).await.unwrap();
        assert_eq!(response.content, "{\"intent\":\"refund\"}");
    }

    #[tokio::test]
    async fn test_generate_rate_limited_with_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).append_header("retry-after", "30"))
            .mount(&server)
            .await;

        let result = client_for(&server).await.generate(&OracleRequest::new("p", "q")).await;
        assert_eq!(
            result.unwrap_err(),
            LlmError::RateLimited {
                retry_after: Some(Duration::from_secs(30))
            }
        );
    }

    #[tokio::test]
    async fn test_generate_api_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                json!({"error": {"message": "Bad request", "type": "invalid_request_error"}}),
            ))
            .mount(&server)
            .await;

        let result = client_for(&server).await.generate(&OracleRequest::new("p", "q")).await;
        assert_eq!(
            result.unwrap_err(),
            LlmError::ApiError {
                status: 400,
                message: "Bad request".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_generate_server_error_unparseable_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .await
            .generate(&OracleRequest::new("p", "q"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_generate_invalid_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = client_for(&server).await.generate(&OracleRequest::new("p", "q")).await;
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_generate_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = client_for(&server)
            .await
            .with_timeout(Duration::from_millis(100));
        let result = client.generate(&OracleRequest::new("p", "q")).await;
        assert_eq!(result.unwrap_err(), LlmError::Timeout);
    }

    #[tokio::test]
    async fn test_generate_null_content_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let response = client_for(&server)
            .await
            .generate(&OracleRequest::new("p", "q"))
            .await
            .unwrap();
        assert_eq!(response.content, "");
        assert_eq!(response.tokens, TokenUsage::default());
    }
}
