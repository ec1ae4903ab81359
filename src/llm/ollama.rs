//! Ollama Client
//!
//! Client for local Ollama inference through `/api/generate`. The persona is
//! passed as the `system` field; a JSON hint maps to `"format": "json"`.
//!
//! # Requirements
//!
//! - Ollama must be running (default: http://localhost:11434)
//! - The model must be pulled (e.g., `ollama pull llama3`)

use crate::llm::{LlmClient, LlmError, LlmResponse, OracleRequest, TokenUsage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// Default Ollama server URL
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Ollama client for local inference
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OllamaClient {
    /// Create a client against the default URL
    pub fn new(model: &str) -> Self {
        Self::with_url(model, DEFAULT_OLLAMA_URL)
    }

    pub fn with_url(model: &str, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout: Duration::from_secs(120),
            client: Client::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerateOptions>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

impl<'a> GenerateRequest<'a> {
    fn from_oracle(model: &'a str, request: &'a OracleRequest) -> Self {
        Self {
            model,
            system: &request.persona,
            prompt: &request.prompt,
            stream: false,
            format: request.json_response.then_some("json"),
            options: request
                .temperature
                .map(|temperature| GenerateOptions { temperature }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<usize>,
    #[serde(default)]
    eval_count: Option<usize>,
}

impl LlmClient for OllamaClient {
    fn generate<'a>(
        &'a self,
        request: &'a OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            let start = Instant::now();
            let body = GenerateRequest::from_oracle(&self.model, request);
            let url = format!("{}/api/generate", self.base_url);

            let response = self
                .client
                .post(&url)
                .json(&body)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        LlmError::Timeout
                    } else if e.is_connect() {
                        LlmError::NetworkError(format!("Connection failed: {}", e))
                    } else {
                        LlmError::NetworkError(e.to_string())
                    }
                })?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }

            let generated: GenerateResponse = response.json().await.map_err(|e| {
                LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;

            Ok(LlmResponse {
                content: generated.response,
                tokens: TokenUsage::new(
                    generated.prompt_eval_count.unwrap_or(0),
                    generated.eval_count.unwrap_or(0),
                ),
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
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_client_with_url_trims_slash() {
        let client = OllamaClient::with_url("mistral", "http://192.168.1.100:11434/");
        assert_eq!(client.base_url(), "http://192.168.1.100:11434");
        assert_eq!(client.model_name(), "mistral");
    }

    #[test]
    fn test_request_serialization() {
        let request = OracleRequest::new("auditor", "dialog")
            .with_temperature(Some(0.0))
            .json();
        let body = serde_json::to_value(GenerateRequest::from_oracle("llama3", &request)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "llama3",
                "system": "auditor",
                "prompt": "dialog",
                "stream": false,
                "format": "json",
                "options": {"temperature": 0.0}
            })
        );
    }

    #[test]
    fn test_request_without_hints() {
        let request = OracleRequest::new("p", "q");
        let body = serde_json::to_value(GenerateRequest::from_oracle("m", &request)).unwrap();
        assert!(body.get("format").is_none());
        assert!(body.get("options").is_none());
    }

    // ==========================================
    // Mock HTTP Server Tests
    // ==========================================

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({"system": "persona"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "ANSWER: {\"intent\": \"other\"}",
                "prompt_eval_count": 5,
                "eval_count": 2
            })))
            .mount(&server)
            .await;

        let client = OllamaClient::with_url("llama3", &server.uri());
        let response = client
            .generate(&OracleRequest::new("persona", "dialog"))
            .await
            .unwrap();
        assert_eq!(response.content, "ANSWER: {\"intent\": \"other\"}");
        assert_eq!(response.tokens, TokenUsage::new(5, 2));
    }

    #[tokio::test]
    async fn test_generate_missing_token_counts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "hi"})))
            .mount(&server)
            .await;

        let client = OllamaClient::with_url("llama3", &server.uri());
        let response = client.generate(&OracleRequest::new("p", "q")).await.unwrap();
        assert_eq!(response.tokens, TokenUsage::default());
    }

    #[tokio::test]
    async fn test_generate_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let client = OllamaClient::with_url("missing", &server.uri());
        let result = client.generate(&OracleRequest::new("p", "q")).await;
        assert_eq!(
            result.unwrap_err(),
            LlmError::ApiError {
                status: 404,
                message: "model not found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_generate_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let client = OllamaClient::with_url("llama3", &server.uri())
            .with_timeout(Duration::from_millis(100));
        let result = client.generate(&OracleRequest::new("p", "q")).await;
        assert_eq!(result.unwrap_err(), LlmError::Timeout);
    }
}
