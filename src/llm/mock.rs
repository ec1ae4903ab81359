//! Scripted oracle for tests and dry runs
//!
//! Replies come either from a fixed script (consumed in call order, the last
//! entry repeating once the script runs out) or from a responder closure that
//! sees each request. Every request is recorded for later assertions.

use crate::llm::{LlmClient, LlmError, LlmResponse, OracleRequest, TokenUsage};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted reply
#[derive(Debug, Clone, PartialEq)]
pub struct MockReply {
    pub outcome: Result<String, LlmError>,
    pub delay: Option<Duration>,
}

impl MockReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            outcome: Ok(content.into()),
            delay: None,
        }
    }

    pub fn error(error: LlmError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    /// Delay the reply by `delay`
    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

type Responder = dyn Fn(&OracleRequest, usize) -> MockReply + Send + Sync;

/// Deterministic in-process oracle
pub struct MockOracleClient {
    responder: Box<Responder>,
    calls: AtomicUsize,
    requests: Mutex<Vec<OracleRequest>>,
    model: String,
}

impl MockOracleClient {
    /// Replies in call order; the last reply repeats
    pub fn scripted(script: Vec<MockReply>) -> Self {
        let script = Arc::new(script);
        Self::from_fn(move |_, call| {
            script
                .get(call)
                .or_else(|| script.last())
                .cloned()
                .unwrap_or_else(|| MockReply::error(LlmError::EmptyResponse))
        })
    }

    /// The same reply to every request
    pub fn constant(reply: MockReply) -> Self {
        Self::from_fn(move |_, _| reply.clone())
    }

    /// Reply computed from the request and the 0-based call index
    pub fn from_fn<F>(responder: F) -> Self
    where
        F: Fn(&OracleRequest, usize) -> MockReply + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            model: "mock-oracle".to_string(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in arrival order
    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl LlmClient for MockOracleClient {
    fn generate<'a>(
        &'a self,
        request: &'a OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LlmResponse, LlmError>> + Send + 'a>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.requests.lock() {
            log.push(request.clone());
        }
        let reply = (self.responder)(request, call);

        Box::pin(async move {
            if let Some(delay) = reply.delay {
                tokio::time::sleep(delay).await;
            }
            reply.outcome.map(|content| LlmResponse {
                tokens: TokenUsage::new(request.prompt.len() / 4, content.len() / 4),
                content,
                latency: reply.delay.unwrap_or_default(),
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

    #[tokio::test]
    async fn test_script_repeats_last_reply() {
        let mock = MockOracleClient::scripted(vec![MockReply::text("a"), MockReply::text("b")]);
        let request = OracleRequest::new("p", "q");
        let mut replies = Vec::new();
        for _ in 0..4 {
            replies.push(mock.generate(&request).await.unwrap().content);
        }
        assert_eq!(replies, ["a", "b", "b", "b"]);
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn test_responder_sees_request() {
        let mock = MockOracleClient::from_fn(|request, _| MockReply::text(request.persona.clone()));
        let response = mock
            .generate(&OracleRequest::new("skeptic", "dialog"))
            .await
            .unwrap();
        assert_eq!(response.content, "skeptic");
        assert_eq!(mock.requests()[0].prompt, "dialog");
    }

    #[tokio::test]
    async fn test_error_reply() {
        let mock = MockOracleClient::constant(MockReply::error(LlmError::Timeout));
        let result = mock.generate(&OracleRequest::new("p", "q")).await;
        assert_eq!(result.unwrap_err(), LlmError::Timeout);
    }
}
