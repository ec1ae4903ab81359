//! Provider construction from configuration
//!
//! Turns a [`ProviderConfig`] into a shared `Arc<dyn LlmClient>`. Secrets
//! are never stored in configuration files: the API key is read from the
//! environment variable the config names. Azure deployments additionally
//! fall back to the `{PREFIX}_ENDPOINT`, `{PREFIX}_API_KEY`,
//! `{PREFIX}_API_VERSION` and `{PREFIX}_DEPLOYMENT` variables of the
//! deployment's `env_prefix`.

use crate::llm::ollama::{OllamaClient, DEFAULT_OLLAMA_URL};
use crate::llm::openai::{OpenAiClient, DEFAULT_AZURE_API_VERSION, DEFAULT_OPENAI_URL};
use crate::llm::{LlmClient, LlmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Valid provider names, for help and error messages
pub const VALID_PROVIDERS: &[&str] = &["openai", "azure", "ollama"];

/// Default OpenAI model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default Ollama model
pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

/// Azure variable prefix used when a config names none
pub const DEFAULT_AZURE_ENV_PREFIX: &str = "AZURE_OPENAI";

/// Supported oracle backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI or any compatible chat completions endpoint
    OpenAi,
    /// Azure OpenAI deployment
    #[default]
    Azure,
    /// Local Ollama server
    Ollama,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Ollama => "ollama",
        })
    }
}

/// Oracle provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend to talk to
    pub provider: ProviderKind,
    /// Model name, or deployment name on Azure
    pub model: Option<String>,
    /// Base URL, or resource endpoint on Azure
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: Option<String>,
    /// Azure API version
    pub api_version: Option<String>,
    /// Prefix of the Azure fallback environment variables
    pub env_prefix: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: None,
            base_url: None,
            api_key_env: None,
            api_version: None,
            env_prefix: None,
            timeout_secs: 120,
        }
    }
}

impl ProviderConfig {
    /// Azure deployment configured from `{prefix}_*` variables
    pub fn azure_from_env(prefix: &str) -> Self {
        Self {
            provider: ProviderKind::Azure,
            env_prefix: Some(prefix.to_string()),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Provider could not be constructed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// A required setting was neither configured nor in the environment
    #[error("{provider} provider requires {setting} (set {hint})")]
    MissingSetting {
        provider: ProviderKind,
        setting: &'static str,
        hint: String,
    },
    /// Client construction failed
    #[error("failed to create {provider} client: {source}")]
    Client {
        provider: ProviderKind,
        #[source]
        source: LlmError,
    },
}

/// Create a client from configuration and the process environment
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn LlmClient>, ProviderError> {
    create_provider_with_env(config, |name| std::env::var(name).ok())
}

/// Create a client with an explicit environment lookup
pub fn create_provider_with_env<E>(
    config: &ProviderConfig,
    env: E,
) -> Result<Arc<dyn LlmClient>, ProviderError>
where
    E: Fn(&str) -> Option<String>,
{
    let provider = config.provider;
    let prefix = config
        .env_prefix
        .as_deref()
        .unwrap_or(DEFAULT_AZURE_ENV_PREFIX);
    let prefixed = |suffix: &str| env(&format!("{}_{}", prefix, suffix));
    let missing = |setting: &'static str, hint: String| ProviderError::MissingSetting {
        provider,
        setting,
        hint,
    };
    let client_error = |source| ProviderError::Client { provider, source };

    match provider {
        ProviderKind::Ollama => {
            let model = config.model.as_deref().unwrap_or(DEFAULT_OLLAMA_MODEL);
            let url = config.base_url.as_deref().unwrap_or(DEFAULT_OLLAMA_URL);
            Ok(Arc::new(
                OllamaClient::with_url(model, url).with_timeout(config.timeout()),
            ))
        }
        ProviderKind::OpenAi => {
            let key_env = config.api_key_env.as_deref().unwrap_or("OPENAI_API_KEY");
            let api_key = env(key_env).ok_or_else(|| missing("an API key", key_env.to_string()))?;
            let model = config.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            let client = OpenAiClient::with_api_key(model, &api_key)
                .map_err(client_error)?
                .with_base_url(config.base_url.as_deref().unwrap_or(DEFAULT_OPENAI_URL))
                .with_timeout(config.timeout());
            Ok(Arc::new(client))
        }
        ProviderKind::Azure => {
            let endpoint = config
                .base_url
                .clone()
                .or_else(|| prefixed("ENDPOINT"))
                .ok_or_else(|| {
                    missing("an endpoint", format!("base_url or {}_ENDPOINT", prefix))
                })?;
            let api_key = match config.api_key_env.as_deref() {
                Some(name) => env(name),
                None => prefixed("API_KEY"),
            }
            .ok_or_else(|| {
                missing(
                    "an API key",
                    config
                        .api_key_env
                        .clone()
                        .unwrap_or_else(|| format!("{}_API_KEY", prefix)),
                )
            })?;
            let deployment = config
                .model
                .clone()
                .or_else(|| prefixed("DEPLOYMENT"))
                .ok_or_else(|| {
                    missing("a deployment", format!("model or {}_DEPLOYMENT", prefix))
                })?;
            let api_version = config
                .api_version
                .clone()
                .or_else(|| prefixed("API_VERSION"))
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string());

            let client = OpenAiClient::azure(&endpoint, &deployment, &api_key, &api_version)
                .map_err(client_error)?
                .with_timeout(config.timeout());
            Ok(Arc::new(client))
        }
    }
}
