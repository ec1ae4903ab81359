//! Run configuration
//!
//! One `PipelineConfig` per run, loaded from an optional JSON file (every
//! field defaulted) and shared immutably behind an `Arc`. Secrets never live
//! here: providers name the environment variable that holds their key.

use crate::core::dispatch::DEFAULT_ROUNDS;
use crate::core::controller::DEFAULT_WORKERS;
use crate::core::verify::VERIFIER_TEMPERATURE;
use crate::llm::adapter::DEFAULT_AZURE_ENV_PREFIX;
use crate::llm::{ProviderConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment prefix of the analyst deployment
pub const ANALYST_ENV_PREFIX: &str = DEFAULT_AZURE_ENV_PREFIX;

/// Environment prefix of the verifier deployment
pub const VERIFIER_ENV_PREFIX: &str = "MINI";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {}", problems.join("; "))]
    Invalid { problems: Vec<String> },
}

/// Retry budget, in file-friendly units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Extra random share of each delay, 0.0..=1.0
    pub jitter_factor: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: retry.max_attempts,
            base_delay_ms: retry.base_delay.as_millis() as u64,
            max_delay_ms: retry.max_delay.as_millis() as u64,
            jitter_factor: retry.jitter_factor,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter_factor,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Voting rounds per item
    pub rounds: usize,
    /// Concurrent items
    pub workers: usize,
    /// Minimum valid judgments per item; unset means every round must parse
    pub min_votes: Option<usize>,
    pub retry: RetrySettings,
    pub analyst: ProviderConfig,
    pub verifier: ProviderConfig,
    /// Unset leaves the provider's default
    pub analyst_temperature: Option<f64>,
    pub verifier_temperature: f64,
    /// Directory holding the dataset and record files
    pub data_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            workers: DEFAULT_WORKERS,
            min_votes: None,
            retry: RetrySettings::default(),
            analyst: ProviderConfig::azure_from_env(ANALYST_ENV_PREFIX),
            verifier: ProviderConfig::azure_from_env(VERIFIER_ENV_PREFIX),
            analyst_temperature: None,
            verifier_temperature: VERIFIER_TEMPERATURE,
            data_dir: PathBuf::from("data"),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let config: Self = serde_json::from_str(text)?;
        Ok(config.with_role_prefixes())
    }

    /// Provider sections without `env_prefix` keep their role's variables
    fn with_role_prefixes(mut self) -> Self {
        let roles = [
            (&mut self.analyst, ANALYST_ENV_PREFIX),
            (&mut self.verifier, VERIFIER_ENV_PREFIX),
        ];
        for (provider, prefix) in roles {
            if provider.env_prefix.is_none() {
                provider.env_prefix = Some(prefix.to_string());
            }
        }
        self
    }

    /// Load `path` when given, defaults otherwise; validated either way
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Collect every problem rather than stopping at the first
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.rounds == 0 {
            problems.push("rounds must be >= 1".to_string());
        }
        if self.workers == 0 {
            problems.push("workers must be >= 1".to_string());
        }
        if let Some(min) = self.min_votes {
            if min == 0 || min > self.rounds {
                problems.push(format!(
                    "min_votes must be in 1..={}, got {}",
                    self.rounds, min
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            problems.push("retry.max_attempts must be >= 1".to_string());
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            problems.push("retry.base_delay_ms must not exceed retry.max_delay_ms".to_string());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            problems.push(format!(
                "retry.jitter_factor must be in 0.0..=1.0, got {}",
                self.retry.jitter_factor
            ));
        }
        let temperatures = self
            .analyst_temperature
            .into_iter()
            .map(|t| ("analyst_temperature", t))
            .chain([("verifier_temperature", self.verifier_temperature)]);
        for (name, value) in temperatures {
            if !(0.0..=2.0).contains(&value) {
                problems.push(format!("{} must be in 0.0..=2.0, got {}", name, value));
            }
        }
        for (name, provider) in [("analyst", &self.analyst), ("verifier", &self.verifier)] {
            if provider.timeout_secs == 0 {
                problems.push(format!("{}.timeout_secs must be >= 1", name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}
