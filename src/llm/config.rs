//! Configuration for the generative fallback client

use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::config::parse_flag;

/// Generative provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    /// `gemini`, `openai` (chat-completions compatible) or `none`
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// API key (read from env GEMINI_API_KEY if not set)
    #[serde(default)]
    pub api_key: Option<SecretString>,

    /// OAuth bearer token, used instead of the key when present
    #[serde(default)]
    pub bearer_token: Option<SecretString>,

    /// Endpoint URL; derived from the model for Gemini when unset
    #[serde(default)]
    pub api_url: Option<String>,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Overall deadline for one generation, retry included
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Backoff before the single transient-error retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Circuit breaker failure threshold
    #[serde(default = "default_breaker_failures")]
    pub circuit_breaker_failures: usize,

    /// Circuit breaker reset timeout in seconds
    #[serde(default = "default_breaker_reset")]
    pub circuit_breaker_reset_secs: u64,
}

fn default_provider() -> String {
    "gemini".to_string()
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_deadline_ms() -> u64 {
    25_000
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_max_tokens() -> usize {
    512
}

fn default_temperature() -> f32 {
    0.3
}

fn default_breaker_failures() -> usize {
    5
}

fn default_breaker_reset() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            bearer_token: None,
            api_url: None,
            timeout_ms: default_timeout_ms(),
            deadline_ms: default_deadline_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            circuit_breaker_failures: default_breaker_failures(),
            circuit_breaker_reset_secs: default_breaker_reset(),
        }
    }
}

impl LlmConfig {
    /// Override fields from a variable lookup
    pub fn from_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("LLM_PROVIDER") {
            self.provider = val.to_lowercase();
        }

        if let Some(val) = lookup("GEMINI_API_KEY").filter(|v| !v.is_empty()) {
            self.api_key = Some(SecretString::new(val));
        }

        if let Some(val) = lookup("GEMINI_BEARER_TOKEN").filter(|v| !v.is_empty()) {
            self.bearer_token = Some(SecretString::new(val));
        }

        if let Some(val) = lookup("GEMINI_MODEL") {
            self.model = val;
        }

        if let Some(val) = lookup("GEMINI_API_URL").filter(|v| !v.is_empty()) {
            self.api_url = Some(val);
        }

        if let Some(val) = lookup("LLM_TIMEOUT_MS") {
            if let Ok(timeout) = val.parse() {
                self.timeout_ms = timeout;
            }
        }

        if let Some(val) = lookup("LLM_DEADLINE_MS") {
            if let Ok(deadline) = val.parse() {
                self.deadline_ms = deadline;
            }
        }

        if let Some(val) = lookup("LLM_DISABLED") {
            if parse_flag(&val) {
                self.provider = "none".to_string();
            }
        }

        self
    }

    /// Whether a credential is present
    pub fn has_credential(&self) -> bool {
        self.api_key.is_some() || self.bearer_token.is_some()
    }

    /// Gemini `generateContent` URL for the configured model
    pub fn gemini_url(&self) -> String {
        if let Some(url) = &self.api_url {
            return url.clone();
        }
        let model_path = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };
        format!(
            "https://generativelanguage.googleapis.com/v1beta/{}:generateContent",
            model_path
        )
    }

    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the overall deadline as Duration
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms.max(self.timeout_ms))
    }

    /// Get circuit breaker reset timeout as Duration
    pub fn breaker_reset_timeout(&self) -> Duration {
        Duration::from_secs(self.circuit_breaker_reset_secs)
    }

    /// Get retry backoff as Duration
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
