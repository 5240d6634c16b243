//! Gemini `generateContent` client with a single bounded retry and circuit breaker

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::config::LlmConfig;
use super::{
    build_prompt, guarded, probe_url, redact_url, send_with_single_retry, upstream_error,
    GenerationError, GenerativeClient, Reachability,
};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

/// Google Generative Language client
pub struct GeminiClient {
    http: Client,
    config: LlmConfig,
    url: String,
    breaker: CircuitBreaker,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        let url = config.gemini_url();

        Ok(Self {
            http,
            config,
            url,
            breaker,
        })
    }

    /// Call the generateContent API
    async fn call_generate_api(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };

        debug!("Calling Gemini generateContent: model={}", self.config.model);

        let response = send_with_single_retry(
            self.config.deadline(),
            self.config.retry_backoff(),
            || {
                let mut req = self.http.post(&self.url).json(&body);

                if let Some(token) = &self.config.bearer_token {
                    req = req.bearer_auth(token.expose_secret());
                } else if let Some(key) = &self.config.api_key {
                    req = req.query(&[("key", key.expose_secret().as_str())]);
                }

                req.send()
            },
        )
        .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        extract_answer(&data)
            .ok_or_else(|| GenerationError::InvalidResponse("no text in response".to_string()))
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<String, GenerationError> {
        if !self.is_configured() {
            warn!("Gemini not configured at call time: no API key or bearer token");
            return Err(GenerationError::MissingCredential("gemini".to_string()));
        }

        let prompt = build_prompt(question, context);
        guarded(&self.breaker, "gemini", self.call_generate_api(&prompt)).await
    }

    fn provider(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn is_configured(&self) -> bool {
        self.config.has_credential()
    }

    fn endpoint(&self) -> Option<String> {
        Some(redact_url(&self.url))
    }

    async fn probe(&self) -> Reachability {
        probe_url(&self.http, &self.url).await
    }
}

/// Best-effort answer extraction across the response shapes Gemini endpoints use
pub fn extract_answer(data: &Value) -> Option<String> {
    let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };

    if let Some(candidate) = data.get("candidates").and_then(|c| c.get(0)) {
        if let Some(parts) = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array)
        {
            let text: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            if let Some(answer) = non_empty(text.join("")) {
                return Some(answer);
            }
        }

        for key in ["content", "output"] {
            if let Some(text) = candidate.get(key).and_then(Value::as_str) {
                if let Some(answer) = non_empty(text.to_string()) {
                    return Some(answer);
                }
            }
        }
    }

    if let Some(text) = data
        .get("output")
        .and_then(|o| o.get(0))
        .and_then(|o| o.get("content"))
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
    {
        if let Some(answer) = non_empty(text.to_string()) {
            return Some(answer);
        }
    }

    data.get("text")
        .and_then(Value::as_str)
        .and_then(|t| non_empty(t.to_string()))
}

// Request types for the generateContent API
#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}
