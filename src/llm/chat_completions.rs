//! OpenAI-compatible chat completions client

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use super::config::LlmConfig;
use super::{
    build_prompt, guarded, probe_url, redact_url, send_with_single_retry, upstream_error,
    GenerationError, GenerativeClient, Reachability,
};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str =
    "You are a concise assistant. Answer the question directly in a few sentences.";

/// Chat completions client
pub struct ChatCompletionsClient {
    http: Client,
    config: LlmConfig,
    url: String,
    breaker: CircuitBreaker,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.circuit_breaker_failures,
            reset_timeout: config.breaker_reset_timeout(),
        });

        let url = config.api_url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());

        Ok(Self {
            http,
            config,
            url,
            breaker,
        })
    }

    async fn call_completions_api(&self, prompt: String) -> Result<String, GenerationError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        debug!("Calling chat completions: model={}", self.config.model);

        let response = send_with_single_retry(
            self.config.deadline(),
            self.config.retry_backoff(),
            || {
                let mut req = self.http.post(&self.url).json(&request);
                let token = self.config.bearer_token.as_ref().or(self.config.api_key.as_ref());
                if let Some(token) = token {
                    req = req.bearer_auth(token.expose_secret());
                }
                req.send()
            },
        )
        .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let resp: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| {
                GenerationError::InvalidResponse(format!("Failed to parse response: {}", e))
            })?;

        resp.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| GenerationError::InvalidResponse("No choices in response".to_string()))
    }
}

#[async_trait]
impl GenerativeClient for ChatCompletionsClient {
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<String, GenerationError> {
        if !self.is_configured() {
            warn!("Chat completions provider has no API key");
            return Err(GenerationError::MissingCredential("openai".to_string()));
        }

        let prompt = build_prompt(question, context);
        guarded(&self.breaker, "openai", self.call_completions_api(prompt)).await
    }

    fn provider(&self) -> &str {
        "openai"
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

// OpenAI-compatible API types
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
