//! Generative fallback client
//!
//! Invoked only when the relevance gate rejects retrieval. Providers:
//! - [`GeminiClient`]: Google Generative Language `generateContent`
//! - [`ChatCompletionsClient`]: any OpenAI-compatible chat completions endpoint
//!
//! Every provider makes at most one retry, and only for a transient transport
//! error that leaves room inside the overall deadline.

pub mod canned;
pub mod chat_completions;
pub mod circuit_breaker;
pub mod config;
pub mod gemini;

pub use canned::{
    canned_reply, FixedSelector, RandomSelector, ReplySelector, CANNED_REPLIES, NO_RELEVANT_INFO,
};
pub use chat_completions::ChatCompletionsClient;
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use config::LlmConfig;
pub use gemini::GeminiClient;

use crate::error::{RagError, Result};
use crate::metrics::METRICS;
use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Breaker key for generation calls
pub(crate) const GENERATE_OP: &str = "generate";

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Generative client errors
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("No credential configured for provider {0}")]
    MissingCredential(String),

    #[error("Circuit breaker is open: {0}")]
    CircuitOpen(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Result of an unauthenticated reachability check
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reachability {
    pub reachable: Option<bool>,
    pub error: Option<String>,
}

/// A generative model that turns a question into free text
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Answer `question`, optionally grounded on `context`
    async fn generate(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> std::result::Result<String, GenerationError>;

    /// Provider name reported as the response `mode`
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// Whether a credential is present
    fn is_configured(&self) -> bool;

    /// Endpoint without query string, for diagnostics
    fn endpoint(&self) -> Option<String> {
        None
    }

    /// Unauthenticated reachability check of the endpoint
    async fn probe(&self) -> Reachability {
        Reachability::default()
    }
}

/// Build the client selected by `config.provider`; `none` disables generation
pub fn create_client(config: &LlmConfig) -> Result<Option<Arc<dyn GenerativeClient>>> {
    match config.provider.as_str() {
        "gemini" => {
            let client = GeminiClient::new(config.clone())
                .map_err(|e| RagError::Configuration(e.to_string()))?;
            Ok(Some(Arc::new(client)))
        }
        "openai" => {
            let client = ChatCompletionsClient::new(config.clone())
                .map_err(|e| RagError::Configuration(e.to_string()))?;
            Ok(Some(Arc::new(client)))
        }
        "none" | "disabled" => Ok(None),
        other => Err(RagError::Configuration(format!("Unknown LLM provider: {}", other))),
    }
}

/// User prompt sent to the provider
pub fn build_prompt(question: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) if !ctx.trim().is_empty() => format!(
            "Use the following context if it is relevant.\n\nContext: {}\n\nQuestion: {}",
            ctx, question
        ),
        _ => question.to_string(),
    }
}

/// Strip the query string (which may carry an API key) from a URL
pub fn redact_url(url: &str) -> String {
    url.split('?').next().unwrap_or(url).to_string()
}

fn map_transport_error(e: reqwest::Error) -> GenerationError {
    // the request URL may carry the API key
    let e = e.without_url();
    if e.is_timeout() {
        GenerationError::Timeout(e.to_string())
    } else {
        GenerationError::RequestFailed(e.to_string())
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Send a request with at most one retry on a transient transport error.
///
/// HTTP error statuses are returned as-is and never retried.
pub(crate) async fn send_with_single_retry<F, Fut>(
    deadline: Duration,
    backoff: Duration,
    mut send: F,
) -> std::result::Result<reqwest::Response, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<reqwest::Response, reqwest::Error>>,
{
    let started = Instant::now();

    let first = match tokio::time::timeout(deadline, send()).await {
        Ok(result) => result,
        Err(_) => return Err(GenerationError::Timeout(format!("deadline {:?} exceeded", deadline))),
    };

    let err = match first {
        Ok(response) => return Ok(response),
        Err(e) if is_transient(&e) => e,
        Err(e) => return Err(map_transport_error(e)),
    };

    let remaining = deadline.saturating_sub(started.elapsed());
    if remaining <= backoff {
        return Err(map_transport_error(err));
    }

    warn!(
        "Generation attempt failed: {}, retrying once in {:?}",
        err.without_url(),
        backoff
    );
    tokio::time::sleep(backoff).await;

    let remaining = deadline.saturating_sub(started.elapsed());
    match tokio::time::timeout(remaining, send()).await {
        Ok(result) => result.map_err(map_transport_error),
        Err(_) => Err(GenerationError::Timeout(format!("deadline {:?} exceeded", deadline))),
    }
}

/// Run one generation behind the circuit breaker, recording the outcome
pub(crate) async fn guarded<Fut>(
    breaker: &CircuitBreaker,
    provider: &str,
    call: Fut,
) -> std::result::Result<String, GenerationError>
where
    Fut: Future<Output = std::result::Result<String, GenerationError>>,
{
    if breaker.is_open(GENERATE_OP) {
        METRICS.record_llm_request("circuit_open");
        return Err(GenerationError::CircuitOpen(provider.to_string()));
    }

    match call.await {
        Ok(text) => {
            breaker.mark_success(GENERATE_OP);
            METRICS.record_llm_request("success");
            debug!("Generation succeeded: provider={}", provider);
            Ok(text)
        }
        Err(e) => {
            breaker.mark_failure(GENERATE_OP);
            METRICS.record_llm_request("error");
            Err(e)
        }
    }
}

/// Turn a non-2xx response into an upstream error
pub(crate) async fn upstream_error(response: reqwest::Response) -> GenerationError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    let body: String = body.chars().take(200).collect();
    GenerationError::UpstreamError(format!("Status {}: {}", status, body))
}

/// HEAD the endpoint without credentials; reachable iff status < 500
pub(crate) async fn probe_url(http: &reqwest::Client, url: &str) -> Reachability {
    match http.head(redact_url(url)).timeout(PROBE_TIMEOUT).send().await {
        Ok(response) => {
            let reachable = response.status().as_u16() < 500;
            Reachability {
                reachable: Some(reachable),
                error: (!reachable).then(|| format!("status={}", response.status().as_u16())),
            }
        }
        Err(e) => Reachability {
            reachable: Some(false),
            error: Some(e.to_string().chars().take(200).collect()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt() {
        assert_eq!(build_prompt("What is 2+2?", None), "What is 2+2?");
        assert_eq!(build_prompt("What is 2+2?", Some("  ")), "What is 2+2?");

        let prompt = build_prompt("How many apples?", Some("Om has 2 apples"));
        assert!(prompt.contains("Context: Om has 2 apples"));
        assert!(prompt.ends_with("Question: How many apples?"));
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://example.test/v1/generate?key=secret"),
            "https://example.test/v1/generate"
        );
        assert_eq!(redact_url("http://localhost:1/x"), "http://localhost:1/x");
    }

    #[test]
    fn test_create_client() {
        let mut config = LlmConfig::default();
        let client = create_client(&config).unwrap().unwrap();
        assert_eq!(client.provider(), "gemini");
        assert!(!client.is_configured());

        config.provider = "openai".to_string();
        let client = create_client(&config).unwrap().unwrap();
        assert_eq!(client.provider(), "openai");

        config.provider = "none".to_string();
        assert!(create_client(&config).unwrap().is_none());

        config.provider = "claude-2".to_string();
        assert!(matches!(create_client(&config), Err(RagError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_guarded_short_circuits_when_open() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(60),
        });

        let first = guarded(&breaker, "test", async {
            Err(GenerationError::UpstreamError("boom".into()))
        })
        .await;
        assert!(matches!(first, Err(GenerationError::UpstreamError(_))));

        let second = guarded(&breaker, "test", async { Ok("unreachable".to_string()) }).await;
        assert!(matches!(second, Err(GenerationError::CircuitOpen(_))));
    }

    #[tokio::test]
    async fn test_reachability_check_strips_key_from_url() {
        let mut server = mockito::Server::new_async().await;
        let with_key = server
            .mock("HEAD", "/v1/generate")
            .match_query(mockito::Matcher::UrlEncoded("key".into(), "secret".into()))
            .expect(0)
            .create_async()
            .await;
        let bare = server
            .mock("HEAD", "/v1/generate")
            .with_status(405)
            .expect(1)
            .create_async()
            .await;

        let url = format!("{}/v1/generate?key=secret", server.url());
        let reachability = probe_url(&reqwest::Client::new(), &url).await;

        assert_eq!(reachability.reachable, Some(true));
        with_key.assert_async().await;
        bare.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_error_hides_url() {
        let http = reqwest::Client::new();
        let result = send_with_single_retry(
            Duration::from_secs(5),
            Duration::from_secs(10),
            || http.post("http://127.0.0.1:9/generate?key=secret").send(),
        )
        .await;

        let err = result.unwrap_err();
        assert!(!err.to_string().contains("secret"));
    }

    #[tokio::test]
    async fn test_single_retry_on_connect_error() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let http = reqwest::Client::new();
        let attempts = AtomicUsize::new(0);

        // nothing listens on port 9 locally, so both attempts fail to connect
        let result = send_with_single_retry(
            Duration::from_secs(5),
            Duration::from_millis(10),
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                http.post("http://127.0.0.1:9/unreachable").send()
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
