//! How a chat reaches the query pipeline

use crate::pipeline::{Answer, QueryOrchestrator};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// Non-2xx response
    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Request failed: {0}")]
    Request(String),
}

/// Sends one question and returns the pipeline answer
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn ask(&self, question: &str) -> Result<Answer, TransportError>;
}

/// `POST {base_url}/query/` over HTTP
pub struct HttpTransport {
    http: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self {
            http,
            url: format!("{}/query/", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn ask(&self, question: &str) -> Result<Answer, TransportError> {
        let response = self
            .http
            .post(&self.url)
            .json(&serde_json::json!({ "question": question }))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TransportError::Status(response.status().as_u16()));
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

/// In-process transport; terminal pipeline errors map to their HTTP status
#[async_trait]
impl QueryTransport for QueryOrchestrator {
    async fn ask(&self, question: &str) -> Result<Answer, TransportError> {
        self.answer(question)
            .await
            .map(|outcome| outcome.answer)
            .map_err(|e| TransportError::Status(e.status_code().as_u16()))
    }
}
