//! OpenAI-compatible embeddings endpoint client

use super::{EmbedError, Embedder};
use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Remote embedding model
pub struct HttpEmbedder {
    http: Client,
    url: String,
    api_token: Option<SecretString>,
    model: String,
    dims: usize,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbedError> {
        let base = config
            .api_url
            .as_ref()
            .ok_or_else(|| EmbedError::Unavailable("embedding.api_url is not set".to_string()))?;

        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        Ok(Self {
            http,
            url: format!("{}/embeddings", base.trim_end_matches('/')),
            api_token: config.api_token.clone(),
            model: config.model.clone(),
            dims: config.dims,
        })
    }

    fn check_dims(&self, vector: &[f32]) -> Result<(), EmbedError> {
        if vector.len() != self.dims {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbedError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Embedding {} texts via {}", texts.len(), self.url);

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let mut req = self.http.post(&self.url).json(&request);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token.expose_secret());
        }

        let response = req
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbedError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // providers may return items out of order; `index` restores input order
        parsed.data.sort_by_key(|d| d.index);

        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();
        for vector in &vectors {
            self.check_dims(vector)?;
        }
        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
