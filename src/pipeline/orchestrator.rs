//! Query orchestrator: embed, retrieve, gate, then answer or generate

use super::gate::{validate_question, DomainPolicy, GateDecision, RelevanceGate};
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::facts::{FactStore, Match};
use crate::llm::{
    canned_reply, GenerationError, GenerativeClient, RandomSelector, ReplySelector,
    NO_RELEVANT_INFO,
};
use crate::metrics::METRICS;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Provenance of an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Retrieval,
    Llm,
    Fallback,
    /// In-flight placeholder in chat state; never returned by the pipeline
    Loading,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Retrieval => "retrieval",
            Source::Llm => "llm",
            Source::Fallback => "fallback",
            Source::Loading => "loading",
        }
    }
}

/// Response contract of `POST /query/`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl Answer {
    pub fn retrieved(text: impl Into<String>) -> Self {
        Self {
            answer: text.into(),
            source: Source::Retrieval,
            mode: Some("retrieved".to_string()),
        }
    }

    pub fn generated(text: impl Into<String>, provider: &str) -> Self {
        Self {
            answer: text.into(),
            source: Source::Llm,
            mode: Some(provider.to_string()),
        }
    }

    pub fn fallback(text: impl Into<String>) -> Self {
        Self {
            answer: text.into(),
            source: Source::Fallback,
            mode: None,
        }
    }

    /// Restricted-domain question answered from a loosely matching fact
    pub fn restricted_match(text: impl Into<String>) -> Self {
        Self {
            answer: text.into(),
            source: Source::Retrieval,
            mode: Some("restricted".to_string()),
        }
    }

    pub fn restricted() -> Self {
        Self {
            answer: NO_RELEVANT_INFO.to_string(),
            source: Source::Fallback,
            mode: Some("restricted".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Received,
    Embedding,
    Retrieving,
    Gating,
    Answering,
    Generating,
    Responded,
}

impl QueryStage {
    pub fn label(&self) -> &'static str {
        match self {
            QueryStage::Received => "received",
            QueryStage::Embedding => "embedding",
            QueryStage::Retrieving => "retrieving",
            QueryStage::Gating => "gating",
            QueryStage::Answering => "answering",
            QueryStage::Generating => "generating",
            QueryStage::Responded => "responded",
        }
    }

    fn timeout_error(&self, limit: Duration) -> RagError {
        let msg = format!("{} timed out after {:?}", self.label(), limit);
        match self {
            QueryStage::Embedding => RagError::EmbeddingUnavailable(msg),
            QueryStage::Retrieving => RagError::StoreUnavailable(msg),
            QueryStage::Generating => RagError::GenerationUnavailable(msg),
            _ => RagError::Internal(msg),
        }
    }
}

/// Result of one query
#[derive(Debug, Clone)]
pub struct Outcome {
    pub answer: Answer,
    /// Stages visited, in order
    pub stages: Vec<QueryStage>,
    pub best_score: Option<f32>,
    pub gate: Option<GateDecision>,
}

/// Per-query knobs
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub include_context: bool,
    pub max_question_chars: usize,
    pub embed_timeout: Duration,
    pub search_timeout: Duration,
    pub generate_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.vector_db.top_k.max(1),
            include_context: config.gate.include_context,
            max_question_chars: config.gate.max_question_chars,
            embed_timeout: config.embedding.timeout(),
            search_timeout: config.vector_db.timeout(),
            generate_timeout: config.llm.deadline(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Composes fact store, relevance gate and generative client
pub struct QueryOrchestrator {
    store: Arc<FactStore>,
    client: Option<Arc<dyn GenerativeClient>>,
    gate: RelevanceGate,
    policy: DomainPolicy,
    selector: Arc<dyn ReplySelector>,
    settings: PipelineSettings,
}

impl QueryOrchestrator {
    pub fn new(
        store: Arc<FactStore>,
        client: Option<Arc<dyn GenerativeClient>>,
        config: &Config,
    ) -> Self {
        Self {
            store,
            client,
            gate: RelevanceGate::new(config.gate.min_similarity),
            policy: DomainPolicy::from_config(&config.gate),
            selector: Arc::new(RandomSelector),
            settings: PipelineSettings::from_config(config),
        }
    }

    /// Replace the canned reply selector
    pub fn with_selector(mut self, selector: Arc<dyn ReplySelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store(&self) -> &Arc<FactStore> {
        &self.store
    }

    pub fn client(&self) -> Option<&Arc<dyn GenerativeClient>> {
        self.client.as_ref()
    }

    pub fn gate(&self) -> &RelevanceGate {
        &self.gate
    }

    pub fn policy(&self) -> &DomainPolicy {
        &self.policy
    }

    /// Answer one question.
    ///
    /// Returns `Err` only for validation failures, configuration errors, and
    /// embedding/store outages when no generative client is configured.
    pub async fn answer(&self, question: &str) -> Result<Outcome> {
        let mut stages = vec![QueryStage::Received];
        let question = validate_question(question, self.settings.max_question_chars)?;

        let best = match self.retrieve(question, &mut stages).await {
            Ok(best) => best,
            Err(e) if e.is_degradable() && self.client.is_some() => {
                warn!("Retrieval degraded, generating without context: {}", e);
                let answer = self.generate_or_fallback(question, None, &mut stages).await;
                return Ok(self.finish(answer, stages, None, None));
            }
            Err(e) => {
                error!("Query failed: {}", e);
                return Err(e);
            }
        };

        stages.push(QueryStage::Gating);
        let decision = self.gate.accept(best.as_ref());
        METRICS.record_gate(decision.label());
        let best_score = best.as_ref().map(|m| m.score);
        debug!("Gate decision: {:?} (best_score={:?})", decision, best_score);

        let answer = match (decision, best) {
            (GateDecision::Accept, Some(m)) => {
                stages.push(QueryStage::Answering);
                Answer::retrieved(m.fact.text)
            }
            (_, Some(m)) if self.policy.restricted_match(question, Some(&m)).is_some() => {
                info!(
                    "Restricted-domain question matched fact {} at {:.3}",
                    m.fact.id, m.score
                );
                stages.push(QueryStage::Answering);
                Answer::restricted_match(m.fact.text)
            }
            (_, best) => {
                let context = best
                    .filter(|_| self.settings.include_context)
                    .map(|m| m.fact.text);
                self.generate_or_fallback(question, context.as_deref(), &mut stages)
                    .await
            }
        };

        Ok(self.finish(answer, stages, best_score, Some(decision)))
    }

    /// Embed the question and fetch the best match
    async fn retrieve(
        &self,
        question: &str,
        stages: &mut Vec<QueryStage>,
    ) -> Result<Option<Match>> {
        stages.push(QueryStage::Embedding);
        let vector = self
            .timed(
                QueryStage::Embedding,
                self.settings.embed_timeout,
                self.store.embed_query(question),
            )
            .await?;

        stages.push(QueryStage::Retrieving);
        let matches = self
            .timed(
                QueryStage::Retrieving,
                self.settings.search_timeout,
                self.store.search(&vector, self.settings.top_k),
            )
            .await?;

        Ok(matches.into_iter().next())
    }

    /// Rejected path: restricted-domain rule, then generation, then canned text
    async fn generate_or_fallback(
        &self,
        question: &str,
        context: Option<&str>,
        stages: &mut Vec<QueryStage>,
    ) -> Answer {
        if !self.policy.may_generate(question) {
            info!("Restricted-domain question without a matching fact; not generating");
            return Answer::restricted();
        }

        let client = match &self.client {
            Some(client) => client,
            None => {
                debug!("No generative client configured, serving canned reply");
                return Answer::fallback(canned_reply(self.selector.as_ref()));
            }
        };

        stages.push(QueryStage::Generating);
        let call = async {
            client.generate(question, context).await.map_err(|e| {
                if let GenerationError::MissingCredential(provider) = &e {
                    error!("Generative provider {} has no credential configured", provider);
                }
                RagError::from(e)
            })
        };

        match self
            .timed(QueryStage::Generating, self.settings.generate_timeout, call)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Answer::generated(text, client.provider()),
            Ok(_) => {
                warn!("Generative client returned an empty answer");
                Answer::fallback(canned_reply(self.selector.as_ref()))
            }
            Err(e) => {
                warn!("Generation failed, serving canned reply: {}", e);
                Answer::fallback(canned_reply(self.selector.as_ref()))
            }
        }
    }

    async fn timed<T, F>(&self, stage: QueryStage, limit: Duration, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(stage.timeout_error(limit)),
        };

        METRICS.observe_stage(stage.label(), started.elapsed());
        if result.is_err() {
            METRICS.record_stage_failure(stage.label());
        }
        result
    }

    fn finish(
        &self,
        answer: Answer,
        mut stages: Vec<QueryStage>,
        best_score: Option<f32>,
        gate: Option<GateDecision>,
    ) -> Outcome {
        stages.push(QueryStage::Responded);
        METRICS.record_query(answer.source.as_str());
        info!(
            "Query answered: source={}, best_score={:?}",
            answer.source.as_str(),
            best_score
        );

        Outcome {
            answer,
            stages,
            best_score,
            gate,
        }
    }
}
