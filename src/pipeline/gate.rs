//! Relevance gate, restricted-domain policy and question validation

use crate::config::GateConfig;
use crate::error::{RagError, Result};
use crate::facts::Match;
use serde::Serialize;
use std::collections::HashSet;

/// Why retrieval was not used as the answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NoMatch,
    BelowThreshold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Accept,
    Reject(RejectReason),
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            GateDecision::Accept => "accept",
            GateDecision::Reject(RejectReason::NoMatch) => "no_match",
            GateDecision::Reject(RejectReason::BelowThreshold) => "below_threshold",
        }
    }
}

/// Accepts the best match iff its score reaches `min_similarity` (inclusive)
#[derive(Debug, Clone, Copy)]
pub struct RelevanceGate {
    min_similarity: f32,
}

impl RelevanceGate {
    pub fn new(min_similarity: f32) -> Self {
        Self { min_similarity }
    }

    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    pub fn accept(&self, best: Option<&Match>) -> GateDecision {
        match best {
            None => GateDecision::Reject(RejectReason::NoMatch),
            Some(m) if m.score >= self.min_similarity => GateDecision::Accept,
            Some(_) => GateDecision::Reject(RejectReason::BelowThreshold),
        }
    }
}

/// Questions that must not be sent to the generative client unless allowed.
///
/// A restricted question that misses the main gate is still answered from
/// the corpus when its best match reaches the looser `min_similarity`.
#[derive(Debug, Clone)]
pub struct DomainPolicy {
    keywords: HashSet<String>,
    allow_generation: bool,
    min_similarity: f32,
}

impl DomainPolicy {
    pub fn new(keywords: &[String], allow_generation: bool, min_similarity: f32) -> Self {
        Self {
            keywords: keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            allow_generation,
            min_similarity,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            &config.restricted_keywords,
            config.fallback_to_llm_for_restricted_domain,
            config.restricted_min_similarity,
        )
    }

    /// True iff the question contains a configured keyword as a whole word
    pub fn is_restricted(&self, question: &str) -> bool {
        question
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .any(|w| self.keywords.contains(&w.to_lowercase()))
    }

    /// Whether a rejected `question` may go to the generative client
    pub fn may_generate(&self, question: &str) -> bool {
        self.allow_generation || !self.is_restricted(question)
    }

    pub fn allow_generation(&self) -> bool {
        self.allow_generation
    }

    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }

    /// Best match to serve for a restricted question the main gate rejected
    pub fn restricted_match<'a>(
        &self,
        question: &str,
        best: Option<&'a Match>,
    ) -> Option<&'a Match> {
        best.filter(|m| m.score >= self.min_similarity && self.is_restricted(question))
    }
}

/// Trim and validate a question before any external call
pub fn validate_question(question: &str, max_chars: usize) -> Result<&str> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(RagError::Validation("question must not be empty".to_string()));
    }

    let len = trimmed.chars().count();
    if len > max_chars {
        return Err(RagError::Validation(format!(
            "question is {} characters, maximum is {}",
            len, max_chars
        )));
    }

    Ok(trimmed)
}
