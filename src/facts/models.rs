//! Data models for the fact store

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Corpus shipped with the service
pub const DEFAULT_CORPUS: &[&str] = &[
    "Om has 2 apples",
    "Pavan has 82 apples",
    "Sahil has 3 apples",
];

/// Indexed fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Insertion order; lower ids win score ties
    pub id: u64,
    pub text: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub hash: String,
}

impl Fact {
    pub fn new(id: u64, text: String, embedding: Vec<f32>) -> Self {
        let hash = Self::compute_hash(&text);
        Self {
            id,
            text,
            embedding,
            hash,
        }
    }

    /// Compute hash for deduplication.
    ///
    /// Case and inner whitespace are normalised so `"Om has  2 apples"` and
    /// `"om has 2 apples"` collapse to one fact.
    pub fn compute_hash(text: &str) -> String {
        let normalised = text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let mut hasher = Sha256::new();
        hasher.update(normalised.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Corpus entry before embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSeed {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub text: String,
}

impl FactSeed {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
        }
    }
}

/// Search hit
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub fact: Fact,
    pub score: f32,
}

/// Built-in apples corpus
pub fn default_corpus() -> Vec<FactSeed> {
    DEFAULT_CORPUS.iter().map(|t| FactSeed::new(*t)).collect()
}

/// Load a corpus file.
///
/// Accepts either a JSON array of strings or an array of `{id?, text}` objects.
pub fn load_corpus(path: &Path) -> Result<Vec<FactSeed>> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        RagError::Configuration(format!("Failed to read corpus {}: {}", path.display(), e))
    })?;
    parse_corpus(&raw)
}

pub(crate) fn parse_corpus(raw: &str) -> Result<Vec<FactSeed>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Entry {
        Text(String),
        Seed(FactSeed),
    }

    let entries: Vec<Entry> = serde_json::from_str(raw)
        .map_err(|e| RagError::Configuration(format!("Invalid corpus file: {}", e)))?;

    Ok(entries
        .into_iter()
        .map(|entry| match entry {
            Entry::Text(text) => FactSeed::new(text),
            Entry::Seed(seed) => seed,
        })
        .collect())
}
