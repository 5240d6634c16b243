//! Qdrant-backed vector index

use super::models::{Fact, Match};
use super::store::{sort_matches, VectorIndex};
use super::StoreError;
use crate::config::VectorDbConfig;
use async_trait::async_trait;
use qdrant_client::{
    client::{Payload, QdrantClient},
    qdrant::{
        point_id::PointIdOptions, value::Kind, vectors_config, CreateCollection, Distance,
        PointStruct, ScoredPoint, SearchPoints, VectorParams, VectorsConfig,
    },
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Facts collection in Qdrant
pub struct QdrantIndex {
    client: QdrantClient,
    collection_name: String,
    timeout: Duration,
    count: AtomicUsize,
}

impl QdrantIndex {
    /// Create a client for `config.url`; does not contact the server
    pub fn new(config: &VectorDbConfig) -> Result<Self, StoreError> {
        let client = QdrantClient::from_url(&config.url)
            .build()
            .map_err(|e| {
                StoreError::Unavailable(format!("Failed to create Qdrant client: {}", e))
            })?;

        Ok(Self {
            client,
            collection_name: config.collection_name.clone(),
            timeout: config.timeout(),
            count: AtomicUsize::new(0),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(StoreError::Unavailable(format!("{}: {}", what, e))),
            Err(_) => Err(StoreError::Unavailable(format!(
                "{}: timed out after {:?}",
                what, self.timeout
            ))),
        }
    }

    async fn collection_exists(&self) -> Result<bool, StoreError> {
        let collections = self
            .with_timeout("Failed to list collections", self.client.list_collections())
            .await?;

        Ok(collections
            .collections
            .iter()
            .any(|c| c.name == self.collection_name))
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn recreate(&self, facts: Vec<Fact>, dims: usize) -> Result<(), StoreError> {
        if self.collection_exists().await? {
            info!("Dropping facts collection: {}", self.collection_name);
            self.with_timeout(
                "Failed to delete collection",
                self.client.delete_collection(&self.collection_name),
            )
            .await?;
        }

        info!("Creating facts collection: {} (size={})", self.collection_name, dims);
        self.with_timeout(
            "Failed to create collection",
            self.client.create_collection(&CreateCollection {
                collection_name: self.collection_name.clone(),
                vectors_config: Some(VectorsConfig {
                    config: Some(vectors_config::Config::Params(VectorParams {
                        size: dims as u64,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
                ..Default::default()
            }),
        )
        .await?;

        let total = facts.len();
        let points: Vec<PointStruct> = facts
            .into_iter()
            .map(|fact| {
                let mut payload = Payload::new();
                payload.insert("text", fact.text);
                payload.insert("hash", fact.hash);
                PointStruct::new(fact.id, fact.embedding, payload)
            })
            .collect();

        if !points.is_empty() {
            self.with_timeout(
                "Failed to upsert facts",
                self.client
                    .upsert_points_blocking(&self.collection_name, None, points, None),
            )
            .await?;
        }

        self.count.store(total, Ordering::SeqCst);
        info!("Upserted {} facts into {}", total, self.collection_name);
        Ok(())
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<Match>, StoreError> {
        // Fetch the whole corpus so tied scores are cut by id here, not by Qdrant
        let limit = top_k.max(self.len());
        let response = self
            .with_timeout(
                "Failed to search facts",
                self.client.search_points(&SearchPoints {
                    collection_name: self.collection_name.clone(),
                    vector: vector.to_vec(),
                    limit: limit as u64,
                    with_payload: Some(true.into()),
                    ..Default::default()
                }),
            )
            .await?;

        let matches = collect_matches(response.result, top_k);
        debug!("Qdrant returned {} matches", matches.len());
        Ok(matches)
    }

    fn len(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    async fn is_available(&self) -> bool {
        self.collection_exists().await.is_ok()
    }

    fn backend_name(&self) -> &'static str {
        "qdrant"
    }
}

/// Convert scored points, order them and keep the best `top_k`
fn collect_matches(points: Vec<ScoredPoint>, top_k: usize) -> Vec<Match> {
    let mut matches: Vec<Match> = points
        .into_iter()
        .filter_map(|point| {
            let converted = point_to_match(&point);
            if converted.is_none() {
                warn!("Skipping point without id or text payload");
            }
            converted
        })
        .collect();

    sort_matches(&mut matches);
    matches.truncate(top_k);
    matches
}

/// Rebuild a match from a scored point; the vector itself is not fetched
fn point_to_match(point: &ScoredPoint) -> Option<Match> {
    let id = match point.id.as_ref()?.point_id_options.as_ref()? {
        PointIdOptions::Num(id) => *id,
        PointIdOptions::Uuid(_) => return None,
    };

    let text = payload_str(point, "text")?;
    let hash = payload_str(point, "hash").unwrap_or_else(|| Fact::compute_hash(&text));

    Some(Match {
        fact: Fact {
            id,
            text,
            embedding: Vec::new(),
            hash,
        },
        score: point.score,
    })
}

fn payload_str(point: &ScoredPoint, key: &str) -> Option<String> {
    match point.payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdrant_client::qdrant::{PointId, Value};
    use std::collections::HashMap;

    fn scored(id: u64, score: f32, text: Option<&str>) -> ScoredPoint {
        let mut payload = HashMap::new();
        if let Some(text) = text {
            payload.insert(
                "text".to_string(),
                Value {
                    kind: Some(Kind::StringValue(text.to_string())),
                },
            );
        }
        ScoredPoint {
            id: Some(PointId::from(id)),
            payload,
            score,
            ..Default::default()
        }
    }

    #[test]
    fn test_point_to_match() {
        let point = scored(2, 0.91, Some("Pavan has 82 apples"));
        let m = point_to_match(&point).unwrap();
        assert_eq!(m.fact.id, 2);
        assert_eq!(m.fact.text, "Pavan has 82 apples");
        assert_eq!(m.fact.hash, Fact::compute_hash("Pavan has 82 apples"));
        assert!((m.score - 0.91).abs() < 1e-6);

        assert!(point_to_match(&scored(3, 0.5, None)).is_none());
    }

    #[test]
    fn test_collect_matches_breaks_ties_by_id() {
        let points = vec![
            scored(3, 0.8, Some("Om owns apples")),
            scored(5, 0.4, Some("Sahil has 3 apples")),
            scored(1, 0.8, Some("Om has apples")),
            scored(4, 0.9, None),
        ];

        let matches = collect_matches(points, 1);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].fact.id, 1);

        let points = vec![
            scored(3, 0.8, Some("Om owns apples")),
            scored(1, 0.8, Some("Om has apples")),
            scored(2, 0.95, Some("Pavan has 82 apples")),
        ];
        let ids: Vec<u64> = collect_matches(points, 5).iter().map(|m| m.fact.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    // Requires a running Qdrant instance
    #[tokio::test]
    #[ignore]
    async fn test_recreate_and_search_live() {
        let config = VectorDbConfig {
            backend: "qdrant".to_string(),
            collection_name: "fact_rag_test".to_string(),
            ..Default::default()
        };
        let index = QdrantIndex::new(&config).unwrap();
        index
            .recreate(
                vec![
                    Fact::new(1, "a".into(), vec![1.0, 0.0]),
                    Fact::new(2, "b".into(), vec![0.0, 1.0]),
                ],
                2,
            )
            .await
            .unwrap();

        let matches = index.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(matches[0].fact.id, 1);
        assert_eq!(index.len(), 2);
    }
}
