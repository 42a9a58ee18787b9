//! Semantic search: embed the query, ask the store for neighbours, then rescale,
//! threshold and order them.
//!
//! Raw scores are cosine similarities (1 = identical, 0 = unrelated). The relevance
//! score is `round(raw * 100)` clamped to 0..=100, a linear rescale rather than a
//! calibrated percentage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embedding::{EmbedError, Embedder};
use crate::store::{MetadataFilter, ProductMetadata, StoreError, VectorStore};

pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_MIN_SCORE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    pub filter: MetadataFilter,
    /// Minimum relevance as a fraction in `[0, 1]`.
    pub min_score: f32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_LIMIT,
            filter: MetadataFilter::new(),
            min_score: DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filter.insert(key.into(), value.into());
        self
    }
}

/// One ranked hit. Built fresh per query, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    /// `similarity` rescaled to 0..=100.
    pub relevance_score: u8,
    /// Raw cosine similarity reported by the vector store.
    pub similarity: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl SearchResult {
    pub fn from_neighbour(metadata: ProductMetadata, similarity: f32) -> Self {
        Self {
            id: metadata.id,
            name: metadata.name,
            description: metadata.description,
            image_url: metadata.image_url,
            relevance_score: relevance_score(similarity),
            similarity,
            popularity: metadata.popularity,
            rating: metadata.rating,
        }
    }

    pub fn meets(&self, min_score: f32) -> bool {
        f32::from(self.relevance_score) / 100.0 >= min_score
    }
}

/// A result plus the display string the UI and the chat model show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub result: SearchResult,
    pub debug: HitDebug,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HitDebug {
    pub relevance_percentage: String,
}

impl From<SearchResult> for SearchHit {
    fn from(result: SearchResult) -> Self {
        let debug = HitDebug {
            relevance_percentage: format!("{}%", result.relevance_score),
        };
        Self { result, debug }
    }
}

pub fn relevance_score(similarity: f32) -> u8 {
    // NaN saturates to 0.
    (similarity * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Rescale, drop everything under `min_score`, and sort by relevance, highest first.
/// Equal relevance keeps the store's order.
pub fn rank(neighbours: Vec<(ProductMetadata, f32)>, min_score: f32) -> Vec<SearchResult> {
    let mut results: Vec<SearchResult> = neighbours
        .into_iter()
        .map(|(metadata, similarity)| SearchResult::from_neighbour(metadata, similarity))
        .filter(|r| r.meets(min_score))
        .collect();
    results.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
    results
}

/// Query side of the pipeline. Cheap to clone; clients are shared.
#[derive(Clone)]
pub struct SemanticSearch {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl SemanticSearch {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Ranked results for `request`. `Ok(vec![])` means nothing matched; provider
    /// and store failures come back as errors.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        if request.limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        if !(0.0..=1.0).contains(&request.min_score) {
            return Err(SearchError::InvalidMinScore(request.min_score));
        }
        tracing::debug!(
            query = %request.query,
            limit = request.limit,
            min_score = request.min_score,
            filters = request.filter.len(),
            "semantic search"
        );
        let vector = self.embedder.embed(&request.query).await?;
        let neighbours = self
            .store
            .similarity_search(&vector, request.limit, &request.filter)
            .await?;
        let candidates = neighbours.len();
        let mut results = rank(neighbours, request.min_score);
        results.truncate(request.limit);
        tracing::info!(query = %request.query, candidates, results = results.len(), "search finished");
        Ok(results)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("limit must be positive")]
    InvalidLimit,
    #[error("min score {0} is outside [0, 1]")]
    InvalidMinScore(f32),
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::store::LocalVectorStore;

    /// Fails every call, so a validation error proves the provider was never asked.
    struct Offline;

    #[async_trait]
    impl Embedder for Offline {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Provider("offline".to_string()))
        }
    }

    fn offline_search() -> SemanticSearch {
        SemanticSearch::new(Arc::new(Offline), Arc::new(LocalVectorStore::in_memory("products")))
    }

    fn meta(id: u64) -> ProductMetadata {
        ProductMetadata {
            id,
            name: format!("p{id}"),
            description: "d".to_string(),
            image_url: None,
            popularity: None,
            rating: None,
            extra: Default::default(),
        }
    }

    #[test]
    fn relevance_is_rounded_and_clamped() {
        assert_eq!(relevance_score(0.876), 88);
        assert_eq!(relevance_score(0.874), 87);
        assert_eq!(relevance_score(1.0), 100);
        assert_eq!(relevance_score(1.2), 100);
        assert_eq!(relevance_score(-0.3), 0);
        assert_eq!(relevance_score(f32::NAN), 0);
    }

    #[test]
    fn rank_drops_low_scores_and_sorts_descending() {
        let ranked = rank(
            vec![(meta(1), 0.42), (meta(2), 0.91), (meta(3), 0.05), (meta(4), 0.66)],
            0.4,
        );
        let ids: Vec<u64> = ranked.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 4, 1]);
        assert!(ranked.iter().all(|r| r.meets(0.4)));
    }

    #[test]
    fn rank_threshold_uses_rounded_score() {
        // 0.696 rounds to 70, which passes a 0.7 threshold.
        let ranked = rank(vec![(meta(1), 0.696), (meta(2), 0.69)], 0.7);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].id, 1);
    }

    #[test]
    fn rank_ties_keep_store_order() {
        let ranked = rank(vec![(meta(5), 0.801), (meta(3), 0.799), (meta(9), 0.8)], 0.0);
        let ids: Vec<u64> = ranked.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn hit_carries_relevance_percentage() {
        let hit = SearchHit::from(SearchResult::from_neighbour(meta(1), 0.734));
        let v = serde_json::to_value(&hit).unwrap();
        assert_eq!(v["relevanceScore"], 73);
        assert_eq!(v["debug"]["relevancePercentage"], "73%");
        assert_eq!(v["name"], "p1");
        assert!(v.get("popularity").is_none());
    }

    #[tokio::test]
    async fn invalid_limit_and_threshold_are_rejected_before_embedding() {
        let search = offline_search();
        let err = search.search(&SearchRequest::new("mug").with_limit(0)).await;
        assert!(matches!(err, Err(SearchError::InvalidLimit)));

        let err = search.search(&SearchRequest::new("mug").with_min_score(1.5)).await;
        assert!(matches!(err, Err(SearchError::InvalidMinScore(s)) if s == 1.5));

        let err = search.search(&SearchRequest::new("mug").with_min_score(-0.1)).await;
        assert!(matches!(err, Err(SearchError::InvalidMinScore(_))));

        let err = search.search(&SearchRequest::new("mug").with_min_score(f32::NAN)).await;
        assert!(matches!(err, Err(SearchError::InvalidMinScore(s)) if s.is_nan()));

        let err = search.search(&SearchRequest::new("mug").with_min_score(1.0)).await;
        assert!(matches!(err, Err(SearchError::Embed(_))));
    }
}
