//! Vector store for product embeddings. Supports add and filtered similarity search.
//!
//! [`LocalVectorStore`] keeps one collection in memory and, when opened from a path,
//! rewrites the collection's JSON file after every add.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::app_data;
use crate::product::{Attributes, Product};

/// Exact-match predicates on metadata keys, ANDed together. Empty matches everything.
pub type MetadataFilter = BTreeMap<String, Value>;

/// Product data duplicated next to each vector so search results need no catalog lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductMetadata {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Everything else the product carried (category, brand, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Attributes,
}

impl From<&Product> for ProductMetadata {
    fn from(product: &Product) -> Self {
        let mut extra = product.attributes.clone();
        let popularity = lift_number(&mut extra, "popularity");
        let rating = lift_number(&mut extra, "rating");
        Self {
            id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            image_url: product.image_url.clone(),
            popularity,
            rating,
            extra,
        }
    }
}

/// Numbers move into the typed field; anything else stays in `extra` untouched.
fn lift_number(extra: &mut Attributes, key: &str) -> Option<f64> {
    let number = extra.get(key).and_then(Value::as_f64)?;
    extra.remove(key);
    Some(number)
}

impl ProductMetadata {
    /// Value stored under `key`, looking at the known fields first.
    pub fn field(&self, key: &str) -> Option<Value> {
        match key {
            "id" => Some(Value::from(self.id)),
            "name" => Some(Value::from(self.name.as_str())),
            "description" => Some(Value::from(self.description.as_str())),
            "imageUrl" | "image_url" => self.image_url.as_deref().map(Value::from),
            "popularity" if self.popularity.is_some() => self.popularity.map(Value::from),
            "rating" if self.rating.is_some() => self.rating.map(Value::from),
            other => self.extra.get(other).cloned(),
        }
    }

    pub fn matches(&self, filter: &MetadataFilter) -> bool {
        filter
            .iter()
            .all(|(key, want)| self.field(key).as_ref() == Some(want))
    }
}

/// One stored vector. Re-ingesting a product adds another record; nothing is deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    pub id: Uuid,
    /// Back-reference for display only; the catalog owns the product.
    pub source_product_id: u64,
    pub vector: Vec<f32>,
    pub metadata: ProductMetadata,
}

impl EmbeddingRecord {
    pub fn new(product: &Product, vector: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_product_id: product.id,
            vector,
            metadata: ProductMetadata::from(product),
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Name of the collection this handle reads and writes.
    fn collection(&self) -> &str;

    async fn add(&self, records: Vec<EmbeddingRecord>) -> Result<(), StoreError>;

    /// Up to `k` records matching `filter`, most similar first, with their cosine similarity.
    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<(ProductMetadata, f32)>, StoreError>;

    async fn len(&self) -> usize;
}

#[derive(Debug, Serialize)]
struct CollectionFile<'a> {
    collection: &'a str,
    records: &'a [EmbeddingRecord],
}

#[derive(Debug, Deserialize)]
struct StoredCollection {
    collection: String,
    records: Vec<EmbeddingRecord>,
}

/// In-process vector store for one collection.
#[derive(Debug)]
pub struct LocalVectorStore {
    collection: String,
    path: Option<PathBuf>,
    /// Vectors are kept unit length so cosine similarity is a dot product.
    records: RwLock<Vec<EmbeddingRecord>>,
}

impl LocalVectorStore {
    pub fn in_memory(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Open the collection file at `path`. A missing file is an empty collection.
    pub fn open(path: &Path, collection: impl Into<String>) -> Result<Self, StoreError> {
        let collection = collection.into();
        let records = match std::fs::read_to_string(path) {
            Ok(s) => {
                let file: StoredCollection =
                    serde_json::from_str(&s).map_err(|e| StoreError::Parse(path.to_path_buf(), e))?;
                if file.collection != collection {
                    return Err(StoreError::WrongCollection {
                        expected: collection,
                        found: file.collection,
                    });
                }
                file.records
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::Read(path.to_path_buf(), e)),
        };
        Ok(Self {
            collection,
            path: Some(path.to_path_buf()),
            records: RwLock::new(records),
        })
    }

    async fn persist(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = CollectionFile {
            collection: &self.collection,
            records,
        };
        let s = serde_json::to_string(&file).map_err(StoreError::Serialize)?;
        app_data::write_atomic(path.clone(), s)
            .await
            .map_err(|e| StoreError::Write(path.clone(), e))
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn add(&self, records: Vec<EmbeddingRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut stored = self.records.write().await;
        let mut dims = stored.first().map(|r| r.vector.len());
        let mut incoming = Vec::with_capacity(records.len());
        for mut record in records {
            if record.vector.is_empty() {
                return Err(StoreError::EmptyVector);
            }
            let expected = *dims.get_or_insert(record.vector.len());
            if record.vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    found: record.vector.len(),
                });
            }
            record.vector = normalize(&record.vector);
            incoming.push(record);
        }
        let before = stored.len();
        stored.extend(incoming);
        if let Err(e) = self.persist(&stored).await {
            stored.truncate(before);
            return Err(e);
        }
        tracing::debug!(collection = %self.collection, added = stored.len() - before, "vectors stored");
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<(ProductMetadata, f32)>, StoreError> {
        if query.is_empty() {
            return Err(StoreError::EmptyVector);
        }
        let stored = self.records.read().await;
        if let Some(first) = stored.first() {
            if first.vector.len() != query.len() {
                return Err(StoreError::DimensionMismatch {
                    expected: first.vector.len(),
                    found: query.len(),
                });
            }
        }
        let q_norm = normalize(query);
        let mut scored: Vec<(ProductMetadata, f32)> = stored
            .iter()
            .filter(|r| r.metadata.matches(filter))
            .map(|r| (r.metadata.clone(), dot(&q_norm, &r.vector)))
            .collect();
        // Stable: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm <= 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to read vector collection {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("vector collection {0} is corrupt: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("failed to serialize vector collection: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write vector collection {0}: {1}")]
    Write(PathBuf, std::io::Error),
    #[error("collection file holds {found:?}, expected {expected:?}")]
    WrongCollection { expected: String, found: String },
    #[error("vector has {found} dimensions, collection uses {expected}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("empty vector")]
    EmptyVector,
}
