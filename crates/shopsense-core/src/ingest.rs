//! Ingestion pipeline: product → text → embed → store.

use crate::embedding::{EmbedError, Embedder};
use crate::product::Product;
use crate::store::{EmbeddingRecord, StoreError, VectorStore};

/// Embeds each product's `name description` text and writes one record per product,
/// with the full product metadata, into `store`. Returns the number of records written.
///
/// Nothing is rolled back on failure: catalog rows stay, only the embedding step fails.
/// Re-ingesting a product writes a second record.
pub async fn ingest_products(
    products: &[Product],
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
) -> Result<usize, IngestError> {
    if products.is_empty() {
        return Err(IngestError::NoProducts);
    }
    let texts: Vec<String> = products.iter().map(Product::embedding_text).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    if embeddings.len() != products.len() {
        return Err(EmbedError::CountMismatch {
            expected: products.len(),
            found: embeddings.len(),
        }
        .into());
    }

    let records: Vec<EmbeddingRecord> = products
        .iter()
        .zip(embeddings)
        .map(|(product, vector)| EmbeddingRecord::new(product, vector))
        .collect();
    let count = records.len();
    store.add(records).await?;
    tracing::info!(collection = store.collection(), count, "products embedded");
    Ok(count)
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no products to ingest")]
    NoProducts,
    #[error("embedding error: {0}")]
    Embed(#[from] EmbedError),
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
}
