//! The process-wide service: one catalog, one image store, one embedding client and one
//! vector store, created at startup and shared by the CLI, the HTTP API and the assistant.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::app_data::{vectors_path, CATALOG_FILENAME, IMAGES_DIRNAME};
use crate::assistant::{Assistant, ChatError, OllamaChat, ToolRegistry};
use crate::catalog::{Catalog, CatalogError};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::images::{ImageError, ImageStore};
use crate::ingest::{ingest_products, IngestError};
use crate::ollama::{OllamaClient, OllamaError};
use crate::product::{NewProduct, Product, ValidationError};
use crate::search::{SearchError, SearchRequest, SearchResult, SemanticSearch};
use crate::store::{LocalVectorStore, StoreError, VectorStore};

pub const EMBEDDING_WARNING: &str = "Product created but embeddings failed";

/// Outcome of a create: the stored product, plus a warning when it could not be embedded.
#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub product: Product,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Created {
    pub fn is_searchable(&self) -> bool {
        self.warning.is_none()
    }
}

pub struct Storefront {
    catalog: Catalog,
    images: ImageStore,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    search: SemanticSearch,
}

impl Storefront {
    pub fn new(
        catalog: Catalog,
        images: ImageStore,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let search = SemanticSearch::new(embedder.clone(), store.clone());
        Self {
            catalog,
            images,
            embedder,
            store,
            search,
        }
    }

    /// Open everything under `data_dir` and connect to Ollama as configured.
    pub fn open(config: &Config, data_dir: &Path) -> Result<Self, StorefrontError> {
        let embedder = OllamaClient::from_url(&config.ollama_url)?.with_embed_model(&config.embed_model);
        let store = LocalVectorStore::open(&vectors_path(data_dir, &config.collection), &config.collection)?;
        let catalog = Catalog::open(&data_dir.join(CATALOG_FILENAME))?;
        let images = ImageStore::new(data_dir.join(IMAGES_DIRNAME));
        Ok(Self::new(catalog, images, Arc::new(embedder), Arc::new(store)))
    }

    /// Build the chat assistant on top of this storefront's search.
    pub fn assistant(&self, config: &Config) -> Result<Assistant, ChatError> {
        let model = OllamaChat::from_url(&config.ollama_url, &config.chat_model)?;
        let mut assistant = Assistant::new(Arc::new(model), self.tools())
            .with_max_steps(config.chat.max_steps)
            .with_max_duration(Duration::from_secs(config.chat.max_duration_secs));
        if let Some(prompt) = &config.chat.system_prompt {
            assistant = assistant.with_system_prompt(prompt);
        }
        Ok(assistant)
    }

    pub fn tools(&self) -> ToolRegistry {
        ToolRegistry::new(self.search.clone())
    }

    /// Validate, upload the image, store the product, then embed it.
    /// Embedding failure does not undo the create; it comes back as a warning.
    pub async fn create_product(
        &self,
        new: NewProduct,
        image: Option<&Path>,
    ) -> Result<Created, StorefrontError> {
        let mut new = new.validate()?;
        if let Some(path) = image {
            new.image_url = Some(self.images.upload(path)?);
        }
        let product = self.catalog.create(new).await?;

        let warning = match self.ingest(std::slice::from_ref(&product)).await {
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(id = product.id, error = %e, "product stored without embedding");
                Some(EMBEDDING_WARNING.to_string())
            }
        };
        Ok(Created { product, warning })
    }

    pub async fn ingest(&self, products: &[Product]) -> Result<usize, IngestError> {
        ingest_products(products, self.embedder.as_ref(), self.store.as_ref()).await
    }

    pub async fn list_products(&self) -> Vec<Product> {
        self.catalog.list().await
    }

    pub async fn product(&self, id: u64) -> Option<Product> {
        self.catalog.get(id).await
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>, SearchError> {
        self.search.search(request).await
    }

    pub async fn product_count(&self) -> usize {
        self.catalog.len().await
    }

    pub async fn embedding_count(&self) -> usize {
        self.store.len().await
    }

    pub fn collection(&self) -> &str {
        self.store.collection()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorefrontError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("image upload failed: {0}")]
    Image(#[from] ImageError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),
    #[error("embedding client error: {0}")]
    Ollama(#[from] OllamaError),
}
