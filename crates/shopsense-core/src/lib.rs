//! All backend logic independent of how Shopsense is run (CLI or HTTP).
//!
//! Products are created in the [catalog], embedded by an [embedding::Embedder] and written to a
//! [store::VectorStore]. [search] turns a free-text query into a ranked list, and [assistant]
//! exposes that search as a tool to a chat model.

pub mod api;
pub mod app_data;
pub mod assistant;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod images;
pub mod import;
pub mod ingest;
pub mod ollama;
pub mod product;
pub mod search;
pub mod store;
pub mod storefront;

pub use app_data::app_data_dir;
pub use assistant::{Assistant, ChatError, ChatEvent, ChatMessage, ChatModel, OllamaChat, ToolRegistry};
pub use catalog::{Catalog, CatalogError};
pub use config::{load_config, save_config, Config, ConfigError};
pub use embedding::{EmbedError, Embedder};
pub use images::{ImageError, ImageStore};
pub use import::{scan_products, ImportError, ProductFile};
pub use ingest::{ingest_products, IngestError};
pub use ollama::{OllamaClient, OllamaError};
pub use product::{NewProduct, Product, ValidationError};
pub use search::{SearchError, SearchHit, SearchRequest, SearchResult, SemanticSearch};
pub use store::{EmbeddingRecord, LocalVectorStore, MetadataFilter, ProductMetadata, VectorStore};
pub use storefront::{Created, Storefront, StorefrontError};

/// Returns a short status string. Used to verify the backend is wired up.
pub fn status() -> &'static str {
    "shopsense-core ready"
}
