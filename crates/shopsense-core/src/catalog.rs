//! Product rows. Create and list only; products are never updated or deleted here.
//! Backed by a JSON file in the app data directory, or purely in memory.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::app_data;
use crate::product::{NewProduct, Product};

#[derive(Debug, Default)]
pub struct Catalog {
    path: Option<PathBuf>,
    products: RwLock<Vec<Product>>,
}

impl Catalog {
    /// Catalog that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the catalog stored at `path`. A missing file is an empty catalog.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        let products = match std::fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).map_err(|e| CatalogError::Parse(path.to_path_buf(), e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(CatalogError::Read(path.to_path_buf(), e)),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            products: RwLock::new(products),
        })
    }

    /// Store a validated product and assign it the next id.
    pub async fn create(&self, new: NewProduct) -> Result<Product, CatalogError> {
        let mut products = self.products.write().await;
        let id = products.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let product = Product::from_new(id, new, Utc::now());
        products.push(product.clone());
        if let Err(e) = self.persist(&products).await {
            products.pop();
            return Err(e);
        }
        tracing::info!(id, name = %product.name, "product created");
        Ok(product)
    }

    /// All products, newest first.
    pub async fn list(&self) -> Vec<Product> {
        let mut products = self.products.read().await.clone();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        products
    }

    pub async fn get(&self, id: u64) -> Option<Product> {
        self.products.read().await.iter().find(|p| p.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    async fn persist(&self, products: &[Product]) -> Result<(), CatalogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let s = serde_json::to_string_pretty(products).map_err(CatalogError::Serialize)?;
        app_data::write_atomic(path.clone(), s)
            .await
            .map_err(|e| CatalogError::Write(path.clone(), e))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("catalog {0} is corrupt: {1}")]
    Parse(PathBuf, serde_json::Error),
    #[error("failed to serialize catalog: {0}")]
    Serialize(serde_json::Error),
    #[error("failed to write catalog {0}: {1}")]
    Write(PathBuf, std::io::Error),
}
