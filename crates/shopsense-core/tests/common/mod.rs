//! Deterministic embedders for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use shopsense_core::{Catalog, EmbedError, Embedder, ImageStore, LocalVectorStore, Storefront};

pub const DIMS: usize = 256;

/// Bag of lowercase words. Each new word gets its own dimension, so there are no collisions.
#[derive(Default)]
pub struct BagOfWords {
    vocab: Mutex<HashMap<String, usize>>,
}

#[async_trait]
impl Embedder for BagOfWords {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vocab = self.vocab.lock().unwrap();
        let mut v = vec![0.0; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let next = vocab.len();
            let slot = *vocab.entry(word.to_lowercase()).or_insert(next);
            if slot >= DIMS {
                return Err(EmbedError::Provider("vocabulary full".to_string()));
            }
            v[slot] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            return Err(EmbedError::EmptyVector);
        }
        Ok(v)
    }
}

/// Always fails, like an unreachable provider.
pub struct Unreachable;

#[async_trait]
impl Embedder for Unreachable {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Provider("connection refused".to_string()))
    }
}

pub fn storefront(embedder: Arc<dyn Embedder>, images: &std::path::Path) -> Storefront {
    Storefront::new(
        Catalog::in_memory(),
        ImageStore::new(images),
        embedder,
        Arc::new(LocalVectorStore::in_memory("products")),
    )
}
