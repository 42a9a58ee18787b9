//! Catalog products: what a caller submits, what storage hands back, and the text we embed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form product attributes (category, popularity, rating, ...).
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// A product as submitted for creation, before storage assigns it an id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

impl NewProduct {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Trims the text fields and checks that name and description are present.
    /// An empty image URL means "no image".
    pub fn validate(mut self) -> Result<Self, ValidationError> {
        self.name = self.name.trim().to_string();
        self.description = self.description.trim().to_string();
        if self.name.is_empty() {
            return Err(ValidationError::MissingName);
        }
        if self.description.is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        self.image_url = self
            .image_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        if let Some(u) = &self.image_url {
            url::Url::parse(u).map_err(|e| ValidationError::InvalidImageUrl(u.clone(), e))?;
        }
        Ok(self)
    }
}

/// A stored product. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn from_new(id: u64, new: NewProduct, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new.name,
            description: new.description,
            image_url: new.image_url,
            attributes: new.attributes,
            created_at,
        }
    }

    /// The text sent to the embedding provider: name, one space, description.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.name, self.description)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("product name is required")]
    MissingName,
    #[error("product description is required")]
    MissingDescription,
    #[error("invalid image URL {0:?}: {1}")]
    InvalidImageUrl(String, url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_trims_and_drops_empty_image() {
        let p = NewProduct::new("  Mug ", "\tA mug\n").with_image_url("  ").validate().unwrap();
        assert_eq!(p.name, "Mug");
        assert_eq!(p.description, "A mug");
        assert_eq!(p.image_url, None);
    }

    #[test]
    fn validate_requires_text_fields() {
        assert!(matches!(
            NewProduct::new(" ", "desc").validate(),
            Err(ValidationError::MissingName)
        ));
        assert!(matches!(
            NewProduct::new("Mug", "").validate(),
            Err(ValidationError::MissingDescription)
        ));
    }

    #[test]
    fn validate_rejects_relative_image_url() {
        let err = NewProduct::new("Mug", "A mug").with_image_url("mug.png").validate();
        assert!(matches!(err, Err(ValidationError::InvalidImageUrl(..))));
    }

    #[test]
    fn embedding_text_joins_name_and_description() {
        let new = NewProduct::new("Blue Ceramic Mug", "A sturdy hand-glazed mug");
        let p = Product::from_new(1, new, Utc::now());
        assert_eq!(p.embedding_text(), "Blue Ceramic Mug A sturdy hand-glazed mug");
    }

    #[test]
    fn serializes_camel_case() {
        let new = NewProduct::new("Mug", "A mug").with_image_url("https://cdn.example/mug.png");
        let p = Product::from_new(7, new, Utc::now());
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["imageUrl"], "https://cdn.example/mug.png");
        assert!(v.get("createdAt").is_some());
        assert!(v.get("attributes").is_none());
    }
}
