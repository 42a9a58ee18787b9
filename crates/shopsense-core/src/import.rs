//! Bulk import: products described as markdown files with YAML frontmatter.
//!
//! ```text
//! ---
//! name: Blue Ceramic Mug
//! image_url: https://cdn.example.com/mug.png
//! category: kitchen
//! rating: 4.5
//! ---
//! A sturdy hand-glazed mug.
//! ```
//!
//! The body is the description; frontmatter keys other than `name` and `image_url`
//! become product attributes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::product::{Attributes, NewProduct};

/// A product file we found and parsed.
#[derive(Debug, Clone)]
pub struct ProductFile {
    pub path: PathBuf,
    pub product: NewProduct,
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    name: String,
    #[serde(default, alias = "imageUrl")]
    image_url: Option<String>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_yaml::Value>,
}

/// Scans `root` for `.md` files, in file-name order, and parses each into a product.
/// Hidden files and directories are skipped; symlinks are not followed.
pub fn scan_products(root: &Path) -> Result<Vec<ProductFile>, ImportError> {
    if !root.is_dir() {
        return Err(ImportError::NotADirectory(root.to_path_buf()));
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = entry.map_err(|e| ImportError::Walk(e.to_string()))?;
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "md") && path.is_file() {
            let raw = std::fs::read_to_string(path).map_err(|e| ImportError::Read(path.to_path_buf(), e))?;
            let product = parse_product(&raw).map_err(|e| e.at(path))?;
            found.push(ProductFile {
                path: path.to_path_buf(),
                product,
            });
        }
    }
    Ok(found)
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Parses one product file. Validation (non-empty fields) happens at create time.
pub fn parse_product(content: &str) -> Result<NewProduct, ParseError> {
    let (yaml, body) = split_frontmatter(content).ok_or(ParseError::MissingFrontmatter)?;
    let front: Frontmatter = serde_yaml::from_str(yaml).map_err(ParseError::Yaml)?;
    let mut attributes = Attributes::new();
    for (key, value) in front.rest {
        let value = serde_json::to_value(value).map_err(|e| ParseError::Attribute(key.clone(), e))?;
        attributes.insert(key, value);
    }
    Ok(NewProduct {
        name: front.name,
        description: body.trim().to_string(),
        image_url: front.image_url,
        attributes,
    })
}

/// Splits `---\n<yaml>\n---\n<body>` into its two parts.
fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let s = content.trim_start();
    let after_first = s.strip_prefix("---")?;
    let end = after_first.find("\n---")?;
    let yaml = &after_first[..end];
    let rest = &after_first[end + 4..];
    let body = rest.split_once('\n').map_or("", |(_, b)| b);
    Some((yaml, body))
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("missing YAML frontmatter")]
    MissingFrontmatter,
    #[error("invalid frontmatter: {0}")]
    Yaml(serde_yaml::Error),
    #[error("attribute {0} cannot be represented as JSON: {1}")]
    Attribute(String, serde_json::Error),
}

impl ParseError {
    fn at(self, path: &Path) -> ImportError {
        ImportError::Parse(path.to_path_buf(), self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("walk error: {0}")]
    Walk(String),
    #[error("read error for {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("{0}: {1}")]
    Parse(PathBuf, ParseError),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const MUG: &str = "---\nname: Blue Ceramic Mug\nimage_url: https://cdn.example.com/mug.png\ncategory: kitchen\nrating: 4.5\n---\n\nA sturdy hand-glazed mug.\n";

    #[test]
    fn parses_frontmatter_and_body() {
        let p = parse_product(MUG).unwrap();
        assert_eq!(p.name, "Blue Ceramic Mug");
        assert_eq!(p.description, "A sturdy hand-glazed mug.");
        assert_eq!(p.image_url.as_deref(), Some("https://cdn.example.com/mug.png"));
        assert_eq!(p.attributes["category"], json!("kitchen"));
        assert_eq!(p.attributes["rating"], json!(4.5));
        assert!(!p.attributes.contains_key("name"));
    }

    #[test]
    fn plain_markdown_is_rejected() {
        assert!(matches!(
            parse_product("Just a description."),
            Err(ParseError::MissingFrontmatter)
        ));
    }

    #[test]
    fn frontmatter_needs_a_name() {
        assert!(matches!(
            parse_product("---\ncategory: kitchen\n---\nbody"),
            Err(ParseError::Yaml(_))
        ));
    }

    #[test]
    fn scan_skips_hidden_and_non_markdown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b-mug.md"), MUG).unwrap();
        std::fs::write(dir.path().join("a-plate.md"), "---\nname: Plate\n---\nA plate.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        std::fs::create_dir(dir.path().join(".drafts")).unwrap();
        std::fs::write(dir.path().join(".drafts").join("c.md"), MUG).unwrap();

        let found = scan_products(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|f| f.product.name.as_str()).collect();
        assert_eq!(names, vec!["Plate", "Blue Ceramic Mug"]);
    }

    #[test]
    fn scan_reports_the_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.md"), "no frontmatter").unwrap();
        let err = scan_products(dir.path()).unwrap_err();
        assert!(matches!(err, ImportError::Parse(path, ParseError::MissingFrontmatter) if path.ends_with("broken.md")));
    }
}
