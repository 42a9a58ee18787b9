//! Where Shopsense keeps its state: config, catalog, vectors and uploaded images.

use std::io::Write;
use std::path::{Path, PathBuf};

pub const CATALOG_FILENAME: &str = "catalog.json";
pub const VECTORS_DIRNAME: &str = "vectors";
pub const IMAGES_DIRNAME: &str = "images";

/// Returns the directory where Shopsense stores config, catalog and index data.
/// On macOS: `~/Library/Application Support/Shopsense/`.
/// Creates the directory if it doesn't exist; returns `None` if we can't determine the path.
pub fn app_data_dir() -> Option<PathBuf> {
    let dir = directories::ProjectDirs::from("app", "Shopsense", "Shopsense")?
        .data_local_dir()
        .to_path_buf();
    std::fs::create_dir_all(&dir).ok()?;
    Some(dir)
}

/// File holding the vector records of one collection.
pub fn vectors_path(data_dir: &Path, collection: &str) -> PathBuf {
    data_dir.join(VECTORS_DIRNAME).join(format!("{collection}.json"))
}

/// Replace `path` with `contents` on the blocking pool. The bytes go to a temp file in the same
/// directory first and are renamed over `path`, so readers see the old file or the new one.
pub(crate) async fn write_atomic(path: PathBuf, contents: String) -> std::io::Result<()> {
    tokio::task::spawn_blocking(move || replace_file(&path, contents.as_bytes()))
        .await
        .map_err(std::io::Error::other)?
}

fn replace_file(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_some() {
        assert!(app_data_dir().is_some());
    }

    #[test]
    fn vectors_are_stored_per_collection() {
        let p = vectors_path(Path::new("/data"), "products");
        assert_eq!(p, PathBuf::from("/data/vectors/products.json"));
    }

    #[tokio::test]
    async fn write_atomic_replaces_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");
        write_atomic(path.clone(), "[1]".to_string()).await.unwrap();
        write_atomic(path.clone(), "[1,2]".to_string()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1,2]");
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[tokio::test]
    async fn failed_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        write_atomic(path.clone(), "[1]".to_string()).await.unwrap();

        // A directory in the way makes the rename fail after the temp file is written.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir(&blocked).unwrap();
        std::fs::write(blocked.join("keep"), "x").unwrap();
        assert!(write_atomic(blocked.clone(), "[2]".to_string()).await.is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[1]");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 2);
    }
}
